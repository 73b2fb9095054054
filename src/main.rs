use log::*;
use service::config::{Command, Config};
use service::logging::Logger;

mod app;
mod commands;
mod output;

use app::App;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    // Once a prompt has listened for Ctrl-C the default SIGINT handling is gone, so the whole
    // command listens too.
    let outcome = tokio::select! {
        biased;
        outcome = run(config) => outcome,
        _ = interrupted() => Err(anyhow::Error::new(auth_recovery::error::cancelled())),
    };

    let code = match outcome {
        Ok(()) => 0,
        Err(e) => {
            debug!("{:?}", e);
            output::print_error(&e);
            output::exit_code(&e)
        }
    };

    // A prompt abandoned with Ctrl-C can leave a blocking stdin read behind; exit without
    // waiting for it.
    std::process::exit(code);
}

/// Resolves on Ctrl-C. If no handler can be installed it never resolves.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let app = App::from_config(config).await?;

    match app.config.command.clone() {
        Command::Request {
            method,
            url,
            headers,
            body,
        } => commands::request::run(&app, &method, &url, &headers, body.as_deref()).await,
        Command::Diagnose { url } => commands::diagnose::run(&app, &url).await,
        Command::Credentials(command) => commands::credentials::run(&app, command).await,
        Command::Ledger(command) => commands::ledger::run(&app, command).await,
    }
}
