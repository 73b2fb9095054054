use anyhow::{Context, Result};
use auth_recovery::Endpoint;
use service::config::LedgerCommand;

use crate::app::App;
use crate::output::{print_ledger_entry, print_success, print_warning};

pub async fn run(app: &App, command: LedgerCommand) -> Result<()> {
    if app.config.ledger_state.is_none() {
        print_warning(
            "No --ledger-state configured: the ledger only lives for one invocation, so there is nothing persisted to show or reset",
        );
    }

    match command {
        LedgerCommand::Show => {
            let snapshot = app.ledger.snapshot().await;
            if snapshot.entries.is_empty() {
                println!("No failed attempts recorded");
            }
            for entry in &snapshot.entries {
                print_ledger_entry(entry, app.ledger.max_retries());
            }
            Ok(())
        }
        LedgerCommand::Reset { all: true, .. } => {
            let count = app.ledger.reset_all().await;
            app.save_ledger().await?;
            print_success(&format!("Reset {count} endpoint(s)"));
            Ok(())
        }
        LedgerCommand::Reset { url, .. } => {
            let url = url.context("An endpoint URL or --all is required")?;
            let endpoint =
                Endpoint::parse(&url).with_context(|| format!("Invalid URL {url:?}"))?;
            if app.ledger.reset(&endpoint).await {
                app.save_ledger().await?;
                print_success(&format!("Reset {endpoint}; automatic retries are allowed again"));
            } else {
                print_warning(&format!("{endpoint} has no ledger entry"));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_recovery::ledger::{Admission, LedgerSnapshot, RetryLedger};
    use clap::Parser;
    use service::config::Config;

    #[tokio::test]
    async fn test_reset_clears_a_persisted_lockout() {
        let path = std::env::temp_dir()
            .join(format!("restkit-ledger-cli-{}", std::process::id()))
            .join("ledger.json");
        let endpoint = Endpoint::parse("https://mgmt.local:8443").unwrap();

        let locked = RetryLedger::new();
        for _ in 0..locked.max_retries() {
            match locked.check_and_reserve(&endpoint).await {
                Admission::Allowed(reservation) => locked.record_outcome(reservation, false).await,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(!locked.check_and_reserve(&endpoint).await.is_allowed());
        locked.snapshot().await.save(&path).await.unwrap();

        let path_arg = path.display().to_string();
        let config = Config::try_parse_from([
            "restkit",
            "--ledger-state",
            path_arg.as_str(),
            "ledger",
            "reset",
            "https://mgmt.local:8443/anything",
        ])
        .unwrap();
        let app = App::from_config(config).await.unwrap();
        let command = match app.config.command.clone() {
            service::config::Command::Ledger(command) => command,
            other => panic!("unexpected command {:?}", other),
        };
        run(&app, command).await.unwrap();

        let reloaded = RetryLedger::from_snapshot(LedgerSnapshot::load(&path).await.unwrap());
        assert!(reloaded.entry(&endpoint).await.is_none());
        assert!(reloaded.check_and_reserve(&endpoint).await.is_allowed());
    }
}
