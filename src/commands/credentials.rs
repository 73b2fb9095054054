use anyhow::{bail, Context, Result};
use auth_recovery::credentials::encryption::generate_key;
use auth_recovery::credentials::CredentialRecord;
use auth_recovery::detector::{Classification, FailureDetector};
use auth_recovery::error::lockout;
use auth_recovery::http::{ApiRequest, ApiResponse};
use auth_recovery::inference::fallback_candidates;
use auth_recovery::ledger::Admission;
use auth_recovery::Endpoint;
use colored::*;
use log::*;
use service::config::CredentialsCommand;

use crate::app::App;
use crate::output::{print_step, print_success, print_warning};

pub async fn run(app: &App, command: CredentialsCommand) -> Result<()> {
    match command {
        CredentialsCommand::Set { url } => set(app, &url).await,
        CredentialsCommand::List => list(app).await,
        CredentialsCommand::Delete { url } => delete(app, &url).await,
        CredentialsCommand::GenerateKey => {
            println!("{}", generate_key());
            Ok(())
        }
    }
}

/// Infer, prompt, verify and save a credential for the endpoint behind `url`.
///
/// The verification request is a recovery attempt like any other: it needs an admission from
/// the retry ledger and a rejection counts against the endpoint.
pub async fn set(app: &App, url: &str) -> Result<()> {
    if !app.durable_store {
        bail!("No CREDENTIAL_KEY configured, so there is nowhere to save credentials");
    }

    let bare = ApiRequest::get(url).with_context(|| format!("Invalid URL {url:?}"))?;
    let endpoint = Endpoint::from_url(&bare.url)?;
    let detector = FailureDetector::new();

    let reservation = match app.ledger.check_and_reserve(&endpoint).await {
        Admission::Allowed(reservation) => reservation,
        Admission::LockedOut { attempts } => return Err(lockout(&endpoint, attempts).into()),
    };

    let verified = match collect_and_verify(app, &bare, &endpoint, &detector).await {
        Ok(verified) => verified,
        Err(e) => {
            app.ledger.release(reservation).await;
            return Err(e);
        }
    };

    let (record, response) = verified;
    if detector.classify(response.status, &response.headers, &response.body)
        == Classification::AuthFailure
    {
        app.ledger.record_outcome(reservation, false).await;
        app.save_ledger_or_warn().await;
        bail!(
            "{endpoint} rejected the credential ({}); nothing was saved",
            response.status
        );
    }
    app.ledger.record_outcome(reservation, true).await;
    app.save_ledger_or_warn().await;

    app.store
        .save(&endpoint, &record)
        .await
        .with_context(|| format!("Failed to save the credential for {endpoint}"))?;
    info!("Stored {} credential for {}", record.scheme, endpoint);
    print_success(&format!("Saved {} credential for {}", record.scheme, endpoint));
    Ok(())
}

/// Send `bare` without credentials, collect one, and send `bare` again with it.
async fn collect_and_verify(
    app: &App,
    bare: &ApiRequest,
    endpoint: &Endpoint,
    detector: &FailureDetector,
) -> Result<(CredentialRecord, ApiResponse)> {
    print_step(&format!("Contacting {endpoint}..."));
    let response = app
        .executor
        .send(bare)
        .await
        .with_context(|| format!("Could not reach {endpoint}"))?;
    let candidates =
        match detector.classify(response.status, &response.headers, &response.body) {
            Classification::AuthFailure => {
                app.inferencer
                    .infer(&response.headers, &response.body, &bare.url)
            }
            Classification::Unrelated => {
                print_warning(&format!(
                    "{endpoint} answered {} without credentials; offering every scheme",
                    response.status
                ));
                fallback_candidates()
            }
        };

    let draft = app.prompter().collect(endpoint, &candidates).await?;
    let record = draft.into_record(endpoint);

    let mut verify = bare.clone();
    record.apply(&mut verify.headers)?;
    let verified = app
        .executor
        .send(&verify)
        .await
        .with_context(|| format!("Could not reach {endpoint} to verify the credential"))?;
    Ok((record, verified))
}

async fn list(app: &App) -> Result<()> {
    let summaries = app
        .store
        .list()
        .await
        .context("Failed to read the credential store")?;

    if summaries.is_empty() {
        println!("No saved credentials");
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{} {} via {} (created {}, updated {})",
            summary.endpoint.to_string().bold(),
            summary.scheme.to_string().cyan(),
            summary.header_names.join(", "),
            summary.created_at.to_rfc3339(),
            summary.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn delete(app: &App, url: &str) -> Result<()> {
    let endpoint = Endpoint::parse(url).with_context(|| format!("Invalid URL {url:?}"))?;
    if app.store.delete(&endpoint).await? {
        print_success(&format!("Deleted the saved credential for {endpoint}"));
    } else {
        print_warning(&format!("No saved credential for {endpoint}"));
    }
    Ok(())
}
