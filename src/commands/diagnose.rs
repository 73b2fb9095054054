use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use auth_recovery::credentials::StoredCredentialSummary;
use auth_recovery::detector::{Classification, FailureDetector};
use auth_recovery::http::ApiRequest;
use auth_recovery::ledger::RetryLedgerEntry;
use auth_recovery::{Endpoint, InferenceCandidate};
use colored::*;
use log::*;

use crate::app::App;
use crate::output::{print_candidates, print_ledger_entry, print_step};

/// What an unauthenticated request to an endpoint revealed.
#[derive(Debug)]
pub struct Diagnosis {
    pub endpoint: Endpoint,
    pub status: Option<u16>,
    pub transport_error: Option<String>,
    pub latency: Duration,
    /// `None` when the request succeeded.
    pub classification: Option<Classification>,
    pub candidates: Vec<InferenceCandidate>,
    pub saved_credential: Option<StoredCredentialSummary>,
    pub ledger: Option<RetryLedgerEntry>,
}

pub async fn run(app: &App, url: &str) -> Result<()> {
    print_step(&format!("Probing {url} without credentials..."));
    let diagnosis = diagnose(app, url).await?;
    print_diagnosis(&diagnosis, app.ledger.max_retries());
    Ok(())
}

/// Send one request to `url` without credentials. Never prompts and never touches the ledger.
pub async fn diagnose(app: &App, url: &str) -> Result<Diagnosis> {
    let request = ApiRequest::get(url).with_context(|| format!("Invalid URL {url:?}"))?;
    let endpoint = Endpoint::from_url(&request.url)?;
    let detector = FailureDetector::new();

    let started = Instant::now();
    let sent = app.executor.send(&request).await;
    let latency = started.elapsed();

    let (status, transport_error, classification, candidates) = match sent {
        Ok(response) if response.is_success() => (Some(response.status.as_u16()), None, None, vec![]),
        Ok(response) => {
            let classification =
                detector.classify(response.status, &response.headers, &response.body);
            let candidates = if classification == Classification::AuthFailure {
                app.inferencer
                    .infer(&response.headers, &response.body, &request.url)
            } else {
                vec![]
            };
            (
                Some(response.status.as_u16()),
                None,
                Some(classification),
                candidates,
            )
        }
        Err(e) => {
            debug!("Unauthenticated request to {} failed: {:?}", endpoint, e);
            let classification = detector.classify_transport(&e);
            (None, Some(e.to_string()), Some(classification), vec![])
        }
    };

    let saved_credential = app
        .store
        .list()
        .await
        .context("Failed to read the credential store")?
        .into_iter()
        .find(|summary| summary.endpoint == endpoint);
    let ledger = app.ledger.entry(&endpoint).await;

    Ok(Diagnosis {
        endpoint,
        status,
        transport_error,
        latency,
        classification,
        candidates,
        saved_credential,
        ledger,
    })
}

fn print_diagnosis(diagnosis: &Diagnosis, max_retries: u32) {
    println!("\n{}", format!("=== {} ===", diagnosis.endpoint).bright_white().bold());

    match (&diagnosis.status, &diagnosis.transport_error) {
        (Some(status), _) => println!("{}: {}", "Status".bold(), status),
        (None, Some(error)) => println!("{}: {}", "Transport error".bold(), error.red()),
        (None, None) => {}
    }
    println!("{}: {:?}", "Latency".bold(), diagnosis.latency);

    let verdict = match diagnosis.classification {
        None => "reachable, no authentication required".green(),
        Some(Classification::AuthFailure) => "authentication required".yellow().bold(),
        Some(Classification::Unrelated) => "failing for reasons unrelated to authentication".red(),
    };
    println!("{}: {}", "Classification".bold(), verdict);

    if !diagnosis.candidates.is_empty() {
        println!("{}:", "Likely schemes".bold());
        print_candidates(&diagnosis.candidates);
    }

    match &diagnosis.saved_credential {
        Some(summary) => println!(
            "{}: {} via {} (updated {})",
            "Saved credential".bold(),
            summary.scheme,
            summary.header_names.join(", "),
            summary.updated_at.to_rfc3339()
        ),
        None => println!("{}: none", "Saved credential".bold()),
    }

    match &diagnosis.ledger {
        Some(entry) => {
            print!("{}: ", "Retry ledger".bold());
            print_ledger_entry(entry, max_retries);
        }
        None => println!("{}: no failed attempts recorded", "Retry ledger".bold()),
    }
}
