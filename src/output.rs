use colored::*;

use auth_recovery::ledger::RetryLedgerEntry;
use auth_recovery::InferenceCandidate;

/// Exit code for an error, by what ended the call.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err
        .chain()
        .find_map(|cause| cause.downcast_ref::<auth_recovery::Error>())
    {
        Some(e) if e.is_cancelled() => 130,
        Some(e) if e.is_lockout() => 2,
        _ => 1,
    }
}

pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "✗".red().bold(), err);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "!".yellow().bold(), message);
}

pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message);
}

pub fn print_step(message: &str) {
    eprintln!("{} {}", "→".blue(), message);
}

pub fn print_candidates(candidates: &[InferenceCandidate]) {
    for (index, candidate) in candidates.iter().enumerate() {
        let confidence = match candidate.confidence {
            auth_recovery::Confidence::High => candidate.confidence.to_string().green().bold(),
            auth_recovery::Confidence::Medium => candidate.confidence.to_string().yellow(),
            auth_recovery::Confidence::Low => candidate.confidence.to_string().dimmed(),
        };
        println!(
            "  {}. {} [{}]",
            index + 1,
            candidate.scheme.label().bold(),
            confidence
        );
        for evidence in &candidate.evidence {
            println!("       {}", evidence.dimmed());
        }
    }
}

pub fn print_ledger_entry(entry: &RetryLedgerEntry, max_retries: u32) {
    let state = if entry.locked_out {
        "LOCKED OUT".red().bold()
    } else if entry.attempt_count > 0 {
        "RETRYING".yellow().bold()
    } else {
        "OK".green().bold()
    };
    let last_failure = entry
        .last_failure_at
        .map(|at| format!(", last failure {}", at.to_rfc3339()))
        .unwrap_or_default();
    println!(
        "[{}] {} ({}/{} failed attempts{})",
        state, entry.endpoint, entry.attempt_count, max_retries, last_failure
    );
}
