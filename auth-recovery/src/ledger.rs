//! Per-endpoint retry accounting with a hard ceiling and lockout.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::endpoint::Endpoint;
use crate::error::Error;

/// Failed recovery attempts allowed per endpoint before lockout.
pub const MAX_RETRIES: u32 = 2;

/// Answer to "may I start another recovery attempt?".
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// A reservation was taken; settle it with `record_outcome` or `release`.
    Allowed(Reservation),
    /// No more attempts. `attempts` is the failed-attempt count at the time of the check.
    LockedOut { attempts: u32 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed(_))
    }
}

/// One admitted recovery attempt. It counts toward the endpoint's ceiling until it is handed
/// back to [`RetryLedger::record_outcome`] or [`RetryLedger::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an unsettled reservation keeps counting toward the retry ceiling"]
pub struct Reservation {
    endpoint: Endpoint,
}

impl Reservation {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Point-in-time view of one endpoint's ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryLedgerEntry {
    pub endpoint: Endpoint,
    pub attempt_count: u32,
    pub locked_out: bool,
    #[serde(default)]
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Slot {
    attempt_count: u32,
    /// Attempts admitted but not yet settled.
    in_flight: u32,
    locked_out: bool,
    last_failure_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn entry(&self, endpoint: &Endpoint) -> RetryLedgerEntry {
        RetryLedgerEntry {
            endpoint: endpoint.clone(),
            attempt_count: self.attempt_count,
            locked_out: self.locked_out,
            last_failure_at: self.last_failure_at,
        }
    }

    fn clear(&mut self, endpoint: &Endpoint) {
        if self.attempt_count > 0 || self.locked_out {
            info!(
                "{} authenticated, clearing {} failed attempts",
                endpoint, self.attempt_count
            );
        }
        self.attempt_count = 0;
        self.locked_out = false;
        self.last_failure_at = None;
    }
}

/// Tracks failed recovery attempts per endpoint.
///
/// Each endpoint has its own lock, so checks against different endpoints never contend.
/// Admitted attempts hold a reservation that counts toward the ceiling until it is settled;
/// two concurrent failures against the same endpoint can therefore never both be admitted
/// past the limit.
#[derive(Debug, Default)]
pub struct RetryLedger {
    slots: DashMap<Endpoint, Arc<Mutex<Slot>>>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(&self) -> u32 {
        MAX_RETRIES
    }

    /// Rebuild a ledger from persisted state.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let ledger = Self::new();
        for entry in snapshot.entries {
            let attempt_count = entry.attempt_count.min(MAX_RETRIES);
            let slot = Slot {
                attempt_count,
                in_flight: 0,
                locked_out: entry.locked_out && attempt_count >= MAX_RETRIES,
                last_failure_at: entry.last_failure_at,
            };
            ledger
                .slots
                .insert(entry.endpoint, Arc::new(Mutex::new(slot)));
        }
        ledger
    }

    fn slot(&self, endpoint: &Endpoint) -> Arc<Mutex<Slot>> {
        self.slots
            .entry(endpoint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    fn existing_slot(&self, endpoint: &Endpoint) -> Option<Arc<Mutex<Slot>>> {
        self.slots.get(endpoint).map(|slot| slot.value().clone())
    }

    /// Admit one more recovery attempt against `endpoint`, or report lockout.
    ///
    /// Creates the entry on first use. Never increments the failure count.
    pub async fn check_and_reserve(&self, endpoint: &Endpoint) -> Admission {
        let slot = self.slot(endpoint);
        let mut slot = slot.lock().await;

        if slot.locked_out || slot.attempt_count + slot.in_flight >= MAX_RETRIES {
            if slot.attempt_count >= MAX_RETRIES && !slot.locked_out {
                slot.locked_out = true;
                warn!(
                    "{} locked out after {} failed authentication attempts",
                    endpoint, slot.attempt_count
                );
            }
            return Admission::LockedOut {
                attempts: slot.attempt_count,
            };
        }

        slot.in_flight += 1;
        debug!(
            "Recovery attempt admitted for {} ({} failed so far)",
            endpoint, slot.attempt_count
        );
        Admission::Allowed(Reservation {
            endpoint: endpoint.clone(),
        })
    }

    /// Settle an admitted attempt. Success resets the endpoint; failure counts one attempt.
    pub async fn record_outcome(&self, reservation: Reservation, success: bool) {
        let endpoint = reservation.endpoint;
        let slot = self.slot(&endpoint);
        let mut slot = slot.lock().await;
        // Zero only when the entry was reset while the attempt was out.
        slot.in_flight = slot.in_flight.saturating_sub(1);

        if success {
            slot.clear(&endpoint);
        } else {
            slot.attempt_count += 1;
            debug_assert!(
                slot.attempt_count <= MAX_RETRIES,
                "{endpoint} recorded {} failures past a ceiling of {MAX_RETRIES}",
                slot.attempt_count
            );
            slot.last_failure_at = Some(Utc::now());
            debug!(
                "Recorded failed attempt {}/{} for {}",
                slot.attempt_count, MAX_RETRIES, endpoint
            );
        }
    }

    /// A request to `endpoint` succeeded without any recovery attempt. Clears failures and
    /// lockout but leaves other callers' reservations in place. No-op for unknown endpoints.
    pub async fn record_success(&self, endpoint: &Endpoint) {
        if let Some(slot) = self.existing_slot(endpoint) {
            slot.lock().await.clear(endpoint);
        }
    }

    /// Hand back a reservation without counting it (the attempt never got a verdict from the
    /// server).
    pub async fn release(&self, reservation: Reservation) {
        if let Some(slot) = self.existing_slot(&reservation.endpoint) {
            let mut slot = slot.lock().await;
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
    }

    /// Forget everything about `endpoint`. Returns whether there was an entry.
    pub async fn reset(&self, endpoint: &Endpoint) -> bool {
        let removed = self.slots.remove(endpoint).is_some();
        if removed {
            info!("Retry ledger reset for {}", endpoint);
        }
        removed
    }

    pub async fn reset_all(&self) -> usize {
        let count = self.slots.len();
        self.slots.clear();
        info!("Retry ledger reset for all {} endpoints", count);
        count
    }

    pub async fn entry(&self, endpoint: &Endpoint) -> Option<RetryLedgerEntry> {
        let slot = self.existing_slot(endpoint)?;
        let slot = slot.lock().await;
        Some(slot.entry(endpoint))
    }

    /// Copy of every entry, sorted by endpoint.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        // Collect the handles first so no map shard is held across an await.
        let slots: Vec<(Endpoint, Arc<Mutex<Slot>>)> = self
            .slots
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();

        let mut entries = Vec::with_capacity(slots.len());
        for (endpoint, slot) in slots {
            entries.push(slot.lock().await.entry(&endpoint));
        }
        entries.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        LedgerSnapshot { entries }
    }
}

/// Serializable ledger state, for tools that want lockouts to outlive the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub entries: Vec<RetryLedgerEntry>,
}

impl LedgerSnapshot {
    /// Read a snapshot file. A missing file is an empty ledger.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Self::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the snapshot via a temp file and rename.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serde_json::to_string_pretty(self)?).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}
