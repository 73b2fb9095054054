//! Detect, infer, obtain a credential, retry.
//!
//! [`RecoveryOrchestrator::execute`] sends a request and, when the server answers with an
//! authentication failure, works through the recovery loop:
//!
//! 1. ask the [`RetryLedger`] for a reservation (lockout ends the call),
//! 2. on the first pass try the saved credential for the endpoint,
//! 3. otherwise infer likely schemes and let the [`Prompter`] collect a credential,
//! 4. resend the caller's original request with the credential's headers applied.
//!
//! Each retry that fails again is recorded against the ledger before the next check, so an
//! endpoint gets at most [`MAX_RETRIES`](crate::ledger::MAX_RETRIES) failed attempts. Non-auth
//! responses and transport errors are returned unchanged and never touch the ledger.

use std::sync::Arc;

use log::*;

use crate::credentials::{CredentialRecord, CredentialStore};
use crate::detector::{Classification, FailureDetector};
use crate::endpoint::Endpoint;
use crate::error::{lockout, unexpected_status, Error};
use crate::http::{ApiRequest, ApiResponse, RequestExecutor};
use crate::inference::SchemeInferencer;
use crate::ledger::{Admission, Reservation, RetryLedger};
use crate::prompt::Prompter;

/// Where the credential on the final request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from the credential store.
    Saved,
    /// Collected through the prompter during this call.
    Entered,
}

/// What happened to a newly entered credential after it worked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceOutcome {
    /// No new credential, or the user declined to save it.
    NotRequested,
    Saved,
    /// Saving failed. The request itself still succeeded.
    Failed(String),
}

/// A successful call, with how it got there.
#[derive(Debug)]
pub struct Recovered {
    pub response: ApiResponse,
    pub endpoint: Endpoint,
    /// Retries sent with a recovery credential.
    pub recovery_attempts: u32,
    pub credential_source: Option<CredentialSource>,
    pub persistence: PersistenceOutcome,
}

struct Obtained {
    record: CredentialRecord,
    source: CredentialSource,
    persist: bool,
    request: ApiRequest,
}

/// Executes requests with bounded authentication recovery.
pub struct RecoveryOrchestrator {
    executor: Arc<dyn RequestExecutor>,
    store: Arc<dyn CredentialStore>,
    prompter: Arc<dyn Prompter>,
    ledger: Arc<RetryLedger>,
    detector: FailureDetector,
    inferencer: SchemeInferencer,
}

impl RecoveryOrchestrator {
    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        store: Arc<dyn CredentialStore>,
        prompter: Arc<dyn Prompter>,
        ledger: Arc<RetryLedger>,
    ) -> Self {
        Self {
            executor,
            store,
            prompter,
            ledger,
            detector: FailureDetector::new(),
            inferencer: SchemeInferencer::new(),
        }
    }

    pub fn with_inferencer(mut self, inferencer: SchemeInferencer) -> Self {
        self.inferencer = inferencer;
        self
    }

    pub fn ledger(&self) -> &Arc<RetryLedger> {
        &self.ledger
    }

    /// Send `request`, recovering from authentication failures.
    ///
    /// Terminal errors: the unrelated error itself (transport failure or non-auth status),
    /// `LockoutExceeded`, and `UserCancelled`.
    pub async fn execute(&self, request: ApiRequest) -> Result<Recovered, Error> {
        let endpoint = Endpoint::from_url(&request.url)?;

        let mut current = request.clone();
        let mut applied: Option<Obtained> = None;
        let mut reservation: Option<Reservation> = None;
        let mut saved_tried = false;
        let mut recovery_attempts = 0;

        loop {
            let response = match self.executor.send(&current).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(
                        "{} transport failure classified as {:?}",
                        endpoint,
                        self.detector.classify_transport(&e)
                    );
                    if let Some(reservation) = reservation.take() {
                        self.ledger.release(reservation).await;
                    }
                    return Err(e);
                }
            };

            if response.is_success() {
                match reservation.take() {
                    Some(reservation) => self.ledger.record_outcome(reservation, true).await,
                    None => self.ledger.record_success(&endpoint).await,
                }
                let persistence = match &applied {
                    Some(obtained) => self.persist(&endpoint, obtained).await,
                    None => PersistenceOutcome::NotRequested,
                };
                if recovery_attempts > 0 {
                    info!(
                        "{} accepted the credential after {} recovery attempt(s)",
                        endpoint, recovery_attempts
                    );
                }
                return Ok(Recovered {
                    response,
                    endpoint,
                    recovery_attempts,
                    credential_source: applied.map(|obtained| obtained.source),
                    persistence,
                });
            }

            let classification =
                self.detector
                    .classify(response.status, &response.headers, &response.body);
            if classification == Classification::Unrelated {
                if let Some(reservation) = reservation.take() {
                    self.ledger.release(reservation).await;
                }
                return Err(unexpected_status(response.status.as_u16(), &response.body));
            }

            if let Some(reservation) = reservation.take() {
                warn!(
                    "{} rejected the {} credential ({})",
                    endpoint,
                    applied
                        .as_ref()
                        .map(|obtained| obtained.record.scheme.as_str())
                        .unwrap_or("supplied"),
                    response.status
                );
                self.ledger.record_outcome(reservation, false).await;
                if applied
                    .as_ref()
                    .is_some_and(|obtained| obtained.source == CredentialSource::Entered)
                {
                    self.prompter.rejected(&endpoint).await;
                }
            } else {
                info!(
                    "{} answered {}; starting authentication recovery",
                    endpoint, response.status
                );
            }

            let admitted = match self.ledger.check_and_reserve(&endpoint).await {
                Admission::Allowed(admitted) => admitted,
                Admission::LockedOut { attempts } => return Err(lockout(&endpoint, attempts)),
            };

            let obtained = match self
                .obtain(&endpoint, &request, &response, &mut saved_tried)
                .await
            {
                Ok(obtained) => obtained,
                Err(e) => {
                    self.ledger.release(admitted).await;
                    return Err(e);
                }
            };
            reservation = Some(admitted);

            current = obtained.request.clone();
            applied = Some(obtained);
            recovery_attempts += 1;
        }
    }

    /// Produce the next request to try: saved credential on the first pass, else prompt.
    async fn obtain(
        &self,
        endpoint: &Endpoint,
        original: &ApiRequest,
        response: &ApiResponse,
        saved_tried: &mut bool,
    ) -> Result<Obtained, Error> {
        if !*saved_tried {
            *saved_tried = true;
            match self.store.load(endpoint).await {
                Ok(Some(record)) => match with_credential(original, &record) {
                    Ok(request) => {
                        info!("Retrying {} with saved {} credential", endpoint, record.scheme);
                        return Ok(Obtained {
                            record,
                            source: CredentialSource::Saved,
                            persist: false,
                            request,
                        });
                    }
                    Err(e) => warn!("Saved credential for {} is unusable: {}", endpoint, e),
                },
                Ok(None) => debug!("No saved credential for {}", endpoint),
                Err(e) => warn!("Could not load saved credential for {}: {}", endpoint, e),
            }
        }

        let candidates = self
            .inferencer
            .infer(&response.headers, &response.body, &original.url);
        if let Some(top) = candidates.first() {
            debug!(
                "Top scheme candidate for {}: {} ({})",
                endpoint, top.scheme, top.confidence
            );
        }

        let draft = self.prompter.collect(endpoint, &candidates).await?;
        let persist = self.prompter.ask_persist(endpoint).await?;
        let record = draft.into_record(endpoint);
        let request = with_credential(original, &record)?;

        Ok(Obtained {
            record,
            source: CredentialSource::Entered,
            persist,
            request,
        })
    }

    async fn persist(&self, endpoint: &Endpoint, obtained: &Obtained) -> PersistenceOutcome {
        if obtained.source != CredentialSource::Entered || !obtained.persist {
            return PersistenceOutcome::NotRequested;
        }
        match self.store.save(endpoint, &obtained.record).await {
            Ok(()) => PersistenceOutcome::Saved,
            Err(e) => {
                warn!(
                    "Request succeeded but the credential for {} could not be saved: {}",
                    endpoint, e
                );
                PersistenceOutcome::Failed(e.to_string())
            }
        }
    }
}

/// The caller's request with the credential's headers set on a copy.
fn with_credential(original: &ApiRequest, record: &CredentialRecord) -> Result<ApiRequest, Error> {
    let mut request = original.clone();
    record.apply(&mut request.headers)?;
    Ok(request)
}
