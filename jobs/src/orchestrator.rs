//! The verification job orchestrator.
//!
//! Drives one job through the full state machine:
//! `Queued → Processing → (Pending ⇄ polling) → {Success, Fail, Error,
//! Timeout}`. The card key is locked atomically with job creation and is
//! released or charged at settlement on every path out of the protocol —
//! including transport failures and the deadline — so no failure mode can
//! strand a key in `Locked`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{info, warn};

use verikey_store::Store;
use verikey_types::{DailyStats, JobStatus, Timestamp, VerificationJob};
use verikey_upstream::{UpstreamApi, UpstreamPayload};
use verikey_utils::{date_key, new_id};

use crate::config::VerifyConfig;
use crate::keys::KeyManager;
use crate::outcome::{self, VerifyOutcome};
use crate::rate_limit::RateLimiter;
use crate::{ident, VerifyError};

const TIMEOUT_PENDING_MESSAGE: &str = "still under review, no final status before the deadline";
const TIMEOUT_SILENT_MESSAGE: &str = "no result before the deadline";

/// How the protocol phase ended short of a terminal payload.
enum ProtocolEnd {
    Settled(VerifyOutcome),
    DeadlineReached,
}

/// Statuses that make a newer submission a duplicate.
const DUPLICATE_STATUSES: [JobStatus; 4] = [
    JobStatus::Queued,
    JobStatus::Processing,
    JobStatus::Pending,
    JobStatus::Success,
];

/// Orchestrates verification jobs against a store and the upstream service.
pub struct JobRunner<U: UpstreamApi> {
    store: Arc<dyn Store>,
    keys: KeyManager,
    upstream: Arc<U>,
    config: VerifyConfig,
    batch_limiter: RateLimiter,
    login_limiter: RateLimiter,
}

impl<U: UpstreamApi> JobRunner<U> {
    pub fn new(store: Arc<dyn Store>, upstream: Arc<U>, config: VerifyConfig) -> Self {
        let window = Duration::from_secs(config.params.rate_window_secs);
        Self {
            keys: KeyManager::new(store.clone()),
            batch_limiter: RateLimiter::new(config.params.batch_rate_limit, window),
            login_limiter: RateLimiter::new(config.params.login_rate_limit, window),
            store,
            upstream,
            config,
        }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// The card key manager, for the admin collaborator.
    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub(crate) fn batch_limiter(&self) -> &RateLimiter {
        &self.batch_limiter
    }

    /// The admin-login limiter, for the session collaborator.
    pub fn login_limiter(&self) -> &RateLimiter {
        &self.login_limiter
    }

    /// Most recent job already tracking this identifier that is either
    /// still in flight or succeeded.
    pub fn check_duplicate(
        &self,
        verification_id: &str,
    ) -> Result<Option<VerificationJob>, VerifyError> {
        if verification_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .latest_job_for_verification(verification_id, &DUPLICATE_STATUSES)?)
    }

    /// Lock the card key and create the job row in one store transaction.
    pub fn create_job(
        &self,
        link: &str,
        card_key_code: &str,
    ) -> Result<VerificationJob, VerifyError> {
        let verification_id = ident::extract(link);
        let job = VerificationJob::new(
            new_id(),
            link,
            card_key_code,
            verification_id,
            Timestamp::now(),
        );
        self.keys.lock_and_create_job(&job)?;
        Ok(job)
    }

    /// Run one created job to settlement and return its terminal outcome.
    pub async fn process_job(&self, job_id: &str) -> Result<VerifyOutcome, VerifyError> {
        let Some(mut job) = self.store.get_job(job_id)? else {
            return Err(VerifyError::JobNotFound(job_id.to_string()));
        };
        job.started_at = Some(Timestamp::now());

        let resolved = job
            .verification_id
            .clone()
            .or_else(|| ident::extract(&job.source_link));
        let verification_id = match resolved {
            Some(vid) => vid,
            None => {
                let outcome = VerifyOutcome::error("unable to extract a verification id");
                return self.settle(job, outcome);
            }
        };
        if let Err(e) = ident::validate(&verification_id) {
            return self.settle(job, VerifyOutcome::error(e.to_string()));
        }

        job.status = JobStatus::Processing;
        job.verification_id = Some(verification_id.clone());
        if let Err(e) = self.store.update_job(&job) {
            // Settling instead of propagating keeps the key from being
            // stranded in Locked when the store hiccups here.
            let outcome = VerifyOutcome::error(VerifyError::from(e).surface_message());
            return self.settle(job, outcome);
        }

        if self.config.upstream_secret.is_empty() {
            let outcome = VerifyOutcome::error("verification secret is not configured");
            return self.settle(job, outcome);
        }

        // The job deadline is the orchestrator's own clock, coarser than
        // any single HTTP call's timeout. Wrapping the whole protocol
        // phase also bounds a stream that never closes.
        let deadline =
            Instant::now() + Duration::from_millis(self.config.params.verify_timeout_ms);
        let mut pending_detected = false;
        let driven = timeout_at(
            deadline,
            self.drive_protocol(&mut job, &verification_id, &mut pending_detected, deadline),
        )
        .await;

        let outcome = match driven {
            Ok(Ok(ProtocolEnd::Settled(outcome))) => outcome,
            Ok(Ok(ProtocolEnd::DeadlineReached)) | Err(_) => {
                if pending_detected {
                    VerifyOutcome::timeout(TIMEOUT_PENDING_MESSAGE)
                } else {
                    VerifyOutcome::timeout(TIMEOUT_SILENT_MESSAGE)
                }
            }
            Ok(Err(e)) => VerifyOutcome::error(e.surface_message()),
        };
        self.settle(job, outcome)
    }

    /// Submit the identifier and follow the stream, then the poll loop.
    async fn drive_protocol(
        &self,
        job: &mut VerificationJob,
        verification_id: &str,
        pending_detected: &mut bool,
        deadline: Instant,
    ) -> Result<ProtocolEnd, VerifyError> {
        let mut stream = self
            .upstream
            .submit_batch(
                &[verification_id.to_string()],
                &self.config.upstream_secret,
            )
            .await?;
        let mut check_token: Option<String> = None;

        while let Some(item) = stream.next().await {
            let frame = item?;
            let payload = UpstreamPayload::from_frame_data(&frame.data);

            if job.upstream_request_id.is_none() {
                if let Some(request_id) = payload.get_str("upstreamReqId") {
                    job.upstream_request_id = Some(request_id);
                    self.store.update_job(job)?;
                }
            }

            match frame.event.as_str() {
                "processing" => {
                    job.status = JobStatus::Processing;
                    self.store.update_job(job)?;
                }
                "pending" => {
                    if let Some(token) = payload.first_str(&["checkToken", "token"]) {
                        check_token = Some(token);
                    }
                    job.status = JobStatus::Pending;
                    self.store.update_job(job)?;
                }
                "result" => {
                    if outcome::is_review_pending(&payload) {
                        *pending_detected = true;
                        if check_token.is_none() {
                            check_token = payload.first_str(&["checkToken", "token"]);
                        }
                        job.status = JobStatus::Pending;
                        job.result_message = payload.message();
                        self.store.update_job(job)?;
                        break;
                    }
                    return Ok(ProtocolEnd::Settled(self.finish_outcome(
                        job,
                        verification_id,
                        &payload,
                    )));
                }
                _ => {}
            }
        }

        if let Some(token) = check_token {
            let poll_interval = Duration::from_millis(self.config.params.poll_interval_ms);
            while Instant::now() < deadline {
                let payload = self.upstream.poll_status(&token).await?;
                if outcome::is_poll_pending(&payload) {
                    sleep(poll_interval).await;
                    continue;
                }
                return Ok(ProtocolEnd::Settled(self.finish_outcome(
                    job,
                    verification_id,
                    &payload,
                )));
            }
        }
        Ok(ProtocolEnd::DeadlineReached)
    }

    /// Normalize a terminal payload and backfill identifiers the payload
    /// itself did not carry.
    fn finish_outcome(
        &self,
        job: &VerificationJob,
        verification_id: &str,
        payload: &UpstreamPayload,
    ) -> VerifyOutcome {
        let mut outcome = outcome::normalize(payload);
        if outcome.verification_id.is_none() {
            outcome.verification_id = Some(verification_id.to_string());
        }
        if outcome.upstream_request_id.is_none() {
            outcome.upstream_request_id = job.upstream_request_id.clone();
        }
        outcome
    }

    /// Persist the terminal result and dispose of the card key: a charged
    /// success consumes it, everything else — including a no-charge
    /// duplicate-aware success — unlocks it.
    fn settle(
        &self,
        mut job: VerificationJob,
        outcome: VerifyOutcome,
    ) -> Result<VerifyOutcome, VerifyError> {
        let finished_at = Timestamp::now();
        job.status = outcome.status;
        job.result_message = outcome.message.clone();
        job.result_url = outcome.result_url.clone();
        job.error_code = outcome.error_code.clone();
        job.finished_at = Some(finished_at);
        job.duration_ms = job.started_at.map(|s| s.elapsed_since(finished_at));
        let persisted = self.store.update_job(&job);

        // The key must never stay locked, even when persisting the job
        // row failed.
        let charge = outcome.status == JobStatus::Success && !outcome.skip_consume;
        let disposition = if charge {
            self.keys.consume(&job.card_key_code)
        } else {
            self.keys.unlock(&job.card_key_code)
        };
        if let Err(e) = disposition {
            warn!(
                job_id = %job.id,
                code = %job.card_key_code,
                error = %e,
                "card key disposition failed at settlement"
            );
        }

        // Best-effort: stats never fail a settlement.
        if !outcome.skip_consume {
            let date = date_key(finished_at);
            if let Err(e) = self
                .store
                .bump_daily(&date, outcome.status == JobStatus::Success)
            {
                warn!(date = %date, error = %e, "daily stats increment failed");
            }
        }

        info!(
            job_id = %job.id,
            status = %outcome.status,
            duration_ms = job.duration_ms.unwrap_or(0),
            "verification job settled"
        );
        persisted?;
        Ok(outcome)
    }

    /// Daily counters for one UTC day, zeroed when nothing was recorded.
    pub fn daily_counts(&self, date: &str) -> Result<DailyStats, VerifyError> {
        Ok(self
            .store
            .get_daily(date)?
            .unwrap_or_else(|| DailyStats::new(date)))
    }

    pub fn today_counts(&self) -> Result<DailyStats, VerifyError> {
        self.daily_counts(&date_key(Timestamp::now()))
    }

    /// Most recent job matching a card key and/or verification id; `None`
    /// when neither filter is given.
    pub fn find_job(
        &self,
        card_key_code: Option<&str>,
        verification_id: Option<&str>,
    ) -> Result<Option<VerificationJob>, VerifyError> {
        match (verification_id, card_key_code) {
            (Some(vid), code) => {
                let job = self.store.latest_job_for_verification(vid, &[])?;
                Ok(job.filter(|j| code.is_none_or(|c| j.card_key_code == c)))
            }
            (None, Some(code)) => Ok(self.store.latest_job_for_key(code)?),
            (None, None) => Ok(None),
        }
    }
}
