//! Batch submission entry point.
//!
//! A batch is two equal-length lists of links and card key codes. Pairs
//! are processed strictly in order and each pair emits one or more tagged
//! events through the caller's channel before the next pair starts, so a
//! front end can render progress incrementally. A failing pair never
//! aborts the rest of the batch. If the receiver hangs up, remaining
//! events are dropped but every started job still runs to settlement so
//! its card key is released.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use verikey_types::JobStatus;
use verikey_upstream::UpstreamApi;

use crate::orchestrator::JobRunner;
use crate::outcome;
use crate::rate_limit::RateLimited;
use crate::{ident, VerifyError};

/// One batch of `(link, card key code)` pairs, matched by index.
#[derive(Clone, Debug)]
pub struct BatchRequest {
    pub links: Vec<String>,
    pub card_key_codes: Vec<String>,
}

impl BatchRequest {
    fn validate(&self, max_batch: usize) -> Result<(), BatchError> {
        if self.links.is_empty() || self.links.len() != self.card_key_codes.len() {
            return Err(BatchError::LengthMismatch);
        }
        if self.links.len() > max_batch {
            return Err(BatchError::TooLarge(max_batch));
        }
        Ok(())
    }
}

/// Rejections that stop a batch before any pair is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("links and card key codes must be non-empty lists of equal length")]
    LengthMismatch,

    #[error("batch size exceeds the maximum of {0}")]
    TooLarge(usize),

    #[error(transparent)]
    RateLimited(#[from] RateLimited),
}

/// Ordered, per-index progress events for one batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BatchEvent {
    /// A job was created and its card key locked.
    #[serde(rename_all = "camelCase")]
    Queued {
        index: usize,
        job_id: String,
        verification_id: String,
    },
    /// An existing job already tracks this identifier; no new work done.
    #[serde(rename_all = "camelCase")]
    Duplicate {
        index: usize,
        job_id: String,
        status: JobStatus,
        result_url: Option<String>,
        verification_id: String,
        message: Option<String>,
        skip_consume: bool,
    },
    /// The pair's job reached a terminal status.
    #[serde(rename_all = "camelCase")]
    Result {
        index: usize,
        job_id: String,
        status: JobStatus,
        result_url: Option<String>,
        message: Option<String>,
        verification_id: Option<String>,
        skip_consume: bool,
    },
    /// The pair failed before or outside its job.
    #[serde(rename_all = "camelCase")]
    Error { index: usize, message: String },
}

impl<U: UpstreamApi> JobRunner<U> {
    /// Process a whole batch, emitting events as each pair progresses.
    ///
    /// `client_id` feeds the per-client rate limiter; a rejection carries
    /// the seconds remaining in the window.
    pub async fn run_batch(
        &self,
        client_id: &str,
        request: &BatchRequest,
        events: mpsc::Sender<BatchEvent>,
    ) -> Result<(), BatchError> {
        self.batch_limiter().check(client_id)?;
        request.validate(self.config().params.max_batch)?;

        for (index, (link, code)) in request
            .links
            .iter()
            .zip(&request.card_key_codes)
            .enumerate()
        {
            self.process_pair(index, link, code, &events).await;
        }
        Ok(())
    }

    /// Convenience wrapper gathering all events of one batch. The channel
    /// is sized to hold a full batch, so no consumer needs to run
    /// concurrently.
    pub async fn run_batch_collect(
        &self,
        client_id: &str,
        request: &BatchRequest,
    ) -> Result<Vec<BatchEvent>, BatchError> {
        let capacity = self.config().params.max_batch.max(1) * 4;
        let (tx, mut rx) = mpsc::channel(capacity);
        self.run_batch(client_id, request, tx).await?;

        let mut collected = Vec::new();
        while let Ok(event) = rx.try_recv() {
            collected.push(event);
        }
        Ok(collected)
    }

    async fn process_pair(
        &self,
        index: usize,
        link: &str,
        code: &str,
        events: &mpsc::Sender<BatchEvent>,
    ) {
        let Some(verification_id) = ident::extract(link) else {
            let message = "unable to extract a verification id".to_string();
            emit(events, BatchEvent::Error { index, message }).await;
            return;
        };
        if let Err(e) = ident::validate(&verification_id) {
            let message = e.to_string();
            emit(events, BatchEvent::Error { index, message }).await;
            return;
        }

        match self.check_duplicate(&verification_id) {
            Ok(Some(existing)) => {
                let skip_consume = existing
                    .result_message
                    .as_deref()
                    .map(outcome::message_signals_skip)
                    .unwrap_or(false);
                emit(
                    events,
                    BatchEvent::Duplicate {
                        index,
                        job_id: existing.id,
                        status: existing.status,
                        result_url: existing.result_url,
                        verification_id,
                        message: existing.result_message,
                        skip_consume,
                    },
                )
                .await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                emit(events, error_event(index, &e)).await;
                return;
            }
        }

        let job = match self.create_job(link, code) {
            Ok(job) => job,
            Err(e) => {
                emit(events, error_event(index, &e)).await;
                return;
            }
        };
        emit(
            events,
            BatchEvent::Queued {
                index,
                job_id: job.id.clone(),
                verification_id: verification_id.clone(),
            },
        )
        .await;

        match self.process_job(&job.id).await {
            Ok(outcome) => {
                emit(
                    events,
                    BatchEvent::Result {
                        index,
                        job_id: job.id,
                        status: outcome.status,
                        result_url: outcome.result_url,
                        message: outcome.message,
                        verification_id: outcome.verification_id.or(Some(verification_id)),
                        skip_consume: outcome.skip_consume,
                    },
                )
                .await;
            }
            Err(e) => {
                emit(events, error_event(index, &e)).await;
            }
        }
    }
}

fn error_event(index: usize, error: &VerifyError) -> BatchEvent {
    BatchEvent::Error {
        index,
        message: error.surface_message(),
    }
}

/// Best-effort delivery: a departed receiver drops events but must not
/// interrupt settlement of in-flight jobs.
async fn emit(events: &mpsc::Sender<BatchEvent>, event: BatchEvent) {
    let _ = events.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_in_wire_shape() {
        let event = BatchEvent::Queued {
            index: 0,
            job_id: "j1".into(),
            verification_id: "6a00000000000000000000aa".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "queued");
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["verificationId"], "6a00000000000000000000aa");

        let event = BatchEvent::Result {
            index: 1,
            job_id: "j2".into(),
            status: JobStatus::Success,
            result_url: Some("https://x/y".into()),
            message: None,
            verification_id: None,
            skip_consume: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["resultUrl"], "https://x/y");
        assert_eq!(json["skipConsume"], false);
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        let empty = BatchRequest {
            links: vec![],
            card_key_codes: vec![],
        };
        assert!(matches!(
            empty.validate(20),
            Err(BatchError::LengthMismatch)
        ));

        let mismatched = BatchRequest {
            links: vec!["a".into(), "b".into()],
            card_key_codes: vec!["k".into()],
        };
        assert!(matches!(
            mismatched.validate(20),
            Err(BatchError::LengthMismatch)
        ));

        let oversized = BatchRequest {
            links: vec!["a".into(); 21],
            card_key_codes: vec!["k".into(); 21],
        };
        assert!(matches!(oversized.validate(20), Err(BatchError::TooLarge(20))));

        let fine = BatchRequest {
            links: vec!["a".into(); 20],
            card_key_codes: vec!["k".into(); 20],
        };
        assert!(fine.validate(20).is_ok());
    }
}
