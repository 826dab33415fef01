//! Result normalization for upstream payloads.
//!
//! The external service reports state through whichever of
//! `currentStep`/`status`/`state`/`result` it feels like, plus free-text
//! messages. All of the heuristics that interpret those fields live here —
//! and only here — so the guesswork stays auditable and testable in one
//! place. The phrase matching on `message` is an external-contract risk:
//! it is preserved from the service's observed behavior, not hardened,
//! because the service publishes no schema to harden against.

use serde::Serialize;

use verikey_types::JobStatus;
use verikey_upstream::UpstreamPayload;

/// Message signature meaning the verification was done before we arrived.
const ALREADY_COMPLETED_PHRASE: &str = "verification already completed";

/// Message phrases meaning the verification sits in a review queue.
const REVIEW_PHRASES: &[&str] = &["document uploaded", "waiting for review", "awaiting review"];

/// Step values meaning "still in progress" during the submit stream.
const PENDING_STEPS: &[&str] = &["pending", "processing", "queued", "review"];

/// Step values that keep the poll loop going. Narrower than
/// [`PENDING_STEPS`]: a final `review` status from the poll endpoint must
/// settle rather than loop forever.
const POLL_PENDING_STEPS: &[&str] = &["pending", "processing", "queued"];

/// A normalized terminal result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub message: Option<String>,
    pub error_code: Option<String>,
    pub verification_id: Option<String>,
    pub upstream_request_id: Option<String>,
    pub skip_consume: bool,
}

impl VerifyOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            result_url: None,
            message: Some(message.into()),
            error_code: None,
            verification_id: None,
            upstream_request_id: None,
            skip_consume: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Timeout,
            ..Self::error(message)
        }
    }
}

/// The step field, whichever alias the service used, lowercased.
pub fn step(payload: &UpstreamPayload) -> String {
    payload
        .first_str(&["currentStep", "current_step", "status", "state", "result"])
        .unwrap_or_default()
        .to_lowercase()
}

fn message_lower(payload: &UpstreamPayload) -> String {
    payload.message().unwrap_or_default().to_lowercase()
}

/// Was this verification completed before this attempt did any work?
pub fn is_already_completed(payload: &UpstreamPayload) -> bool {
    let step = step(payload);
    if step == "precheck_success" || step == "completed" {
        return true;
    }
    message_lower(payload).contains(ALREADY_COMPLETED_PHRASE)
}

/// Does a `result` frame actually mean "under review, poll for the rest"?
pub fn is_review_pending(payload: &UpstreamPayload) -> bool {
    if is_already_completed(payload) {
        return false;
    }
    let step = step(payload);
    if PENDING_STEPS.contains(&step.as_str()) {
        return true;
    }
    let message = message_lower(payload);
    REVIEW_PHRASES.iter().any(|p| message.contains(p))
}

/// Should the poll loop keep waiting on this payload?
pub fn is_poll_pending(payload: &UpstreamPayload) -> bool {
    POLL_PENDING_STEPS.contains(&step(payload).as_str())
}

/// Does a stored result message carry the no-charge success signature?
/// Used when replaying a duplicate job's result to a new caller.
pub fn message_signals_skip(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains(ALREADY_COMPLETED_PHRASE) || lower.contains("precheck_success")
}

/// Normalize a payload into a terminal outcome.
///
/// Success is anything the service plausibly means as success: an explicit
/// boolean flag, a `SUCCESS`/`PRECHECK_SUCCESS` status under any alias,
/// the already-completed message signature, or the mere presence of a
/// result URL. Explicit `ERROR`/`TIMEOUT` statuses pass through; anything
/// else is a plain failure.
pub fn normalize(payload: &UpstreamPayload) -> VerifyOutcome {
    let status_raw = payload
        .first_str(&["status", "state", "result", "currentStep"])
        .unwrap_or_default()
        .to_uppercase();
    let already_completed = is_already_completed(payload);
    let result_url = payload
        .first_str(&["resultUrl", "url"])
        .filter(|u| !u.is_empty());

    let is_success = payload.get_bool("success") == Some(true)
        || status_raw == "SUCCESS"
        || status_raw == "PRECHECK_SUCCESS"
        || message_lower(payload).contains(ALREADY_COMPLETED_PHRASE)
        || result_url.is_some();

    let status = if is_success {
        JobStatus::Success
    } else if status_raw == "ERROR" {
        JobStatus::Error
    } else if status_raw == "TIMEOUT" {
        JobStatus::Timeout
    } else {
        JobStatus::Fail
    };

    VerifyOutcome {
        status,
        result_url,
        message: payload.message(),
        error_code: payload.get_str("errorCode"),
        verification_id: payload.get_str("verificationId"),
        upstream_request_id: payload.get_str("upstreamReqId"),
        skip_consume: already_completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> UpstreamPayload {
        UpstreamPayload::from_frame_data(json)
    }

    // ── step resolution ─────────────────────────────────────────────────

    #[test]
    fn step_prefers_current_step_over_status() {
        let p = payload(r#"{"currentStep":"REVIEW","status":"SUCCESS"}"#);
        assert_eq!(step(&p), "review");
    }

    #[test]
    fn step_falls_through_aliases() {
        assert_eq!(step(&payload(r#"{"state":"Pending"}"#)), "pending");
        assert_eq!(step(&payload(r#"{"result":"FAIL"}"#)), "fail");
        assert_eq!(step(&payload(r#"{"unrelated":1}"#)), "");
    }

    // ── success detection ───────────────────────────────────────────────

    #[test]
    fn explicit_success_variants_normalize_to_success() {
        for json in [
            r#"{"success":true}"#,
            r#"{"status":"SUCCESS"}"#,
            r#"{"state":"success"}"#,
            r#"{"status":"PRECHECK_SUCCESS"}"#,
            r#"{"url":"https://svc.example/r/1"}"#,
            r#"{"resultUrl":"https://svc.example/r/2","status":"WHATEVER"}"#,
            r#"{"message":"Verification already completed for this id"}"#,
        ] {
            assert_eq!(normalize(&payload(json)).status, JobStatus::Success, "{json}");
        }
    }

    #[test]
    fn explicit_error_and_timeout_pass_through() {
        assert_eq!(
            normalize(&payload(r#"{"status":"ERROR","message":"boom"}"#)).status,
            JobStatus::Error
        );
        assert_eq!(
            normalize(&payload(r#"{"status":"TIMEOUT"}"#)).status,
            JobStatus::Timeout
        );
    }

    #[test]
    fn unrecognized_payloads_default_to_fail() {
        let outcome = normalize(&payload(r#"{"status":"REJECTED","errorCode":"E42"}"#));
        assert_eq!(outcome.status, JobStatus::Fail);
        assert_eq!(outcome.error_code.as_deref(), Some("E42"));
    }

    #[test]
    fn raw_text_normalizes_to_fail_with_message() {
        let outcome = normalize(&UpstreamPayload::from_frame_data("something odd"));
        assert_eq!(outcome.status, JobStatus::Fail);
        assert_eq!(outcome.message.as_deref(), Some("something odd"));
    }

    #[test]
    fn empty_result_url_does_not_mean_success() {
        let outcome = normalize(&payload(r#"{"resultUrl":""}"#));
        assert_eq!(outcome.status, JobStatus::Fail);
        assert!(outcome.result_url.is_none());
    }

    // ── skip_consume ────────────────────────────────────────────────────

    #[test]
    fn already_completed_sets_skip_consume_on_any_branch() {
        let success = normalize(&payload(r#"{"status":"PRECHECK_SUCCESS"}"#));
        assert!(success.skip_consume);
        assert_eq!(success.status, JobStatus::Success);

        let by_message = normalize(&payload(
            r#"{"status":"ERROR","message":"verification already completed earlier"}"#,
        ));
        assert!(by_message.skip_consume);
        // The message signature also flips the status to success.
        assert_eq!(by_message.status, JobStatus::Success);

        let plain = normalize(&payload(r#"{"status":"SUCCESS"}"#));
        assert!(!plain.skip_consume);
    }

    #[test]
    fn message_signature_helper_matches_both_forms() {
        assert!(message_signals_skip("Verification already completed."));
        assert!(message_signals_skip("step PRECHECK_SUCCESS reached"));
        assert!(!message_signals_skip("under review"));
    }

    // ── pending detection ───────────────────────────────────────────────

    #[test]
    fn review_pending_by_step_and_by_phrase() {
        assert!(is_review_pending(&payload(r#"{"currentStep":"REVIEW"}"#)));
        assert!(is_review_pending(&payload(r#"{"status":"queued"}"#)));
        assert!(is_review_pending(&payload(
            r#"{"message":"Document uploaded, awaiting review"}"#
        )));
        assert!(!is_review_pending(&payload(r#"{"status":"SUCCESS"}"#)));
    }

    #[test]
    fn already_completed_is_never_review_pending() {
        let p = payload(r#"{"currentStep":"COMPLETED","message":"waiting for review"}"#);
        assert!(is_already_completed(&p));
        assert!(!is_review_pending(&p));
    }

    #[test]
    fn poll_pending_excludes_review() {
        assert!(is_poll_pending(&payload(r#"{"status":"processing"}"#)));
        assert!(!is_poll_pending(&payload(r#"{"status":"review"}"#)));
        assert!(!is_poll_pending(&payload(r#"{"status":"SUCCESS"}"#)));
    }
}
