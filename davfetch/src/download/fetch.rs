//! Single-range fetch with local retry.
//!
//! A worker fetches its claimed range here. Retryable failures (no response,
//! 5xx, empty or wrong-length 206 bodies) are retried on the same range up to
//! the policy's budget; anything else is returned at once.

use bytes::Bytes;
use tracing::{debug, warn};

use super::context::TransferContext;
use super::range::ByteRange;
use super::retry::{sleep_in_slices, RetryPolicy, BACKOFF_SLICES};
use crate::error::{TransferError, TransferResult};
use crate::transport::{RangeResponse, RangeTransport};

/// HTTP status for a honored range request.
pub const STATUS_PARTIAL_CONTENT: u16 = 206;

/// HTTP status for a full-object response.
pub const STATUS_OK: u16 = 200;

/// A usable response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// The requested range, to be written at its start offset.
    Partial(Bytes),
    /// The whole object, to be written at offset 0.
    Full(Bytes),
}

/// Decide whether a response to a ranged GET is usable.
///
/// # Arguments
///
/// * `url` - Object URL, for error reporting
/// * `range` - Range that was requested
/// * `total` - Object length
/// * `response` - Response to classify
/// * `accept_full` - Whether a 200 carrying the whole object is acceptable
pub fn classify(
    url: &str,
    range: ByteRange,
    total: u64,
    response: RangeResponse,
    accept_full: bool,
) -> TransferResult<Accepted> {
    let body_len = response.body.len() as u64;
    match response.status {
        STATUS_PARTIAL_CONTENT => {
            if response.body.is_empty() {
                return Err(TransferError::empty_body(url, range));
            }
            if let Some(returned) = response.content_range.map(|cr| cr.range) {
                if returned != range {
                    return Err(TransferError::range_mismatch(url, range, returned));
                }
            }
            if body_len != range.len() {
                return Err(TransferError::length_mismatch(url, range, body_len));
            }
            Ok(Accepted::Partial(response.body))
        }
        STATUS_OK if accept_full && body_len == total => Ok(Accepted::Full(response.body)),
        STATUS_OK => Err(TransferError::range_ignored(url, body_len, total)),
        status => Err(TransferError::unexpected_status(url, status)),
    }
}

/// Fetch `range`, retrying retryable failures on the same range.
///
/// Cancellation is checked before every request and between backoff slices.
pub fn fetch_range(
    transport: &mut dyn RangeTransport,
    ctx: &TransferContext,
    range: ByteRange,
    policy: &RetryPolicy,
    accept_full: bool,
) -> TransferResult<Accepted> {
    let url = ctx.url();
    let mut attempt = 1;
    loop {
        if ctx.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        debug!(url, range = %range, attempt, "fetching range");
        let result = transport
            .get(url, Some(range))
            .and_then(|response| classify(url, range, ctx.total_size(), response, accept_full));

        let error = match result {
            Ok(accepted) => return Ok(accepted),
            Err(e) if e.is_range_retryable() => e,
            Err(e) => return Err(e),
        };

        let Some(delay) = policy.range_delay(attempt) else {
            warn!(url, range = %range, attempt, error = %error, "range retries exhausted");
            return Err(error);
        };

        warn!(
            url,
            range = %range,
            attempt,
            max_attempts = policy.max_attempts_per_range,
            error = %error,
            "range fetch failed, retrying"
        );
        if !sleep_in_slices(delay, BACKOFF_SLICES, || ctx.is_cancelled()) {
            return Err(TransferError::Cancelled);
        }
        attempt += 1;
    }
}

/// Check that the server honors `Range` with a one-byte request.
///
/// Only a 206 counts as support; errors and any other status do not.
pub fn probe_range_support(transport: &mut dyn RangeTransport, url: &str, total: u64) -> bool {
    match transport.get(url, Some(ByteRange::new(0, 0))) {
        Ok(response) if response.status == STATUS_PARTIAL_CONTENT => {
            if let Some(reported) = response.content_range.and_then(|cr| cr.total) {
                if reported != total {
                    warn!(url, reported, expected = total, "probe reports a different size");
                }
            }
            true
        }
        Ok(response) => {
            debug!(url, status = response.status, "range probe not honored");
            false
        }
        Err(e) => {
            debug!(url, error = %e, "range probe failed");
            false
        }
    }
}

/// Fetch the whole object with one unranged GET.
pub fn fetch_whole(transport: &mut dyn RangeTransport, url: &str) -> TransferResult<Bytes> {
    let response = transport.get(url, None)?;
    if !response.is_success() {
        return Err(TransferError::unexpected_status(url, response.status));
    }
    Ok(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::progress::ProgressHandle;
    use crate::download::range::ContentRange;
    use crate::transport::tests::{transport_error, ScriptedTransport};
    use std::time::Duration;

    const URL: &str = "http://host/file.bin";

    fn context(total: u64) -> TransferContext {
        TransferContext::new(URL, 0, total, 10, ProgressHandle::new())
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::none().with_range_attempts(attempts, Duration::from_millis(1))
    }

    fn partial(len: usize) -> TransferResult<RangeResponse> {
        Ok(RangeResponse::new(206, vec![7u8; len]))
    }

    #[test]
    fn test_classify_partial_content() {
        let range = ByteRange::new(10, 19);
        let mut response = RangeResponse::new(206, vec![1u8; 10]);
        response.content_range = ContentRange::parse("bytes 10-19/100");

        let accepted = classify(URL, range, 100, response, false).unwrap();
        assert_eq!(accepted, Accepted::Partial(Bytes::from(vec![1u8; 10])));
    }

    #[test]
    fn test_classify_rejects_wrong_content_range() {
        let mut response = RangeResponse::new(206, vec![1u8; 10]);
        response.content_range = ContentRange::parse("bytes 0-9/100");

        let err = classify(URL, ByteRange::new(10, 19), 100, response, false).unwrap_err();
        assert!(err.is_range_retryable());
    }

    #[test]
    fn test_classify_short_body_is_retryable() {
        let response = RangeResponse::new(206, vec![1u8; 4]);
        let err = classify(URL, ByteRange::new(0, 9), 100, response, false).unwrap_err();
        assert!(err.is_range_retryable());
    }

    #[test]
    fn test_classify_full_body() {
        let range = ByteRange::new(0, 9);
        let full = RangeResponse::new(200, vec![1u8; 100]);
        assert!(matches!(
            classify(URL, range, 100, full.clone(), true),
            Ok(Accepted::Full(_))
        ));

        // Pool workers never accept a full body
        let err = classify(URL, range, 100, full, false).unwrap_err();
        assert_eq!(err.status(), Some(200));
        assert!(!err.is_range_retryable());
    }

    #[test]
    fn test_classify_truncated_full_body_is_fatal() {
        let response = RangeResponse::new(200, vec![1u8; 60]);
        let err = classify(URL, ByteRange::new(0, 9), 100, response, true).unwrap_err();
        assert!(!err.is_range_retryable());
    }

    #[test]
    fn test_transient_failure_then_success() {
        let ctx = context(100);
        let mut transport = ScriptedTransport::new(vec![transport_error(), partial(10)]);

        let result = fetch_range(&mut transport, &ctx, ByteRange::new(0, 9), &fast_policy(6), false);

        assert!(matches!(result, Ok(Accepted::Partial(_))));
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn test_empty_body_and_5xx_are_retried() {
        let ctx = context(100);
        let mut transport = ScriptedTransport::new(vec![
            partial(0),
            Ok(RangeResponse::new(502, "bad gateway")),
            partial(10),
        ]);

        let result = fetch_range(&mut transport, &ctx, ByteRange::new(0, 9), &fast_policy(6), false);

        assert!(result.is_ok());
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let ctx = context(100);
        let mut transport = ScriptedTransport::new(vec![
            transport_error(),
            transport_error(),
            transport_error(),
        ]);

        let err = fetch_range(&mut transport, &ctx, ByteRange::new(0, 9), &fast_policy(3), false)
            .unwrap_err();

        assert!(matches!(err, TransferError::Transport { .. }));
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn test_client_error_not_retried() {
        let ctx = context(100);
        let mut transport = ScriptedTransport::new(vec![Ok(RangeResponse::new(404, ""))]);

        let err = fetch_range(&mut transport, &ctx, ByteRange::new(0, 9), &fast_policy(6), false)
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_cancelled_before_request() {
        let ctx = context(100);
        ctx.progress().cancel();
        let mut transport = ScriptedTransport::new(vec![]);

        let err = fetch_range(&mut transport, &ctx, ByteRange::new(0, 9), &fast_policy(6), false)
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_cancel_during_backoff() {
        let ctx = context(100);
        let policy = RetryPolicy::none().with_range_attempts(6, Duration::from_secs(30));
        let progress = ctx.progress().clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            progress.cancel();
        });
        let mut transport = ScriptedTransport::new(vec![transport_error()]);

        let started = std::time::Instant::now();
        let err = fetch_range(&mut transport, &ctx, ByteRange::new(0, 9), &policy, false)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_probe_requires_206() {
        let mut supported = ScriptedTransport::new(vec![partial(1)]);
        assert!(probe_range_support(&mut supported, URL, 100));
        assert_eq!(supported.log.lock()[0], Some(ByteRange::new(0, 0)));

        let mut ignored = ScriptedTransport::new(vec![Ok(RangeResponse::new(200, vec![0u8; 100]))]);
        assert!(!probe_range_support(&mut ignored, URL, 100));

        let mut broken = ScriptedTransport::new(vec![transport_error()]);
        assert!(!probe_range_support(&mut broken, URL, 100));
    }

    #[test]
    fn test_fetch_whole_requires_success() {
        let mut ok = ScriptedTransport::new(vec![Ok(RangeResponse::new(200, "payload"))]);
        assert_eq!(fetch_whole(&mut ok, URL).unwrap(), Bytes::from("payload"));
        assert_eq!(ok.log.lock()[0], None);

        let mut missing = ScriptedTransport::new(vec![Ok(RangeResponse::new(404, ""))]);
        assert_eq!(fetch_whole(&mut missing, URL).unwrap_err().status(), Some(404));
    }
}
