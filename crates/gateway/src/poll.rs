use std::time::Duration;

use booth_core::models::{CheckoutHandle, PaymentOutcome};
use tokio::time::{sleep, Instant};

use crate::{PaymentGateway, StkQueryStatus};

/// Result code the sandbox sends when the payer dismisses the prompt.
/// Unverified against production, so `PollConfig` lets deployments
/// override it.
pub const DEFAULT_CANCELLED_CODE: &str = "1032";

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wall-clock bound on the whole wait.
    pub timeout: Duration,
    /// Sleep between consecutive status queries.
    pub interval: Duration,
    pub cancelled_code: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            interval: Duration::from_secs(3),
            cancelled_code: DEFAULT_CANCELLED_CODE.to_string(),
        }
    }
}

/// Polls the gateway until the payment resolves or `cfg.timeout`
/// elapses. Initiation only confirms the prompt reached the handset; the
/// payer's decision arrives out-of-band and has to be discovered here.
///
/// Consumes the handle: once a terminal outcome has been returned the
/// handle cannot be polled again.
pub async fn wait_for_outcome(
    gateway: &dyn PaymentGateway,
    handle: CheckoutHandle,
    cfg: &PollConfig,
) -> PaymentOutcome {
    let deadline = Instant::now() + cfg.timeout;

    while Instant::now() < deadline {
        sleep(cfg.interval).await;

        let status = match gateway.query(&handle.checkout_id).await {
            Ok(status) => status,
            Err(err) => {
                // one bad poll does not abort the wait
                tracing::warn!(
                    checkout_id = %handle.checkout_id,
                    error = %err,
                    "status poll failed, retrying until deadline"
                );
                continue;
            }
        };

        if let Some(outcome) = classify(status, &cfg.cancelled_code) {
            return outcome;
        }
    }

    tracing::warn!(checkout_id = %handle.checkout_id, "no terminal result before deadline");
    PaymentOutcome::Timeout
}

/// `None` means the push is still pending on the handset.
fn classify(status: StkQueryStatus, cancelled_code: &str) -> Option<PaymentOutcome> {
    let StkQueryStatus {
        result_code,
        result_desc,
    } = status;

    let code = result_code.unwrap_or_default();
    if code.is_empty() {
        return None;
    }

    Some(match code.as_str() {
        "0" => PaymentOutcome::Success {
            description: result_desc,
        },
        c if c == cancelled_code => PaymentOutcome::Cancelled {
            description: result_desc,
        },
        _ => PaymentOutcome::Failed {
            description: result_desc,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGateway;
    use crate::PaymentError;

    fn fast_config() -> PollConfig {
        PollConfig {
            timeout: Duration::from_millis(500),
            interval: Duration::from_millis(10),
            cancelled_code: DEFAULT_CANCELLED_CODE.to_string(),
        }
    }

    fn handle() -> CheckoutHandle {
        CheckoutHandle::new("ws_CO_test".to_string())
    }

    #[tokio::test]
    async fn success_arrives_on_the_third_poll() {
        let gw = MockGateway::scripted([
            Ok(StkQueryStatus::pending()),
            Ok(StkQueryStatus::pending()),
            Ok(StkQueryStatus::resolved(
                "0",
                "The service request is processed successfully.",
            )),
        ]);

        let outcome = wait_for_outcome(gw.as_ref(), handle(), &fast_config()).await;
        assert!(outcome.is_success());
        assert_eq!(gw.queries_remaining(), 0);
    }

    #[tokio::test]
    async fn pending_forever_times_out() {
        let gw = MockGateway::scripted([]);
        let cfg = PollConfig {
            timeout: Duration::from_millis(60),
            interval: Duration::from_millis(10),
            cancelled_code: DEFAULT_CANCELLED_CODE.to_string(),
        };

        let outcome = wait_for_outcome(gw.as_ref(), handle(), &cfg).await;
        assert_eq!(outcome, PaymentOutcome::Timeout);
    }

    #[tokio::test]
    async fn first_non_zero_code_is_terminal_failure() {
        let gw = MockGateway::scripted([Ok(StkQueryStatus::resolved(
            "1037",
            "DS timeout user cannot be reached",
        ))]);

        let outcome = wait_for_outcome(gw.as_ref(), handle(), &fast_config()).await;
        assert_eq!(
            outcome,
            PaymentOutcome::Failed {
                description: Some("DS timeout user cannot be reached".to_string())
            }
        );
    }

    #[tokio::test]
    async fn configured_cancel_code_maps_to_cancelled() {
        let gw = MockGateway::scripted([Ok(StkQueryStatus::resolved(
            "1032",
            "Request cancelled by user",
        ))]);

        let outcome = wait_for_outcome(gw.as_ref(), handle(), &fast_config()).await;
        assert_eq!(
            outcome,
            PaymentOutcome::Cancelled {
                description: Some("Request cancelled by user".to_string())
            }
        );
    }

    #[tokio::test]
    async fn a_failed_poll_is_retried_not_fatal() {
        let gw = MockGateway::scripted([
            Err(PaymentError::MalformedResponse(
                "connection reset by peer".to_string(),
            )),
            Ok(StkQueryStatus::resolved(
                "0",
                "The service request is processed successfully.",
            )),
        ]);

        let outcome = wait_for_outcome(gw.as_ref(), handle(), &fast_config()).await;
        assert!(outcome.is_success());
    }

    #[test]
    fn empty_result_code_means_still_pending() {
        assert_eq!(classify(StkQueryStatus::pending(), "1032"), None);
    }

    #[test]
    fn zero_code_is_success_even_without_a_description() {
        let status = StkQueryStatus {
            result_code: Some("0".to_string()),
            result_desc: None,
        };
        assert_eq!(
            classify(status, "1032"),
            Some(PaymentOutcome::Success { description: None })
        );
    }
}
