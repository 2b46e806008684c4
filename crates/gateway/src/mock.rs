use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use booth_core::models::CheckoutHandle;
use booth_core::phone;
use rand::{distributions::Alphanumeric, Rng};
use tokio::time::{sleep, Duration};

use crate::{PaymentError, PaymentGateway, StkQueryStatus};

/// Gateway double for demos and tests. Status queries pop scripted
/// answers first, then keep answering with the fallback. Honors the same
/// input contract as the real client: invalid phone numbers and zero
/// amounts are rejected before anything else happens.
pub struct MockGateway {
    script: Mutex<VecDeque<Result<StkQueryStatus, PaymentError>>>,
    fallback: StkQueryStatus,
    initiated: Mutex<Vec<(String, u64)>>,
    simulate_latency: bool,
}

impl MockGateway {
    /// Every query reports an approved payment, the way the sandbox
    /// auto-accepts its test subscriber numbers.
    pub fn approving() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: StkQueryStatus::resolved(
                "0",
                "The service request is processed successfully.",
            ),
            initiated: Mutex::new(Vec::new()),
            simulate_latency: true,
        })
    }

    /// Scripted answers first; pending forever after they run out.
    pub fn scripted<I>(script: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<StkQueryStatus, PaymentError>>,
    {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: StkQueryStatus::pending(),
            initiated: Mutex::new(Vec::new()),
            simulate_latency: false,
        })
    }

    /// Pushes initiated so far, as (normalized phone, amount) pairs.
    pub fn initiated(&self) -> Vec<(String, u64)> {
        self.initiated.lock().expect("mock state lock").clone()
    }

    pub fn queries_remaining(&self) -> usize {
        self.script.lock().expect("mock state lock").len()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate(&self, phone: &str, amount: u64) -> Result<CheckoutHandle, PaymentError> {
        let phone = phone::normalize(phone)?;
        if amount == 0 {
            return Err(PaymentError::InvalidAmount(amount));
        }

        if self.simulate_latency {
            sleep(Duration::from_millis(200)).await;
        }

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let checkout_id = format!("ws_CO_{suffix}");

        self.initiated
            .lock()
            .expect("mock state lock")
            .push((phone, amount));

        Ok(CheckoutHandle::new(checkout_id))
    }

    async fn query(&self, _checkout_id: &str) -> Result<StkQueryStatus, PaymentError> {
        if self.simulate_latency {
            sleep(Duration::from_millis(50)).await;
        }

        let mut script = self.script.lock().expect("mock state lock");
        match script.pop_front() {
            Some(answer) => answer,
            None => Ok(self.fallback.clone()),
        }
    }
}
