//! Stock ledger collaborators: the remote ledger over HTTP and a
//! fault-injecting wrapper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use inventory::{
    Result, StockAdjustment, StockError, StockErrorBody, StockLedger, StockOperation, StockRecord,
};
use reqwest::{Client, Response};

/// Role header the inventory service requires for counter mutations.
pub const ROLES_HEADER: &str = "X-User-Roles";

/// Role sent by service-to-service calls.
pub const INTERNAL_ROLE: &str = "INTERNAL";

/// Stock ledger hosted by the inventory service.
///
/// Connection failures map to [`StockError::Unavailable`] (the request never
/// reached the ledger and may be retried). Client timeouts map to
/// [`StockError::Timeout`], since the mutation may or may not have been
/// applied. Error responses are rebuilt into the typed error from their
/// `code`.
#[derive(Debug, Clone)]
pub struct HttpStockLedger {
    client: Client,
    base_url: String,
}

impl HttpStockLedger {
    /// Creates a client for the inventory service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn adjust(
        &self,
        operation: StockOperation,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockRecord> {
        let url = format!("{}/api/inventory/{}", self.base_url, operation);
        let body = StockAdjustment {
            product_id: product_id.clone(),
            quantity,
        };

        let response = self
            .client
            .post(&url)
            .header(ROLES_HEADER, INTERNAL_ROLE)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        read_record(response, product_id, quantity).await
    }
}

fn transport_error(err: reqwest::Error) -> StockError {
    if err.is_timeout() {
        StockError::Timeout
    } else if err.is_connect() {
        StockError::Unavailable(err.to_string())
    } else {
        StockError::Rejected {
            status: err.status().map(|s| s.as_u16()).unwrap_or(502),
            message: err.to_string(),
        }
    }
}

async fn read_record(
    response: Response,
    product_id: &ProductId,
    quantity: u32,
) -> Result<StockRecord> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(transport_error);
    }

    let body = response
        .json::<StockErrorBody>()
        .await
        .unwrap_or_else(|_| StockErrorBody {
            error: format!("inventory service answered {status}"),
            ..Default::default()
        });
    Err(body.into_error(status.as_u16(), product_id, quantity))
}

#[async_trait]
impl StockLedger for HttpStockLedger {
    async fn get(&self, product_id: &ProductId) -> Result<StockRecord> {
        let url = format!("{}/api/inventory/{}", self.base_url, product_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        read_record(response, product_id, 0).await
    }

    #[tracing::instrument(skip(self), fields(%product_id))]
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.adjust(StockOperation::Reserve, product_id, quantity)
            .await
    }

    #[tracing::instrument(skip(self), fields(%product_id))]
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.adjust(StockOperation::Release, product_id, quantity)
            .await
    }

    #[tracing::instrument(skip(self), fields(%product_id))]
    async fn confirm(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.adjust(StockOperation::Confirm, product_id, quantity)
            .await
    }
}

/// A failure [`FaultyStockLedger`] injects instead of calling the inner ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockFault {
    /// Fails with `Unavailable`; the call never reaches the ledger.
    Unavailable,

    /// Never answers.
    Hang,

    /// Fails with a 500 `Rejected`.
    ServerError,
}

#[derive(Debug, Clone, Copy)]
struct FaultRule {
    fault: StockFault,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct FaultState {
    rules: HashMap<(StockOperation, ProductId), FaultRule>,
    calls: HashMap<StockOperation, usize>,
}

/// Wraps a stock ledger and injects failures per operation and product.
#[derive(Debug, Clone)]
pub struct FaultyStockLedger<L> {
    inner: L,
    state: Arc<Mutex<FaultState>>,
}

impl<L> FaultyStockLedger<L> {
    /// Wraps `inner` with no faults configured.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// Returns the wrapped ledger.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Fails every `operation` on `product_id` with `fault`.
    pub fn set_fault(
        &self,
        operation: StockOperation,
        product_id: impl Into<ProductId>,
        fault: StockFault,
    ) {
        self.insert_rule(operation, product_id.into(), fault, None);
    }

    /// Fails the next `times` calls of `operation` on `product_id`, then
    /// lets calls through.
    pub fn set_fault_times(
        &self,
        operation: StockOperation,
        product_id: impl Into<ProductId>,
        fault: StockFault,
        times: u32,
    ) {
        self.insert_rule(operation, product_id.into(), fault, Some(times));
    }

    /// Removes every configured fault.
    pub fn clear_faults(&self) {
        self.lock().rules.clear();
    }

    /// Number of `operation` calls received, injected failures included.
    pub fn call_count(&self, operation: StockOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    fn insert_rule(
        &self,
        operation: StockOperation,
        product_id: ProductId,
        fault: StockFault,
        remaining: Option<u32>,
    ) {
        self.lock()
            .rules
            .insert((operation, product_id), FaultRule { fault, remaining });
    }

    fn lock(&self) -> MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the fault to inject, if any.
    fn take_fault(&self, operation: StockOperation, product_id: &ProductId) -> Option<StockFault> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;

        let key = (operation, product_id.clone());
        let rule = state.rules.get_mut(&key)?;
        let fault = rule.fault;
        let remaining = rule.remaining;
        match remaining {
            None => {}
            Some(0) => {
                state.rules.remove(&key);
                return None;
            }
            Some(n) => rule.remaining = Some(n - 1),
        }
        Some(fault)
    }
}

impl<L: StockLedger> FaultyStockLedger<L> {
    async fn call(
        &self,
        operation: StockOperation,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockRecord> {
        match self.take_fault(operation, product_id) {
            None => self.inner.apply(operation, product_id, quantity).await,
            Some(StockFault::Unavailable) => Err(StockError::Unavailable(format!(
                "injected fault on {operation} {product_id}"
            ))),
            Some(StockFault::ServerError) => Err(StockError::Rejected {
                status: 500,
                message: format!("injected fault on {operation} {product_id}"),
            }),
            Some(StockFault::Hang) => {
                std::future::pending::<()>().await;
                Err(StockError::Timeout)
            }
        }
    }
}

#[async_trait]
impl<L: StockLedger> StockLedger for FaultyStockLedger<L> {
    async fn get(&self, product_id: &ProductId) -> Result<StockRecord> {
        self.inner.get(product_id).await
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.call(StockOperation::Reserve, product_id, quantity)
            .await
    }

    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.call(StockOperation::Release, product_id, quantity)
            .await
    }

    async fn confirm(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.call(StockOperation::Confirm, product_id, quantity)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory::InMemoryStockLedger;

    fn ledger() -> FaultyStockLedger<InMemoryStockLedger> {
        FaultyStockLedger::new(InMemoryStockLedger::with_stock([("A", 10), ("B", 10)]))
    }

    #[tokio::test]
    async fn test_passes_through_without_faults() {
        let ledger = ledger();
        let record = ledger.reserve(&ProductId::new("A"), 3).await.unwrap();
        assert_eq!(record.available_quantity, 7);
        assert_eq!(ledger.call_count(StockOperation::Reserve), 1);
    }

    #[tokio::test]
    async fn test_fault_targets_one_product_and_operation() {
        let ledger = ledger();
        ledger.set_fault(StockOperation::Reserve, "B", StockFault::ServerError);

        assert!(ledger.reserve(&ProductId::new("A"), 1).await.is_ok());
        let err = ledger.reserve(&ProductId::new("B"), 1).await.unwrap_err();
        assert!(matches!(err, StockError::Rejected { status: 500, .. }));

        // Other operations on B are unaffected.
        ledger.inner().reserve(&ProductId::new("B"), 1).await.unwrap();
        assert!(ledger.release(&ProductId::new("B"), 1).await.is_ok());

        let b = ledger.get(&ProductId::new("B")).await.unwrap();
        assert_eq!(b.available_quantity, 10);
    }

    #[tokio::test]
    async fn test_counted_fault_recovers() {
        let ledger = ledger();
        ledger.set_fault_times(StockOperation::Reserve, "A", StockFault::Unavailable, 2);

        assert!(ledger.reserve(&ProductId::new("A"), 1).await.is_err());
        assert!(ledger.reserve(&ProductId::new("A"), 1).await.is_err());
        assert!(ledger.reserve(&ProductId::new("A"), 1).await.is_ok());
        assert_eq!(ledger.call_count(StockOperation::Reserve), 3);
    }

    #[tokio::test]
    async fn test_clear_faults() {
        let ledger = ledger();
        ledger.set_fault(StockOperation::Reserve, "A", StockFault::Unavailable);
        ledger.clear_faults();
        assert!(ledger.reserve(&ProductId::new("A"), 1).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_never_answers() {
        let ledger = ledger();
        ledger.set_fault(StockOperation::Confirm, "A", StockFault::Hang);

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            ledger.confirm(&ProductId::new("A"), 1),
        )
        .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_inventory_service_is_unavailable() {
        let ledger =
            HttpStockLedger::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = ledger.reserve(&ProductId::new("A"), 1).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
    }
}
