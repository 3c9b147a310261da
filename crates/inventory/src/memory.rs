use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ProductId;
use tokio::sync::{Mutex, RwLock};

use crate::ledger::record_outcome;
use crate::record::{ensure_capacity, ensure_positive};
use crate::{Result, StockAdmin, StockError, StockLedger, StockOperation, StockRecord};

type RecordSlot = Arc<Mutex<StockRecord>>;

/// In-memory stock ledger.
///
/// Each record sits behind its own mutex. The map lock is held only long
/// enough to look a record up, so mutations of different products run in
/// parallel while mutations of the same product serialize.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    records: Arc<RwLock<HashMap<ProductId, RecordSlot>>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger pre-populated with `(product, available)` pairs.
    pub fn with_stock<I, P>(stock: I) -> Self
    where
        I: IntoIterator<Item = (P, u32)>,
        P: Into<ProductId>,
    {
        let records = stock
            .into_iter()
            .map(|(product_id, available)| {
                let product_id = product_id.into();
                let record = StockRecord::new(product_id.clone(), available);
                (product_id, Arc::new(Mutex::new(record)))
            })
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Returns the number of stock records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    async fn slot(&self, product_id: &ProductId) -> Result<RecordSlot> {
        self.records
            .read()
            .await
            .get(product_id)
            .cloned()
            .ok_or_else(|| StockError::NotFound(product_id.clone()))
    }

    async fn mutate<F>(
        &self,
        operation: StockOperation,
        product_id: &ProductId,
        quantity: u32,
        f: F,
    ) -> Result<StockRecord>
    where
        F: FnOnce(&mut StockRecord, u32) -> Result<()> + Send,
    {
        let result = async {
            ensure_positive(quantity)?;
            let slot = self.slot(product_id).await?;
            let mut record = slot.lock().await;
            f(&mut *record, quantity)?;
            Ok(record.clone())
        }
        .await;

        record_outcome(operation, &result);
        result
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn get(&self, product_id: &ProductId) -> Result<StockRecord> {
        let slot = self.slot(product_id).await?;
        let record = slot.lock().await;
        Ok(record.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.mutate(StockOperation::Reserve, product_id, quantity, StockRecord::reserve)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.mutate(StockOperation::Release, product_id, quantity, StockRecord::release)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn confirm(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.mutate(StockOperation::Confirm, product_id, quantity, StockRecord::confirm)
            .await
    }
}

#[async_trait]
impl StockAdmin for InMemoryStockLedger {
    async fn create(&self, product_id: ProductId, available_quantity: u32) -> Result<StockRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&product_id) {
            return Err(StockError::AlreadyExists(product_id));
        }
        ensure_capacity(&product_id, 0, available_quantity)?;
        let record = StockRecord::new(product_id.clone(), available_quantity);
        records.insert(product_id, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    async fn set_available(
        &self,
        product_id: &ProductId,
        available_quantity: u32,
    ) -> Result<StockRecord> {
        let slot = self.slot(product_id).await?;
        let mut record = slot.lock().await;
        record.set_available(available_quantity)?;
        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<StockRecord>> {
        let slots: Vec<RecordSlot> = self.records.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            records.push(slot.lock().await.clone());
        }
        records.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(records)
    }
}
