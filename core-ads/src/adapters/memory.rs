//! In-process performance store, used when no database is configured and in
//! tests.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{PerformanceRecord, PerformanceStore};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryPerformanceStore {
    records: RwLock<HashMap<String, PerformanceRecord>>,
}

impl MemoryPerformanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records, ordered by configuration id.
    pub fn records(&self) -> Vec<PerformanceRecord> {
        let mut records: Vec<PerformanceRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.config_id.cmp(&b.config_id));
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl PerformanceStore for MemoryPerformanceStore {
    async fn get_performance(&self, config_id: &str) -> Result<Option<PerformanceRecord>> {
        Ok(self.records.read().get(config_id).cloned())
    }

    async fn update_performance(&self, record: PerformanceRecord) -> Result<()> {
        self.records
            .write()
            .insert(record.config_id.clone(), record);
        Ok(())
    }
}
