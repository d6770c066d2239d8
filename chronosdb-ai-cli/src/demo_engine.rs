//! A minimal in-memory stand-in for the execution engine this binary
//! exists to demonstrate driving. No SQL parser, executor, or storage
//! engine lives here — just enough catalog state for the AI layer's
//! feature extractor and auto-recovery path to have something to read.

use std::collections::HashMap;

use chronosdb_ai_core::{EngineServices, IndexInfo, RecoveryResult};
use parking_lot::Mutex;

pub struct DemoEngine {
    row_counts: Mutex<HashMap<String, u64>>,
    indexes: Mutex<HashMap<String, Vec<IndexInfo>>>,
}

impl DemoEngine {
    #[must_use]
    pub fn new(tables: &[&str]) -> Self {
        let mut row_counts = HashMap::new();
        let mut indexes = HashMap::new();
        for (i, table) in tables.iter().enumerate() {
            row_counts.insert((*table).to_string(), 1_000 * (i as u64 + 1));
            indexes.insert(
                (*table).to_string(),
                vec![IndexInfo { column: "id".to_string() }],
            );
        }
        Self {
            row_counts: Mutex::new(row_counts),
            indexes: Mutex::new(indexes),
        }
    }
}

#[async_trait::async_trait]
impl EngineServices for DemoEngine {
    async fn recover_to(&self, target_timestamp_us: u64, db_name: &str) -> RecoveryResult {
        tracing::info!(target_timestamp_us, db_name, "demo engine: simulated point-in-time recovery");
        RecoveryResult::ok(0, 1)
    }

    fn begin_checkpoint(&self) {
        tracing::info!("demo engine: simulated checkpoint");
    }

    fn get_row_count(&self, table_name: &str) -> u64 {
        self.row_counts.lock().get(table_name).copied().unwrap_or(0)
    }

    fn get_indexes(&self, table_name: &str) -> Vec<IndexInfo> {
        self.indexes.lock().get(table_name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_table_has_row_count_and_index() {
        let engine = DemoEngine::new(&["orders", "users"]);
        assert_eq!(engine.get_row_count("orders"), 1_000);
        assert_eq!(engine.get_row_count("users"), 2_000);
        assert_eq!(engine.get_indexes("orders").len(), 1);
    }

    #[test]
    fn unknown_table_has_no_catalog_state() {
        let engine = DemoEngine::new(&["orders"]);
        assert_eq!(engine.get_row_count("nonexistent"), 0);
        assert!(engine.get_indexes("nonexistent").is_empty());
    }

    #[tokio::test]
    async fn recover_to_reports_success() {
        let engine = DemoEngine::new(&["orders"]);
        let result = engine.recover_to(1_000, "main").await;
        assert!(result.success);
    }
}
