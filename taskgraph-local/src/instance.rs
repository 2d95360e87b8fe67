//! Per-class one-shot instance construction (§4.3.1, §9 redesign note).
//!
//! Modeled as a map of `OnceCell` per class name: concurrent first callers
//! for the same class serialize on that class's single construction;
//! callers for different classes never block each other, and subsequent
//! callers for an already-built class hit the cell lock-free.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use taskgraph_core::TaskError;
use tokio::sync::{OnceCell, RwLock};

/// Builds the singleton instance of a method-function's owning class.
pub trait ClassConstructor: Send + Sync {
    /// Construct the instance. Called at most once per class per runner.
    fn construct(&self) -> Result<Arc<dyn Any + Send + Sync>, TaskError>;
}

/// One `OnceCell` per class name.
#[derive(Default)]
pub struct InstanceCache {
    cells: RwLock<HashMap<String, Arc<OnceCell<Arc<dyn Any + Send + Sync>>>>>,
}

impl InstanceCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or construct the instance for `class_name`. Construction failure
    /// is not cached: a later call will retry `constructor`.
    pub async fn get_or_construct(
        &self,
        class_name: &str,
        constructor: &dyn ClassConstructor,
    ) -> Result<Arc<dyn Any + Send + Sync>, TaskError> {
        let cell = {
            let mut cells = self.cells.write().await;
            cells
                .entry(class_name.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        cell.get_or_try_init(|| async { constructor.construct() })
            .await
            .cloned()
    }
}
