use std::collections::HashMap;

use async_trait::async_trait;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::errors::FlagError;
use crate::flags::flag_models::FlagValue;

pub const FEATURE_FLAG_CALLED_EVENT: &str = "$feature_flag_called";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureEvent {
    pub distinct_id: String,
    pub event: String,
    pub properties: Map<String, Value>,
    pub groups: HashMap<String, String>,
    pub disable_geoip: bool,
}

impl CaptureEvent {
    pub fn feature_flag_called(
        distinct_id: &str,
        flag_key: &str,
        response: &FlagValue,
        locally_evaluated: bool,
        groups: &HashMap<String, String>,
        disable_geoip: bool,
    ) -> Self {
        let mut properties = Map::new();
        properties.insert("$feature_flag".to_string(), json!(flag_key));
        properties.insert("$feature_flag_response".to_string(), json!(response));
        properties.insert("locally_evaluated".to_string(), json!(locally_evaluated));
        properties.insert(format!("$feature/{flag_key}"), json!(response));
        if !groups.is_empty() {
            properties.insert("$groups".to_string(), json!(groups));
        }

        CaptureEvent {
            distinct_id: distinct_id.to_string(),
            event: FEATURE_FLAG_CALLED_EVENT.to_string(),
            properties,
            groups: groups.clone(),
            disable_geoip,
        }
    }
}

/// Where `$feature_flag_called` events go. Delivery (batching, retries) is the sink's concern.
#[async_trait]
pub trait CaptureSink: Send + Sync {
    async fn capture(&self, event: CaptureEvent) -> Result<(), FlagError>;
}

/// Remembers which (distinct_id, flag_key) pairs were already reported.
///
/// Bounded, least recently used pairs are evicted first, after which they can be reported again.
#[derive(Clone)]
pub struct ReportedFlags {
    cache: Cache<(String, String), ()>,
}

impl ReportedFlags {
    pub fn new(max_capacity: u64) -> Self {
        // LRU admits every new pair, TinyLFU could drop one right after its first report
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache }
    }

    /// Marks the pair as reported and returns whether this call was the first to do so.
    pub fn first_report(&self, distinct_id: &str, flag_key: &str) -> bool {
        self.cache
            .entry((distinct_id.to_string(), flag_key.to_string()))
            .or_insert(())
            .is_fresh()
    }

    /// Drops the pair so it gets reported again, e.g. after its event failed to go out.
    pub fn forget(&self, distinct_id: &str, flag_key: &str) {
        self.cache
            .invalidate(&(distinct_id.to_string(), flag_key.to_string()));
    }

    pub fn contains(&self, distinct_id: &str, flag_key: &str) -> bool {
        self.cache
            .contains_key(&(distinct_id.to_string(), flag_key.to_string()))
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}
