use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;

use crate::capture::{CaptureEvent, CaptureSink};
use crate::decide::{DecideRequest, DecideResponse, RemoteDecider};
use crate::errors::FlagError;
use crate::flags::flag_models::{FeatureFlag, FlagFilters, FlagPropertyGroup};
use crate::properties::property_models::PropertyFilter;

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// A single-condition boolean flag.
pub fn create_test_flag(
    key: &str,
    rollout_percentage: Option<f64>,
    properties: Option<Vec<PropertyFilter>>,
) -> FeatureFlag {
    FeatureFlag {
        id: Some(rand::thread_rng().gen_range(0..10_000_000)),
        name: Some(format!("Test flag {key}")),
        key: key.to_string(),
        filters: Some(FlagFilters {
            groups: Some(vec![FlagPropertyGroup {
                properties,
                rollout_percentage,
                variant: None,
            }]),
            ..Default::default()
        }),
        active: true,
        ensure_experience_continuity: false,
    }
}

/// Builds a flag from its JSON definition, panicking on invalid fixtures.
pub fn flag_from_json(definition: Value) -> FeatureFlag {
    serde_json::from_value(definition).expect("invalid flag fixture")
}

/// A remote decider with a canned answer, remembering what it was asked.
pub struct MockDecider {
    response: Result<DecideResponse, String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<DecideRequest>>,
}

impl MockDecider {
    pub fn returning(response: DecideResponse) -> Self {
        MockDecider {
            response: Ok(response),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json(response: Value) -> Self {
        Self::returning(serde_json::from_value(response).expect("invalid decide fixture"))
    }

    pub fn failing(message: &str) -> Self {
        MockDecider {
            response: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<DecideRequest> {
        self.requests.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl RemoteDecider for MockDecider {
    async fn decide(&self, request: DecideRequest) -> Result<DecideResponse, FlagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.response
            .clone()
            .map_err(FlagError::RemoteEvaluation)
    }
}

/// Keeps every captured event in memory. Can be told to fail the first few deliveries.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CaptureEvent>>,
    failures_left: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        RecordingSink {
            events: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn events(&self) -> Vec<CaptureEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CaptureSink for RecordingSink {
    async fn capture(&self, event: CaptureEvent) -> Result<(), FlagError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(FlagError::Internal("capture sink unavailable".to_string()));
        }
        self.events
            .lock()
            .map_err(|e| FlagError::Internal(e.to_string()))?
            .push(event);
        Ok(())
    }
}
