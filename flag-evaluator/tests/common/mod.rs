use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use flag_evaluator::client::{ClientOptions, FlagsClient};
use flag_evaluator::definitions::{DefinitionStore, FlagDefinitions};
use flag_evaluator::errors::FlagError;
use flag_evaluator::flags::flag_matching::EvaluationContext;
use flag_evaluator::test_utils::{MockDecider, RecordingSink};

pub struct TestClient {
    pub client: FlagsClient,
    pub decider: Arc<MockDecider>,
    pub sink: Arc<RecordingSink>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl TestClient {
    pub fn new(flags: Value, decider: MockDecider) -> TestClient {
        Self::with_options(json!({ "flags": flags }), decider, ClientOptions::default())
    }

    pub fn with_options(definitions: Value, decider: MockDecider, options: ClientOptions) -> TestClient {
        let definitions: FlagDefinitions =
            serde_json::from_value(definitions).expect("invalid definitions fixture");
        Self::build(
            DefinitionStore::with_definitions(definitions),
            decider,
            RecordingSink::new(),
            options,
        )
    }

    pub fn build(
        store: DefinitionStore,
        decider: MockDecider,
        sink: RecordingSink,
        options: ClientOptions,
    ) -> TestClient {
        let decider = Arc::new(decider);
        let sink = Arc::new(sink);
        let errors = Arc::new(Mutex::new(Vec::new()));

        let recorded = errors.clone();
        let client = FlagsClient::new(Arc::new(store), options)
            .with_decider(decider.clone())
            .with_capture_sink(sink.clone())
            .with_error_handler(Arc::new(move |error: &FlagError| {
                recorded.lock().unwrap().push(error.to_string());
            }));

        TestClient {
            client,
            decider,
            sink,
            errors,
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

pub fn person(distinct_id: &str, properties: Value) -> EvaluationContext {
    EvaluationContext::new(distinct_id).with_person_properties(to_properties(properties))
}

pub fn to_properties(properties: Value) -> HashMap<String, Value> {
    serde_json::from_value(properties).expect("properties must be an object")
}

pub fn empty_decider() -> MockDecider {
    MockDecider::from_json(json!({}))
}

/// One condition on `region == USA`, fully rolled out.
pub fn region_flag(key: &str) -> Value {
    json!({
        "id": 1,
        "name": "Beta Feature",
        "key": key,
        "active": true,
        "filters": {
            "groups": [{
                "properties": [{"key": "region", "operator": "exact", "value": ["USA"], "type": "person"}],
                "rollout_percentage": 100
            }]
        }
    })
}

/// Needs cohort 98, which the tests never define, so it can't be decided locally.
pub fn unknown_cohort_flag(key: &str) -> Value {
    json!({
        "id": 2,
        "name": "Beta Feature",
        "key": key,
        "active": true,
        "filters": {
            "groups": [{
                "properties": [{"key": "id", "value": 98, "operator": null, "type": "cohort"}],
                "rollout_percentage": 100
            }]
        }
    })
}
