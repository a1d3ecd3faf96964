use anyhow::Result;
use rstest::rstest;
use serde_json::json;

use flag_evaluator::client::{ClientOptions, FlagEvaluationOptions};
use flag_evaluator::flags::flag_matching::EvaluationContext;
use flag_evaluator::flags::flag_models::FlagValue;
use flag_evaluator::definitions::{DefinitionStore, FlagDefinitions};
use flag_evaluator::test_utils::{MockDecider, RecordingSink};

use crate::common::*;

pub mod common;

#[tokio::test]
async fn it_falls_back_to_remote_when_inconclusive() -> Result<()> {
    let test = TestClient::new(
        json!([unknown_cohort_flag("beta-feature"), region_flag("beta-feature2")]),
        MockDecider::from_json(json!({
            "featureFlags": {"beta-feature": "alakazam", "beta-feature2": "alakazam2"}
        })),
    );
    let options = FlagEvaluationOptions::default();
    let context = EvaluationContext::new("some-distinct-id");

    // cohort 98 isn't known locally
    assert_eq!(
        test.client.get_feature_flag("beta-feature", &context, &options).await,
        Some(FlagValue::from("alakazam"))
    );
    assert_eq!(test.decider.calls(), 1);

    // region wasn't passed in
    assert_eq!(
        test.client.get_feature_flag("beta-feature2", &context, &options).await,
        Some(FlagValue::from("alakazam2"))
    );
    assert_eq!(test.decider.calls(), 2);

    // with the property it's decided locally
    let context = person("some-distinct-id", json!({"region": "USA"}));
    assert_eq!(
        test.client.get_feature_flag("beta-feature2", &context, &options).await,
        Some(FlagValue::Boolean(true))
    );
    assert_eq!(test.decider.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn it_never_calls_remote_when_only_evaluating_locally() -> Result<()> {
    let test = TestClient::new(
        json!([unknown_cohort_flag("beta-feature"), region_flag("beta-feature2")]),
        MockDecider::from_json(json!({
            "featureFlags": {"beta-feature": "alakazam", "beta-feature2": "alakazam2"}
        })),
    );
    let options = FlagEvaluationOptions::local_only();
    let context = EvaluationContext::new("some-distinct-id");

    for key in ["beta-feature", "beta-feature2", "unknown-flag"] {
        assert_eq!(test.client.get_feature_flag(key, &context, &options).await, None);
        assert_eq!(test.client.feature_enabled(key, &context, &options).await, None);
    }
    assert_eq!(test.decider.calls(), 0);
    assert!(test.sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn it_treats_flags_unknown_to_remote_as_false() -> Result<()> {
    let test = TestClient::new(
        json!([{
            "id": 1,
            "key": "beta-feature",
            "active": true,
            "filters": {"groups": [{"properties": [], "rollout_percentage": 0}]}
        }]),
        empty_decider(),
    );
    let options = FlagEvaluationOptions::default();
    let context = EvaluationContext::new("some-distinct-id");

    assert_eq!(
        test.client.get_feature_flag("beta-feature", &context, &options).await,
        Some(FlagValue::Boolean(false))
    );
    assert_eq!(test.client.feature_enabled("beta-feature", &context, &options).await, Some(false));
    assert_eq!(test.decider.calls(), 0);

    assert_eq!(
        test.client.get_feature_flag("beta-feature2", &context, &options).await,
        Some(FlagValue::Boolean(false))
    );
    assert_eq!(test.decider.calls(), 1);
    assert_eq!(test.client.feature_enabled("beta-feature2", &context, &options).await, Some(false));
    assert_eq!(test.decider.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn it_returns_none_and_reports_when_remote_fails() -> Result<()> {
    let test = TestClient::new(json!([]), MockDecider::failing("Decide error"));
    let options = FlagEvaluationOptions::default();
    let context = EvaluationContext::new("some-distinct-id");

    assert_eq!(test.client.get_feature_flag("beta-feature2", &context, &options).await, None);
    assert_eq!(test.decider.calls(), 1);
    assert_eq!(test.client.feature_enabled("beta-feature2", &context, &options).await, None);
    assert_eq!(test.decider.calls(), 2);

    assert_eq!(
        test.errors(),
        vec![
            "remote flag evaluation failed: Decide error".to_string(),
            "remote flag evaluation failed: Decide error".to_string(),
        ]
    );
    assert!(test.sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn it_always_asks_remote_for_experience_continuity_flags() -> Result<()> {
    let test = TestClient::new(
        json!([{
            "id": 1,
            "key": "beta-feature",
            "active": true,
            "ensure_experience_continuity": true,
            "filters": {"groups": [{"properties": [], "rollout_percentage": 100}]}
        }]),
        MockDecider::from_json(json!({"featureFlags": {"beta-feature": "decide-fallback-value"}})),
    );

    assert_eq!(
        test.client
            .get_feature_flag(
                "beta-feature",
                &EvaluationContext::new("distinct_id"),
                &FlagEvaluationOptions::default()
            )
            .await,
        Some(FlagValue::from("decide-fallback-value"))
    );
    assert_eq!(test.decider.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn it_sends_the_full_context_to_remote() -> Result<()> {
    let test = TestClient::new(json!([]), empty_decider());
    let context = person("some-distinct-id", json!({"region": "USA"})).with_group(
        "company",
        "amazon",
        to_properties(json!({"name": "Project Name 1"})),
    );
    let options = FlagEvaluationOptions {
        disable_geoip: Some(true),
        ..Default::default()
    };

    test.client.get_feature_flag("beta-feature", &context, &options).await;

    let request = test.decider.last_request().expect("remote was called");
    assert_eq!(request.distinct_id, "some-distinct-id");
    assert_eq!(request.person_properties.get("region"), Some(&json!("USA")));
    assert_eq!(request.groups.get("company"), Some(&"amazon".to_string()));
    assert!(request.disable_geoip);
    Ok(())
}

#[rstest]
#[case::person_flag_local("person-flag", None, json!({"region": "USA"}), Some(json!(300)), 0)]
#[case::person_flag_given_value("person-flag", Some(FlagValue::Boolean(true)), json!({"region": "USA"}), Some(json!(300)), 0)]
#[case::no_local_payload_for_false("person-flag", Some(FlagValue::Boolean(false)), json!({}), Some(json!("remote")), 1)]
#[case::hashed_variant("beta-feature", None, json!({"email": "test@posthog.com"}), Some(json!({"a": "json"})), 0)]
#[case::forced_variant("beta-feature", Some(FlagValue::from("first-variant")), json!({"email": "test@posthog.com"}), Some(json!("some-payload")), 0)]
#[case::variant_without_payload("beta-feature", Some(FlagValue::from("second-variant")), json!({}), None, 1)]
#[tokio::test]
async fn it_resolves_payloads(
    #[case] key: &str,
    #[case] match_value: Option<FlagValue>,
    #[case] properties: serde_json::Value,
    #[case] expected: Option<serde_json::Value>,
    #[case] remote_calls: usize,
) -> Result<()> {
    let test = TestClient::new(
        json!([
            {
                "id": 1,
                "key": "person-flag",
                "active": true,
                "filters": {
                    "groups": [{
                        "properties": [{"key": "region", "operator": "exact", "value": ["USA"], "type": "person"}],
                        "rollout_percentage": 100
                    }],
                    "payloads": {"true": 300}
                }
            },
            {
                "id": 2,
                "key": "beta-feature",
                "active": true,
                "filters": {
                    "groups": [
                        {
                            "properties": [{"key": "email", "type": "person", "value": "test@posthog.com", "operator": "exact"}],
                            "rollout_percentage": 100,
                            "variant": "second???"
                        },
                        {"rollout_percentage": 50, "variant": "first??"}
                    ],
                    "multivariate": {
                        "variants": [
                            {"key": "first-variant", "name": "First Variant", "rollout_percentage": 50},
                            {"key": "second-variant", "name": "Second Variant", "rollout_percentage": 25},
                            {"key": "third-variant", "name": "Third Variant", "rollout_percentage": 25}
                        ]
                    },
                    "payloads": {"first-variant": "some-payload", "third-variant": {"a": "json"}}
                }
            }
        ]),
        MockDecider::from_json(json!({"featureFlagPayloads": {"person-flag": "remote"}})),
    );

    let context = person("test_id", properties);
    let payload = test
        .client
        .get_feature_flag_payload(key, &context, match_value, &FlagEvaluationOptions::default())
        .await;

    assert_eq!(payload, expected);
    assert_eq!(test.decider.calls(), remote_calls);
    // computing the match value locally never captures
    assert!(test.sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn it_asks_remote_for_payloads_without_local_definitions() -> Result<()> {
    let test = TestClient::new(
        json!([]),
        MockDecider::from_json(json!({"featureFlagPayloads": {"person-flag": 300}})),
    );
    let context = person("some-distinct-id", json!({"region": "USA"}));
    let options = FlagEvaluationOptions::default();

    assert_eq!(
        test.client.get_feature_flag_payload("person-flag", &context, None, &options).await,
        Some(json!(300))
    );
    assert_eq!(
        test.client
            .get_feature_flag_payload("person-flag", &context, Some(FlagValue::Boolean(true)), &options)
            .await,
        Some(json!(300))
    );
    assert_eq!(test.decider.calls(), 2);

    assert_eq!(
        test.client
            .get_feature_flag_payload("person-flag", &context, None, &FlagEvaluationOptions::local_only())
            .await,
        None
    );
    assert_eq!(test.decider.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn it_reports_evaluating_before_definitions_are_loaded() -> Result<()> {
    let test = TestClient::build(
        DefinitionStore::new(),
        empty_decider(),
        RecordingSink::new(),
        ClientOptions::default(),
    );
    let context = person("some-distinct-id", json!({"region": "USA"}));
    let options = FlagEvaluationOptions::local_only();

    assert_eq!(test.client.get_feature_flag("beta-feature", &context, &options).await, None);
    assert!(test.client.get_all_flags(&context, &options).await.is_empty());
    assert_eq!(
        test.errors(),
        vec![
            "flag definitions are not loaded".to_string(),
            "flag definitions are not loaded".to_string(),
        ]
    );

    let definitions: FlagDefinitions =
        serde_json::from_value(json!({"flags": [region_flag("beta-feature")]}))?;
    test.client.definitions().replace(definitions);

    assert_eq!(
        test.client.get_feature_flag("beta-feature", &context, &options).await,
        Some(FlagValue::Boolean(true))
    );
    assert_eq!(test.errors().len(), 2);
    Ok(())
}
