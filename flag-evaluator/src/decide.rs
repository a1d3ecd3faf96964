use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FlagError;
use crate::flags::flag_matching::EvaluationContext;
use crate::flags::flag_models::FlagValue;

/// What the remote decision endpoint needs to evaluate flags for one context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecideRequest {
    pub distinct_id: String,
    #[serde(default)]
    pub groups: HashMap<String, String>,
    #[serde(default)]
    pub person_properties: HashMap<String, Value>,
    #[serde(default)]
    pub group_properties: HashMap<String, HashMap<String, Value>>,
    #[serde(default)]
    pub disable_geoip: bool,
}

impl DecideRequest {
    pub fn from_context(context: &EvaluationContext, disable_geoip: bool) -> Self {
        DecideRequest {
            distinct_id: context.distinct_id.clone(),
            groups: context.groups.clone(),
            person_properties: context.person_properties.clone(),
            group_properties: context.group_properties.clone(),
            disable_geoip,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideResponse {
    #[serde(default)]
    pub feature_flags: HashMap<String, FlagValue>,
    #[serde(default)]
    pub feature_flag_payloads: HashMap<String, Value>,
}

/// The remote authority, consulted only when local evaluation can't decide.
#[async_trait]
pub trait RemoteDecider: Send + Sync {
    async fn decide(&self, request: DecideRequest) -> Result<DecideResponse, FlagError>;
}
