use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{FlagEvaluationOptions, FlagsAndPayloads, FlagsClient};
use crate::flags::flag_matching::EvaluationContext;
use crate::flags::flag_models::FlagValue;

/// One line of input to the evaluation binary. Without a `flag_key`, all flags are evaluated.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FlagRequest {
    pub distinct_id: String,
    #[serde(default)]
    pub flag_key: Option<String>,
    #[serde(default)]
    pub groups: HashMap<String, String>,
    #[serde(default)]
    pub person_properties: HashMap<String, Value>,
    #[serde(default)]
    pub group_properties: HashMap<String, HashMap<String, Value>>,
}

impl FlagRequest {
    pub fn context(&self) -> EvaluationContext {
        EvaluationContext {
            distinct_id: self.distinct_id.clone(),
            groups: self.groups.clone(),
            person_properties: self.person_properties.clone(),
            group_properties: self.group_properties.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlagResponse {
    Flag {
        distinct_id: String,
        flag_key: String,
        value: Option<FlagValue>,
        payload: Option<Value>,
    },
    AllFlags {
        distinct_id: String,
        #[serde(flatten)]
        flags: FlagsAndPayloads,
    },
}

pub async fn evaluate_request(
    client: &FlagsClient,
    request: FlagRequest,
    options: &FlagEvaluationOptions,
) -> FlagResponse {
    let context = request.context();

    match request.flag_key {
        Some(flag_key) => {
            let value = client.get_feature_flag(&flag_key, &context, options).await;
            let payload = match &value {
                Some(value) => {
                    client
                        .get_feature_flag_payload(&flag_key, &context, Some(value.clone()), options)
                        .await
                }
                None => None,
            };
            FlagResponse::Flag {
                distinct_id: request.distinct_id,
                flag_key,
                value,
                payload,
            }
        }
        None => FlagResponse::AllFlags {
            flags: client.get_all_flags_and_payloads(&context, options).await,
            distinct_id: request.distinct_id,
        },
    }
}
