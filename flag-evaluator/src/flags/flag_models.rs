use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::properties::property_models::PropertyFilter;

pub type GroupTypeIndex = i32;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FlagPropertyGroup {
    #[serde(default)]
    pub properties: Option<Vec<PropertyFilter>>,
    #[serde(default)]
    pub rollout_percentage: Option<f64>,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MultivariateFlagVariant {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    pub rollout_percentage: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MultivariateFlagOptions {
    #[serde(default)]
    pub variants: Vec<MultivariateFlagVariant>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FlagFilters {
    #[serde(default)]
    pub groups: Option<Vec<FlagPropertyGroup>>,
    #[serde(default)]
    pub multivariate: Option<MultivariateFlagOptions>,
    #[serde(default)]
    pub aggregation_group_type_index: Option<GroupTypeIndex>,
    #[serde(default)]
    pub payloads: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureFlag {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    pub key: String,
    #[serde(default)]
    pub filters: Option<FlagFilters>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub ensure_experience_continuity: bool,
}

impl FeatureFlag {
    pub fn get_group_type_index(&self) -> Option<GroupTypeIndex> {
        self.filters
            .as_ref()
            .and_then(|filters| filters.aggregation_group_type_index)
    }

    pub fn get_conditions(&self) -> &[FlagPropertyGroup] {
        self.filters
            .as_ref()
            .and_then(|filters| filters.groups.as_deref())
            .unwrap_or_default()
    }

    pub fn get_variants(&self) -> &[MultivariateFlagVariant] {
        self.filters
            .as_ref()
            .and_then(|filters| filters.multivariate.as_ref())
            .map(|multivariate| multivariate.variants.as_slice())
            .unwrap_or_default()
    }

    /// Payloads are keyed by the lowercase text of the flag value: `true` for boolean
    /// flags, the variant key for multivariate ones.
    pub fn get_payload(&self, match_value: &FlagValue) -> Option<&Value> {
        let payloads = self.filters.as_ref()?.payloads.as_ref()?;
        payloads
            .get(&match_value.to_string().to_lowercase())
            .filter(|payload| !payload.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    Boolean(bool),
    String(String),
}

impl FlagValue {
    /// A variant always counts as enabled.
    pub fn is_enabled(&self) -> bool {
        match self {
            FlagValue::Boolean(enabled) => *enabled,
            FlagValue::String(_) => true,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Boolean(value) => write!(f, "{value}"),
            FlagValue::String(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Boolean(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::String(value.to_string())
    }
}
