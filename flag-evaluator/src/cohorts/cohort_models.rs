use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::properties::property_models::PropertyFilter;

/// Cohort ids are the string keys of the `cohorts` map in the definitions payload.
pub type CohortId = String;

pub type CohortDefinitions = HashMap<CohortId, PropertyGroup>;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CohortPropertyType {
    AND,
    OR,
}

/// A cohort definition, e.g.
/// ```json
/// {
///   "type": "OR",
///   "values": [
///     {"key": "id", "value": 1, "type": "cohort"},
///     {"type": "AND", "values": [{"key": "nation", "value": ["UK"], "type": "person"}]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertyGroup {
    #[serde(rename = "type")]
    pub prop_type: CohortPropertyType,
    #[serde(default)]
    pub values: Vec<PropertyGroupValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PropertyGroupValue {
    Group(PropertyGroup),
    Filter(PropertyFilter),
}
