use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Exact,
    IsNot,
    Icontains,
    NotIcontains,
    Regex,
    NotRegex,
    Gt,
    Lt,
    Gte,
    Lte,
    IsSet,
    IsNotSet,
    IsDateAfter,
    IsDateBefore,
    // Operators this evaluator doesn't know about shouldn't fail the whole snapshot,
    // they just can't be decided locally.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    Person,
    Group,
    Cohort,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertyFilter {
    pub key: String,
    // is_set and friends don't need a value, and definitions created via the api
    // don't always carry one
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub operator: Option<OperatorType>,
    #[serde(rename = "type", default)]
    pub prop_type: PropertyType,
    #[serde(default)]
    pub negation: Option<bool>,
    #[serde(default)]
    pub group_type_index: Option<i32>,
}

impl PropertyFilter {
    pub fn is_cohort(&self) -> bool {
        self.prop_type == PropertyType::Cohort
    }

    pub fn is_negated(&self) -> bool {
        self.negation.unwrap_or(false)
    }

    /// The cohort a `cohort` filter points at. Definitions carry the id either as a
    /// number or as its string form, so both are accepted.
    pub fn get_cohort_id(&self) -> Option<String> {
        if !self.is_cohort() {
            return None;
        }
        match self.value.as_ref()? {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}
