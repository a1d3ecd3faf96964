use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::properties::property_models::{OperatorType, PropertyFilter};
use crate::properties::relative_date;

/// Every variant means the same thing to callers: the filter can't be decided from the
/// data we have locally, so the decision has to be made elsewhere.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagMatchingError {
    #[error("can't match properties without a value, missing property: {0}")]
    MissingProperty(String),
    #[error("operator can't be decided locally for property: {0}")]
    InconclusiveOperatorMatch(String),
    #[error("invalid filter: {0}")]
    ValidationError(String),
    #[error("unknown operator for property: {0}")]
    UnknownOperator(String),
    #[error("cohort {0} is not in the local cohort definitions")]
    UnknownCohort(String),
    #[error("cohort {0} references itself")]
    CohortCycle(String),
    #[error("group type index {0} is not in the group type mapping")]
    UnknownGroupType(i32),
    #[error("flag {0} has experience continuity enabled")]
    ExperienceContinuity(String),
}

pub fn to_string_representation(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Matches a single (non-cohort) property filter against the given properties.
///
/// Negation is not applied here, see `cohort_operations::match_filter`.
pub fn match_property(
    property: &PropertyFilter,
    matching_property_values: &HashMap<String, Value>,
) -> Result<bool, FlagMatchingError> {
    let key = &property.key;
    // Properties passed in by the caller are a partial view of the person or group, so a
    // missing key tells us nothing, regardless of the operator.
    let Some(match_value) = matching_property_values.get(key) else {
        tracing::debug!("Missing property for matching: {}", key);
        return Err(FlagMatchingError::MissingProperty(key.clone()));
    };

    let operator = property.operator.unwrap_or(OperatorType::Exact);

    // first match operators that don't require a value
    match operator {
        OperatorType::IsSet => return Ok(true),
        OperatorType::IsNotSet => return Ok(false),
        OperatorType::Unknown => return Err(FlagMatchingError::UnknownOperator(key.clone())),
        _ => {}
    }

    let Some(value) = &property.value else {
        return Err(FlagMatchingError::ValidationError(format!(
            "filter on {key} has no value"
        )));
    };

    match operator {
        OperatorType::Exact => Ok(compute_exact_match(value, match_value)),
        OperatorType::IsNot => Ok(!compute_exact_match(value, match_value)),
        OperatorType::Icontains | OperatorType::NotIcontains => {
            let is_contained = to_string_representation(match_value)
                .to_lowercase()
                .contains(&to_string_representation(value).to_lowercase());

            if operator == OperatorType::Icontains {
                Ok(is_contained)
            } else {
                Ok(!is_contained)
            }
        }
        OperatorType::Regex | OperatorType::NotRegex => {
            // An invalid pattern never matches, in either direction
            let pattern = match Regex::new(&to_string_representation(value)) {
                Ok(pattern) => pattern,
                Err(_) => return Ok(false),
            };
            let is_match = pattern.is_match(&to_string_representation(match_value));

            if operator == OperatorType::Regex {
                Ok(is_match)
            } else {
                Ok(!is_match)
            }
        }
        OperatorType::Gt | OperatorType::Gte | OperatorType::Lt | OperatorType::Lte => {
            let ordering = compare_ordered(match_value, value).ok_or_else(|| {
                tracing::debug!(
                    "Can't order property value '{}' against filter value '{}' for key '{}'",
                    match_value,
                    value,
                    key
                );
                FlagMatchingError::InconclusiveOperatorMatch(key.clone())
            })?;

            Ok(match operator {
                OperatorType::Gt => ordering == Ordering::Greater,
                OperatorType::Gte => ordering != Ordering::Less,
                OperatorType::Lt => ordering == Ordering::Less,
                OperatorType::Lte => ordering != Ordering::Greater,
                _ => false,
            })
        }
        OperatorType::IsDateBefore | OperatorType::IsDateAfter => {
            let Some(filter_date) = value.as_str().and_then(parse_filter_date) else {
                return Err(FlagMatchingError::ValidationError(format!(
                    "the date set on the filter for {key} is not a valid format"
                )));
            };

            let Some(property_date) = match_value.as_str().and_then(parse_date_value) else {
                return Err(FlagMatchingError::InconclusiveOperatorMatch(key.clone()));
            };

            if operator == OperatorType::IsDateBefore {
                Ok(property_date < filter_date)
            } else {
                Ok(property_date > filter_date)
            }
        }
        // presence operators and unknown operators return before the value is read
        OperatorType::IsSet | OperatorType::IsNotSet | OperatorType::Unknown => {
            Err(FlagMatchingError::UnknownOperator(key.clone()))
        }
    }
}

fn compute_exact_match(value: &Value, match_value: &Value) -> bool {
    if match_value.is_null() {
        return false;
    }

    match value {
        Value::Array(values) => values.iter().any(|v| scalar_equals(v, match_value)),
        _ => scalar_equals(value, match_value),
    }
}

fn scalar_equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::String(l), Value::String(r)) => l == r,
        (l, r) => to_string_representation(l) == to_string_representation(r),
    }
}

fn compare_ordered(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => {
            match (l.trim().parse::<f64>(), r.trim().parse::<f64>()) {
                (Ok(l), Ok(r)) => l.partial_cmp(&r),
                _ => Some(l.cmp(r)),
            }
        }
        _ => None,
    }
}

fn parse_filter_date(value: &str) -> Option<DateTime<Utc>> {
    relative_date::parse_relative_date(value).or_else(|| parse_date_value(value))
}

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S %:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses an absolute date or datetime. Values without an offset are taken to be UTC.
pub fn parse_date_value(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(date) = DateTime::parse_from_str(value, format) {
            return Some(date.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(value, format) {
            return Some(date.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
    }

    // Anything more exotic goes through dateparser, still pinned to UTC
    dateparser::parse_with_timezone(value, &Utc).ok()
}
