use std::collections::HashMap;

use serde_json::Value;

use crate::cohorts::cohort_models::{
    CohortDefinitions, CohortId, CohortPropertyType, PropertyGroup, PropertyGroupValue,
};
use crate::properties::property_matching::{match_property, FlagMatchingError};
use crate::properties::property_models::PropertyFilter;

/// Matches any filter, person/group property or cohort reference, and applies its negation.
///
/// Negation only ever flips a conclusive answer. An inconclusive filter stays inconclusive.
pub fn match_filter(
    filter: &PropertyFilter,
    target_properties: &HashMap<String, Value>,
    cohorts: &CohortDefinitions,
) -> Result<bool, FlagMatchingError> {
    let mut path = Vec::new();
    match_filter_on_path(filter, target_properties, cohorts, &mut path)
}

fn match_filter_on_path(
    filter: &PropertyFilter,
    target_properties: &HashMap<String, Value>,
    cohorts: &CohortDefinitions,
    path: &mut Vec<CohortId>,
) -> Result<bool, FlagMatchingError> {
    let matches = if filter.is_cohort() {
        match_cohort(filter, target_properties, cohorts, path)?
    } else {
        match_property(filter, target_properties)?
    };

    Ok(matches != filter.is_negated())
}

fn match_cohort(
    filter: &PropertyFilter,
    target_properties: &HashMap<String, Value>,
    cohorts: &CohortDefinitions,
    path: &mut Vec<CohortId>,
) -> Result<bool, FlagMatchingError> {
    let cohort_id = filter.get_cohort_id().ok_or_else(|| {
        FlagMatchingError::ValidationError(format!("cohort filter {} has no cohort id", filter.key))
    })?;

    let Some(group) = cohorts.get(&cohort_id) else {
        return Err(FlagMatchingError::UnknownCohort(cohort_id));
    };

    if path.contains(&cohort_id) {
        tracing::warn!("Cohort {} is part of a reference cycle", cohort_id);
        return Err(FlagMatchingError::CohortCycle(cohort_id));
    }

    path.push(cohort_id);
    let result = group.evaluate_on_path(target_properties, cohorts, path);
    path.pop();
    result
}

impl PropertyGroup {
    /// Evaluates the group's AND/OR over its values, recursing into nested groups and cohorts.
    ///
    /// A conclusive answer wins over an inconclusive sibling: one `false` decides an AND and
    /// one `true` decides an OR. Only when nothing decides the group does an inconclusive
    /// value make the whole group inconclusive.
    pub fn evaluate(
        &self,
        target_properties: &HashMap<String, Value>,
        cohorts: &CohortDefinitions,
    ) -> Result<bool, FlagMatchingError> {
        let mut path = Vec::new();
        self.evaluate_on_path(target_properties, cohorts, &mut path)
    }

    fn evaluate_on_path(
        &self,
        target_properties: &HashMap<String, Value>,
        cohorts: &CohortDefinitions,
        path: &mut Vec<CohortId>,
    ) -> Result<bool, FlagMatchingError> {
        // empty groups are no-ops, they always match
        if self.values.is_empty() {
            return Ok(true);
        }

        let mut inconclusive = None;

        for value in &self.values {
            let result = match value {
                PropertyGroupValue::Group(group) => {
                    group.evaluate_on_path(target_properties, cohorts, path)
                }
                PropertyGroupValue::Filter(filter) => {
                    match_filter_on_path(filter, target_properties, cohorts, path)
                }
            };

            match (result, self.prop_type) {
                (Ok(false), CohortPropertyType::AND) => return Ok(false),
                (Ok(true), CohortPropertyType::OR) => return Ok(true),
                (Ok(_), _) => {}
                (Err(e), _) => {
                    tracing::debug!("Failed to compute cohort property locally: {}", e);
                    inconclusive.get_or_insert(e);
                }
            }
        }

        match inconclusive {
            Some(e) => Err(e),
            // all matched for AND, none matched for OR
            None => Ok(self.prop_type == CohortPropertyType::AND),
        }
    }
}
