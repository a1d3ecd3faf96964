use std::collections::HashMap;

use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::cohorts::cohort_models::CohortDefinitions;
use crate::cohorts::cohort_operations::match_filter;
use crate::flags::flag_match_reason::FeatureFlagMatchReason;
use crate::flags::flag_models::{FeatureFlag, FlagPropertyGroup, FlagValue, GroupTypeIndex};
use crate::properties::property_matching::FlagMatchingError;

const LONG_SCALE: u64 = 0xfffffffffffffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlagMatch {
    pub matches: bool,
    pub variant: Option<String>,
    pub reason: FeatureFlagMatchReason,
    pub condition_index: Option<usize>,
}

impl FeatureFlagMatch {
    fn no_match(reason: FeatureFlagMatchReason) -> Self {
        FeatureFlagMatch {
            matches: false,
            variant: None,
            reason,
            condition_index: None,
        }
    }

    pub fn get_flag_value(&self) -> FlagValue {
        match (self.matches, &self.variant) {
            (true, Some(variant)) => FlagValue::String(variant.clone()),
            (matches, _) => FlagValue::Boolean(matches),
        }
    }
}

/// Who a flag is being evaluated for.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub distinct_id: String,
    /// group name -> group key, e.g. `company -> amazon`
    pub groups: HashMap<String, String>,
    pub person_properties: HashMap<String, Value>,
    /// group name -> properties of that group
    pub group_properties: HashMap<String, HashMap<String, Value>>,
}

impl EvaluationContext {
    pub fn new(distinct_id: impl Into<String>) -> Self {
        EvaluationContext {
            distinct_id: distinct_id.into(),
            ..Default::default()
        }
    }

    pub fn with_person_properties(mut self, properties: HashMap<String, Value>) -> Self {
        self.person_properties = properties;
        self
    }

    pub fn with_group(
        mut self,
        group_name: impl Into<String>,
        group_key: impl Into<String>,
        properties: HashMap<String, Value>,
    ) -> Self {
        let group_name = group_name.into();
        self.groups.insert(group_name.clone(), group_key.into());
        self.group_properties.insert(group_name, properties);
        self
    }
}

/// Evaluates flags for one context against one definitions snapshot.
///
/// Holds only borrows, so it is cheap to build per call and never mutates the snapshot.
pub struct FeatureFlagMatcher<'a> {
    context: &'a EvaluationContext,
    group_type_mapping: &'a HashMap<GroupTypeIndex, String>,
    cohorts: &'a CohortDefinitions,
}

impl<'a> FeatureFlagMatcher<'a> {
    pub fn new(
        context: &'a EvaluationContext,
        group_type_mapping: &'a HashMap<GroupTypeIndex, String>,
        cohorts: &'a CohortDefinitions,
    ) -> Self {
        FeatureFlagMatcher {
            context,
            group_type_mapping,
            cohorts,
        }
    }

    /// Decides a flag locally.
    ///
    /// `Err` means the flag can't be decided from local data and the remote decision is
    /// needed. Conditions with a variant override are tried first, so an override always
    /// wins over a catch-all condition. An inconclusive condition doesn't stop the loop:
    /// a later condition can still match, but no condition can make the flag `false` anymore.
    pub fn get_match(&self, feature_flag: &FeatureFlag) -> Result<FeatureFlagMatch, FlagMatchingError> {
        if !feature_flag.active {
            return Ok(FeatureFlagMatch::no_match(
                FeatureFlagMatchReason::FlagDisabled,
            ));
        }

        if feature_flag.ensure_experience_continuity {
            return Err(FlagMatchingError::ExperienceContinuity(
                feature_flag.key.clone(),
            ));
        }

        let empty_properties = HashMap::new();
        let (hashed_identifier, target_properties) = match feature_flag.get_group_type_index() {
            None => (
                self.context.distinct_id.as_str(),
                &self.context.person_properties,
            ),
            Some(group_type_index) => {
                let Some(group_name) = self.group_type_mapping.get(&group_type_index) else {
                    tracing::warn!(
                        "Unknown group type index {} for feature flag {}",
                        group_type_index,
                        feature_flag.key
                    );
                    return Err(FlagMatchingError::UnknownGroupType(group_type_index));
                };

                // Group flags are never enabled when the group isn't passed in, and the
                // remote answer would be the same, so this is conclusive.
                let Some(group_key) = self.context.groups.get(group_name) else {
                    tracing::warn!(
                        "Can't compute group feature flag {} without group {}",
                        feature_flag.key,
                        group_name
                    );
                    return Ok(FeatureFlagMatch::no_match(
                        FeatureFlagMatchReason::NoGroupType,
                    ));
                };

                (
                    group_key.as_str(),
                    self.context
                        .group_properties
                        .get(group_name)
                        .unwrap_or(&empty_properties),
                )
            }
        };

        let mut inconclusive = None;
        let mut highest_reason = FeatureFlagMatchReason::NoConditionMatch;

        for (index, condition) in sorted_conditions(feature_flag) {
            match self.is_condition_match(feature_flag, condition, hashed_identifier, target_properties) {
                Ok((true, _)) => {
                    let variant = match &condition.variant {
                        Some(variant_override)
                            if feature_flag
                                .get_variants()
                                .iter()
                                .any(|v| &v.key == variant_override) =>
                        {
                            Some(variant_override.clone())
                        }
                        _ => self.get_matching_variant(feature_flag, hashed_identifier),
                    };

                    return Ok(FeatureFlagMatch {
                        matches: true,
                        variant,
                        reason: FeatureFlagMatchReason::ConditionMatch,
                        condition_index: Some(index),
                    });
                }
                Ok((false, reason)) => highest_reason = highest_reason.max(reason),
                Err(e) => {
                    tracing::debug!(
                        "Condition {} of flag {} is inconclusive: {}",
                        index,
                        feature_flag.key,
                        e
                    );
                    inconclusive.get_or_insert(e);
                }
            }
        }

        match inconclusive {
            Some(e) => Err(e),
            // We can only return false when all conditions are false
            None => Ok(FeatureFlagMatch::no_match(highest_reason)),
        }
    }

    /// All filters of a condition must match (a conclusive `false` anywhere decides the
    /// condition, even next to an inconclusive filter), then the rollout is checked.
    pub fn is_condition_match(
        &self,
        feature_flag: &FeatureFlag,
        condition: &FlagPropertyGroup,
        hashed_identifier: &str,
        target_properties: &HashMap<String, Value>,
    ) -> Result<(bool, FeatureFlagMatchReason), FlagMatchingError> {
        let mut inconclusive = None;

        for property in condition.properties.as_deref().unwrap_or_default() {
            match match_filter(property, target_properties, self.cohorts) {
                Ok(true) => {}
                Ok(false) => return Ok((false, FeatureFlagMatchReason::NoConditionMatch)),
                Err(e) => {
                    inconclusive.get_or_insert(e);
                }
            }
        }

        if let Some(e) = inconclusive {
            return Err(e);
        }

        Ok(self.check_rollout(
            feature_flag,
            condition.rollout_percentage,
            hashed_identifier,
        ))
    }

    fn check_rollout(
        &self,
        feature_flag: &FeatureFlag,
        rollout_percentage: Option<f64>,
        hashed_identifier: &str,
    ) -> (bool, FeatureFlagMatchReason) {
        let in_rollout = match rollout_percentage {
            None => true,
            Some(percentage) if percentage >= 100.0 => true,
            Some(percentage) => {
                get_hash(&feature_flag.key, hashed_identifier, "") < percentage / 100.0
            }
        };

        if in_rollout {
            (true, FeatureFlagMatchReason::ConditionMatch)
        } else {
            (false, FeatureFlagMatchReason::OutOfRolloutBound)
        }
    }

    pub fn get_matching_variant(
        &self,
        feature_flag: &FeatureFlag,
        hashed_identifier: &str,
    ) -> Option<String> {
        let hash = get_hash(&feature_flag.key, hashed_identifier, "variant");
        let mut total_percentage = 0.0;

        for variant in feature_flag.get_variants() {
            total_percentage += variant.rollout_percentage / 100.0;
            if hash < total_percentage {
                return Some(variant.key.clone());
            }
        }
        None
    }
}

/// Conditions with a variant override first, keeping list order otherwise.
fn sorted_conditions(feature_flag: &FeatureFlag) -> Vec<(usize, &FlagPropertyGroup)> {
    let mut conditions: Vec<_> = feature_flag.get_conditions().iter().enumerate().collect();
    conditions.sort_by_key(|(_, condition)| condition.variant.is_none());
    conditions
}

/// This function takes an identifier and a feature flag key and returns a float between 0 and 1.
/// Given the same identifier and key, it'll always return the same float. These floats are
/// uniformly distributed between 0 and 1, so if we want to show this feature to 20% of traffic
/// we can do _hash(key, identifier) < 0.2
pub fn get_hash(flag_key: &str, hashed_identifier: &str, salt: &str) -> f64 {
    calculate_hash(&format!("{flag_key}."), hashed_identifier, salt)
}

pub fn calculate_hash(prefix: &str, hashed_identifier: &str, salt: &str) -> f64 {
    let hash_key = format!("{prefix}{hashed_identifier}{salt}");
    let hash_value = Sha1::digest(hash_key.as_bytes());
    // The first 8 bytes shifted right by 4 bits are the first 15 hex characters of the digest
    let mut leading = [0u8; 8];
    leading.copy_from_slice(&hash_value[..8]);
    let hash_val = u64::from_be_bytes(leading) >> 4;
    hash_val as f64 / LONG_SCALE as f64
}
