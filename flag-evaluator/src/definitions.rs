use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer, Serialize};

use crate::cohorts::cohort_models::CohortDefinitions;
use crate::errors::FlagError;
use crate::flags::flag_models::{FeatureFlag, GroupTypeIndex};

/// One immutable snapshot of everything local evaluation needs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FlagDefinitions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub flags: Vec<FeatureFlag>,
    /// Keyed by the index as a string on the wire, e.g. `{"0": "company"}`
    #[serde(
        default,
        deserialize_with = "deserialize_group_type_mapping",
        serialize_with = "serialize_group_type_mapping"
    )]
    pub group_type_mapping: HashMap<GroupTypeIndex, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cohorts: CohortDefinitions,
}

impl FlagDefinitions {
    pub fn from_json(payload: &str) -> Result<Self, FlagError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn get_flag(&self, key: &str) -> Option<&FeatureFlag> {
        self.flags.iter().find(|flag| flag.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_group_type_mapping<'de, D>(
    deserializer: D,
) -> Result<HashMap<GroupTypeIndex, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, String>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(index, name)| {
            index
                .trim()
                .parse::<GroupTypeIndex>()
                .map(|index| (index, name))
                .map_err(|_| {
                    serde::de::Error::custom(format!("invalid group type index: {index}"))
                })
        })
        .collect()
}

fn serialize_group_type_mapping<S>(
    mapping: &HashMap<GroupTypeIndex, String>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_map(mapping.iter().map(|(index, name)| (index.to_string(), name)))
}

/// Holds the current snapshot. Readers take a cheap `Arc` clone and evaluate without holding
/// the lock, the poller swaps in whole new snapshots.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    current: RwLock<Arc<FlagDefinitions>>,
    loaded: AtomicBool,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definitions(definitions: FlagDefinitions) -> Self {
        DefinitionStore {
            current: RwLock::new(Arc::new(definitions)),
            loaded: AtomicBool::new(true),
        }
    }

    pub fn snapshot(&self) -> Arc<FlagDefinitions> {
        // A poisoned lock still holds a complete snapshot, since writers only swap the Arc
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, definitions: FlagDefinitions) {
        let definitions = Arc::new(definitions);
        match self.current.write() {
            Ok(mut guard) => *guard = definitions,
            Err(poisoned) => *poisoned.into_inner() = definitions,
        }
        self.loaded.store(true, Ordering::Release);
    }

    /// Whether a snapshot was ever loaded, as opposed to the empty default.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}
