//! User-memory profile.
//!
//! The profile is owned and persisted by the caller; the pipeline only reads
//! it as prompt context and computes an updated copy after a session.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Observations grouped by category (e.g. `tools` -> `["VSCode", "tmux"]`).
pub type CategoryMap = BTreeMap<String, Vec<String>>;

/// A category value as models write it: a list, or a lone string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Observations {
    One(String),
    Many(Vec<String>),
}

fn lenient_section<'de, D>(deserializer: D) -> Result<CategoryMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Observations>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(category, observations)| match observations {
            Observations::One(observation) => (category, vec![observation]),
            Observations::Many(list) => (category, list),
        })
        .collect())
}

/// Habits, knowledge and behavior patterns learned about a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMemory {
    #[serde(default, deserialize_with = "lenient_section")]
    pub habits: CategoryMap,
    #[serde(default, deserialize_with = "lenient_section")]
    pub knowledge: CategoryMap,
    #[serde(default, deserialize_with = "lenient_section")]
    pub behavior_patterns: CategoryMap,
}

impl UserMemory {
    /// The explicit empty profile: three empty category maps.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no section holds any observation.
    pub fn is_empty(&self) -> bool {
        self.sections().all(|section| section.values().all(Vec::is_empty))
    }

    /// Total number of observations across all sections.
    pub fn observation_count(&self) -> usize {
        self.sections()
            .flat_map(|section| section.values())
            .map(Vec::len)
            .sum()
    }

    /// Merge `other` into a copy of `self`.
    ///
    /// New categories are added, existing ones get the observations they did
    /// not already contain, in order.
    pub fn merge(&self, other: &UserMemory) -> UserMemory {
        UserMemory {
            habits: merge_section(&self.habits, &other.habits),
            knowledge: merge_section(&self.knowledge, &other.knowledge),
            behavior_patterns: merge_section(&self.behavior_patterns, &other.behavior_patterns),
        }
    }

    /// Compact JSON for prompt context; `None` when there is nothing to say.
    pub fn to_prompt_json(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        serde_json::to_string_pretty(self).ok()
    }

    fn sections(&self) -> impl Iterator<Item = &CategoryMap> {
        [&self.habits, &self.knowledge, &self.behavior_patterns].into_iter()
    }
}

fn merge_section(existing: &CategoryMap, incoming: &CategoryMap) -> CategoryMap {
    let mut merged = existing.clone();
    for (category, observations) in incoming {
        let entry = merged.entry(category.clone()).or_default();
        for observation in observations {
            let observation = observation.trim();
            if observation.is_empty() || entry.iter().any(|o| o == observation) {
                continue;
            }
            entry.push(observation.to_string());
        }
    }
    merged
}
