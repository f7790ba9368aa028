// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles target names and the non-empty step list.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::StepConfig;

pub fn deserialize_target<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(serde::de::Error::custom("target cannot be empty"));
    }
    Ok(trimmed.to_string())
}

pub fn deserialize_steps<'de, D>(deserializer: D) -> Result<NonEmpty<StepConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let steps: Vec<StepConfig> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(steps).ok_or_else(|| serde::de::Error::custom("at least one step is required"))
}
