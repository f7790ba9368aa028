// ABOUTME: Artifact (chaincode) name validation.
// ABOUTME: Names are ASCII alphanumeric runs joined by single '-' or '_' separators.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactNameError {
    #[error("artifact name cannot be empty")]
    Empty,

    #[error("artifact name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("artifact name cannot start or end with a separator")]
    DanglingSeparator,

    #[error("artifact name cannot contain consecutive separators")]
    RepeatedSeparator,

    #[error("invalid character in artifact name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn new(value: &str) -> Result<Self, ArtifactNameError> {
        if value.is_empty() {
            return Err(ArtifactNameError::Empty);
        }

        if value.len() > MAX_LEN {
            return Err(ArtifactNameError::TooLong);
        }

        let is_sep = |c: char| c == '-' || c == '_';

        if value.starts_with(is_sep) || value.ends_with(is_sep) {
            return Err(ArtifactNameError::DanglingSeparator);
        }

        let mut prev_sep = false;
        for c in value.chars() {
            if is_sep(c) {
                if prev_sep {
                    return Err(ArtifactNameError::RepeatedSeparator);
                }
                prev_sep = true;
            } else if c.is_ascii_alphanumeric() {
                prev_sep = false;
            } else {
                return Err(ArtifactNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ArtifactName {
    type Err = ArtifactNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ArtifactName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArtifactName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
