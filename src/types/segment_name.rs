// ABOUTME: Ledger segment (channel) name validation.
// ABOUTME: Segment names are lowercase, start with a letter, and allow '.' and '-'.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Longest segment name the ledger accepts.
const MAX_LEN: usize = 249;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentNameError {
    #[error("segment name cannot be empty")]
    Empty,

    #[error("segment name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("segment name must start with a lowercase letter")]
    InvalidStart,

    #[error("invalid character in segment name: '{0}'")]
    InvalidChar(char),
}

/// Name of the ledger partition an artifact is deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentName(String);

impl SegmentName {
    pub fn new(value: &str) -> Result<Self, SegmentNameError> {
        let first = value.chars().next().ok_or(SegmentNameError::Empty)?;

        if value.len() > MAX_LEN {
            return Err(SegmentNameError::TooLong);
        }

        if !first.is_ascii_lowercase() {
            return Err(SegmentNameError::InvalidStart);
        }

        for c in value.chars() {
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '.' && c != '-' {
                return Err(SegmentNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SegmentName {
    type Err = SegmentNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for SegmentName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SegmentName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
