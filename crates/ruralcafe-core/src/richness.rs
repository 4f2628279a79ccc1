//! Richness tiers.
//!
//! Richness controls how much content the remote proxy fetches per page
//! (text only, lean, or full page with embedded objects). Values arrive as
//! strings from control requests and are parsed case-insensitively.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a richness string does not name a known tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown richness value: {0}")]
pub struct InvalidRichness(pub String);

/// How much of a page the remote proxy fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Richness {
    /// Page text only, embedded objects skipped.
    Low,

    /// Page plus lightweight embedded objects.
    #[default]
    Normal,

    /// Full page with all embedded objects.
    High,
}

impl Richness {
    /// Returns the tier as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Parses a tier name, ignoring case.
    pub fn parse(value: &str) -> Result<Self, InvalidRichness> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(InvalidRichness(value.to_string())),
        }
    }
}

impl std::str::FromStr for Richness {
    type Err = InvalidRichness;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Richness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
