//! Traffic Categories
//!
//! The closed set of traffic classes a feed can be selected by. A category is
//! fixed for the lifetime of a session and tags every line that session
//! produces, so renderers can color lines without inspecting their text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical traffic class of a feed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Denial-of-service injection traffic
    #[serde(rename = "DoS")]
    Dos,
    /// Fuzzy (random identifier) injection traffic
    Fuzzy,
    /// Spoofed engine RPM frames
    #[serde(rename = "RPM")]
    Rpm,
    /// Spoofed gear frames
    Gear,
    /// Attack-free baseline traffic
    Normal,
}

impl Category {
    /// Every category, in selector order
    pub const ALL: [Category; 5] = [
        Category::Dos,
        Category::Fuzzy,
        Category::Rpm,
        Category::Gear,
        Category::Normal,
    ];

    /// Canonical name, also the default query value sent to the source
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dos => "DoS",
            Self::Fuzzy => "Fuzzy",
            Self::Rpm => "RPM",
            Self::Gear => "Gear",
            Self::Normal => "Normal",
        }
    }

    /// Whether this category carries injected (attack) traffic
    #[must_use]
    pub fn is_attack(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unrecognised category name
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown category '{0}' (expected one of: DoS, Fuzzy, RPM, Gear, Normal)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCategory(trimmed.to_string()))
    }
}
