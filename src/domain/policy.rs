//! Deployment-selectable survey policies.
//!
//! Each policy is a closed enum parsed from its configuration string, so an
//! unknown value is rejected at startup rather than silently changing
//! behavior.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which attendees of a meeting are asked to rate it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityMode {
    /// Only the organizer is surveyed (demo deployments).
    OrganizerOnly,
    /// Everyone except the organizer is surveyed.
    #[default]
    NonOrganizer,
}

impl EligibilityMode {
    /// Minimum surveyable attendee count used when none is configured.
    #[must_use]
    pub const fn default_min_surveyable(self) -> usize {
        match self {
            Self::OrganizerOnly => 1,
            Self::NonOrganizer => 3,
        }
    }

    /// Configuration string for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrganizerOnly => "organizer_only",
            Self::NonOrganizer => "non_organizer",
        }
    }
}

impl FromStr for EligibilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "organizer_only" | "organizer" | "demo" => Ok(Self::OrganizerOnly),
            "non_organizer" | "attendees" => Ok(Self::NonOrganizer),
            other => Err(format!("unknown eligibility mode: {other}")),
        }
    }
}

impl fmt::Display for EligibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When an event counts as having enough responses to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Report as soon as one response exists.
    #[default]
    Immediate,
    /// Report once every eligible, non-opted-out attendee has responded.
    FullQuorum,
}

impl CompletionMode {
    /// Configuration string for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::FullQuorum => "full_quorum",
        }
    }
}

impl FromStr for CompletionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "full_quorum" | "quorum" => Ok(Self::FullQuorum),
            other => Err(format!("unknown completion policy: {other}")),
        }
    }
}

impl fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a user's outstanding surveys are held and resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    /// A single slot; a new dispatch overwrites the previous event.
    #[default]
    Replace,
    /// Bounded queue resolved oldest first.
    Fifo,
    /// Bounded queue resolved newest first.
    MostRecent,
}

impl SlotPolicy {
    /// Returns `true` for the queueing policies.
    #[must_use]
    pub const fn is_queue(self) -> bool {
        matches!(self, Self::Fifo | Self::MostRecent)
    }

    /// Configuration string for this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Fifo => "fifo",
            Self::MostRecent => "most_recent",
        }
    }
}

impl FromStr for SlotPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" | "single" => Ok(Self::Replace),
            "fifo" => Ok(Self::Fifo),
            "most_recent" | "lifo" => Ok(Self::MostRecent),
            other => Err(format!("unknown slot policy: {other}")),
        }
    }
}

impl fmt::Display for SlotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
