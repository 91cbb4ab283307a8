//! Eisenhower-matrix classification of ideas.
//!
//! Impact and effort are both scored 1-5. A score of 3 or more counts as
//! "high"; the two booleans pick one of four quadrants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Threshold at or above which impact/effort counts as high.
const HIGH_THRESHOLD: u8 = 3;

/// An impact or effort score, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    /// Score given to new ideas when the caller does not pick one.
    pub const DEFAULT: Score = Score(3);

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Score(value))
        } else {
            Err(Error::validation(format!(
                "score must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_high(self) -> bool {
        self.0 >= HIGH_THRESHOLD
    }

    /// One step up, saturating at 5.
    pub fn raised(self) -> Self {
        Score((self.0 + 1).min(Self::MAX))
    }

    /// One step down, saturating at 1.
    pub fn lowered(self) -> Self {
        Score(self.0.saturating_sub(1).max(Self::MIN))
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Score {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrant {
    /// High impact, high effort.
    Q1,
    /// High impact, low effort.
    Q2,
    /// Low impact, high effort.
    Q3,
    /// Low impact, low effort.
    Q4,
}

/// Classify an idea by its impact and effort.
pub fn classify(impact: Score, effort: Score) -> Quadrant {
    match (impact.is_high(), effort.is_high()) {
        (true, true) => Quadrant::Q1,
        (true, false) => Quadrant::Q2,
        (false, true) => Quadrant::Q3,
        (false, false) => Quadrant::Q4,
    }
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::Q1, Quadrant::Q2, Quadrant::Q3, Quadrant::Q4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::Q1 => "q1",
            Quadrant::Q2 => "q2",
            Quadrant::Q3 => "q3",
            Quadrant::Q4 => "q4",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Quadrant::Q1 => "Plan",
            Quadrant::Q2 => "Do First",
            Quadrant::Q3 => "Reconsider",
            Quadrant::Q4 => "Optional",
        }
    }

    pub fn subtitle(&self) -> &'static str {
        match self {
            Quadrant::Q1 => "High Impact, High Effort",
            Quadrant::Q2 => "High Impact, Low Effort",
            Quadrant::Q3 => "Low Impact, High Effort",
            Quadrant::Q4 => "Low Impact, Low Effort",
        }
    }

    /// Impact/effort pair used when an idea is moved into this quadrant
    /// wholesale. Classifies back to `self`.
    pub fn representative_scores(&self) -> (Score, Score) {
        match self {
            Quadrant::Q1 => (Score(4), Score(4)),
            Quadrant::Q2 => (Score(4), Score(2)),
            Quadrant::Q3 => (Score(2), Score(4)),
            Quadrant::Q4 => (Score(2), Score(2)),
        }
    }
}

impl FromStr for Quadrant {
    type Err = Error;

    /// Accepts the id (`q1`) or the title (`Plan`, `do-first`), any case.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "q1" | "plan" => Ok(Quadrant::Q1),
            "q2" | "do-first" | "do first" => Ok(Quadrant::Q2),
            "q3" | "reconsider" => Ok(Quadrant::Q3),
            "q4" | "optional" => Ok(Quadrant::Q4),
            other => Err(Error::validation(format!(
                "unknown quadrant '{other}' (expected q1, q2, q3 or q4)"
            ))),
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}
