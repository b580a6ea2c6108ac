//! NutriScore letter grades.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Letter grade derived from a numeric NutriScore.
///
/// Lower scores are healthier. Bucket upper bounds are exclusive:
///
/// | score        | grade |
/// |--------------|-------|
/// | `< 0`        | A+    |
/// | `0 ..< 3`    | A     |
/// | `3 ..< 7`    | B     |
/// | `7 ..< 11`   | C     |
/// | `11 ..< 15`  | D     |
/// | `>= 15`      | E     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NutriGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    E,
}

impl NutriGrade {
    /// Map a numeric score to its grade.
    ///
    /// A `NaN` score falls through every bucket and grades as `E`.
    ///
    /// ```
    /// use nutritracker_core::NutriGrade;
    ///
    /// assert_eq!(NutriGrade::from_score(-1.0), NutriGrade::APlus);
    /// assert_eq!(NutriGrade::from_score(16.0), NutriGrade::E);
    /// ```
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 0.0 {
            Self::APlus
        } else if score < 3.0 {
            Self::A
        } else if score < 7.0 {
            Self::B
        } else if score < 11.0 {
            Self::C
        } else if score < 15.0 {
            Self::D
        } else {
            Self::E
        }
    }

    /// Display label (`"A+"`, `"A"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }
}

impl fmt::Display for NutriGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
