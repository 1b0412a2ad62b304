use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Reporting frequency of financial statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Quarterly,
    Yearly,
}

impl Frequency {
    pub const ALL: [Self; 2] = [Self::Quarterly, Self::Yearly];

    /// Resolve a user-supplied alias. Unknown aliases are an error, never a default.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "q" | "quarter" | "quarterly" => Ok(Self::Quarterly),
            "y" | "year" | "yearly" | "annual" => Ok(Self::Yearly),
            _ => Err(ValidationError::UnknownFrequency {
                value: input.to_owned(),
            }),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self::Quarterly
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
