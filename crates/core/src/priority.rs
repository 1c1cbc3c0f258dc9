// SPDX-License-Identifier: MIT

//! Task priority.

use serde::{Deserialize, Serialize};

/// Task priority. Ordered `Critical < High < Normal < Low < Background` by
/// derived [`Ord`] (declaration order), which matches the scheduling weight:
/// smaller weight sorts first and is dispatched before larger weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl Priority {
    /// Numeric weight used for ordering: smaller weight == higher priority.
    pub fn weight(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
            Priority::Background => 4,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "background" => Ok(Priority::Background),
            other => Err(crate::error::CoreError::Invalid(format!("unknown priority '{other}'"))),
        }
    }
}

crate::simple_display! {
    Priority {
        Critical => "critical",
        High => "high",
        Normal => "normal",
        Low => "low",
        Background => "background",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_weight() {
        let mut priorities = vec![Priority::Low, Priority::Critical, Priority::Normal, Priority::High];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::Critical, Priority::High, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn from_str_roundtrips_through_display() {
        for p in [Priority::Critical, Priority::High, Priority::Normal, Priority::Low, Priority::Background] {
            let parsed: Priority = p.to_string().parse().unwrap();
            assert_eq!(parsed, p);
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn weight_is_monotonic_with_ord() {
        assert!(Priority::Critical.weight() < Priority::High.weight());
        assert!(Priority::High.weight() < Priority::Normal.weight());
        assert!(Priority::Normal.weight() < Priority::Low.weight());
        assert!(Priority::Low.weight() < Priority::Background.weight());
    }
}
