use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

/// An ordinal ranking of how destructive a command is judged to be, from
/// most to least permissive: safe, caution, dangerous, critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Caution,
    Dangerous,
    Critical,
}

impl RiskTier {
    /// Rank used for "highest tier wins" comparisons: critical > dangerous >
    /// caution > safe.
    fn rank(self) -> u8 {
        match self {
            Self::Safe => 0,
            Self::Caution => 1,
            Self::Dangerous => 2,
            Self::Critical => 3,
        }
    }

    /// The baseline quorum size for this tier (critical=2, dangerous=1,
    /// caution=0, safe=0), before any dynamic-quorum or config override.
    #[must_use]
    pub fn base_min_approvals(self) -> u32 {
        match self {
            Self::Critical => 2,
            Self::Dangerous => 1,
            Self::Caution | Self::Safe => 0,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Dangerous => "dangerous",
            Self::Critical => "critical",
        }
    }

    /// One notch more restrictive, saturating at critical. Used by the
    /// parse-error upgrade policy (§4.2).
    #[must_use]
    pub fn upgrade(self) -> Self {
        match self {
            Self::Safe => Self::Caution,
            Self::Caution => Self::Dangerous,
            Self::Dangerous | Self::Critical => Self::Critical,
        }
    }
}

impl PartialOrd for RiskTier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskTier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "caution" => Ok(Self::Caution),
            "dangerous" => Ok(Self::Dangerous),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk tier: {other}")),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_precedence() {
        assert!(RiskTier::Critical > RiskTier::Dangerous);
        assert!(RiskTier::Dangerous > RiskTier::Caution);
        assert!(RiskTier::Caution > RiskTier::Safe);
    }

    #[test]
    fn upgrade_saturates_at_critical() {
        assert_eq!(RiskTier::Critical.upgrade(), RiskTier::Critical);
        assert_eq!(RiskTier::Safe.upgrade(), RiskTier::Caution);
    }

    #[test]
    fn base_min_approvals() {
        assert_eq!(RiskTier::Critical.base_min_approvals(), 2);
        assert_eq!(RiskTier::Dangerous.base_min_approvals(), 1);
        assert_eq!(RiskTier::Caution.base_min_approvals(), 0);
        assert_eq!(RiskTier::Safe.base_min_approvals(), 0);
    }
}
