use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::Error;

/// Protection tier lattice: vision ⊃ architecture ⊃ quality ⊃ untiered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Vision,
    Architecture,
    Quality,
    Untiered,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Vision => "vision",
            Tier::Architecture => "architecture",
            Tier::Quality => "quality",
            Tier::Untiered => "untiered",
        };
        f.write_str(s)
    }
}

impl Tier {
    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "vision" => Some(Tier::Vision),
            "architecture" => Some(Tier::Architecture),
            "quality" => Some(Tier::Quality),
            _ => None,
        }
    }

    /// Derive the tier from an entity's observation list: the first
    /// observation matching `protection_tier: <tier>`, else untiered.
    pub fn from_observations(observations: &[String]) -> Tier {
        observations
            .iter()
            .find_map(|o| o.strip_prefix("protection_tier: ").and_then(Tier::parse))
            .unwrap_or(Tier::Untiered)
    }
}

/// The caller attempting a mutation, for tier-gated write checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    Human,
    Agent { change_approved: bool },
}

/// Outcome of a tier-gated mutation attempt. Rejections are values, not
/// exceptions — callers always get a typed outcome, never a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationResult<T> {
    Applied(T),
    Rejected { reason: String },
}

/// Pure predicate: can `caller` write to an entity at `tier`?
pub fn can_write(tier: Tier, caller: CallerRole) -> bool {
    match (tier, caller) {
        (Tier::Vision, CallerRole::Human) => true,
        (Tier::Vision, CallerRole::Agent { .. }) => false,
        (Tier::Architecture, CallerRole::Human) => true,
        (Tier::Architecture, CallerRole::Agent { change_approved }) => change_approved,
        (Tier::Quality, _) => true,
        (Tier::Untiered, _) => true,
    }
}

/// Validate a tier-gated write. On rejection, produces the crate-wide
/// `tier_violation: <tier>` error so every caller (API rejection reasons,
/// CLI output) reports the violation in the same literal form regardless of
/// which operation or caller triggered it.
pub fn validate_tier_access(tier: Tier, caller: CallerRole, operation: &str) -> Result<(), Error> {
    if can_write(tier, caller) {
        Ok(())
    } else {
        warn!(%tier, ?caller, operation, "tier write rejected");
        Err(Error::TierViolation(tier.to_string()))
    }
}
