use std::{collections::HashMap, sync::RwLock};

use regex::RegexSet;
use slb_common::RiskTier;
use thiserror::Error;

use crate::patterns::{self, PatternDef};

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where a pattern entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSource {
    BuiltIn,
    Custom,
}

/// One compiled pattern within a tier.
#[derive(Debug, Clone)]
pub struct PatternEntry {
    pub pattern: String,
    pub description: String,
    pub source: PatternSource,
}

struct CompiledTier {
    set: RegexSet,
    entries: Vec<PatternEntry>,
}

impl CompiledTier {
    fn compile(entries: Vec<PatternEntry>) -> Result<Self> {
        let set = RegexSet::new(entries.iter().map(|e| case_insensitive(&e.pattern)))
            .map_err(|source| Error::InvalidPattern {
                pattern: entries
                    .iter()
                    .map(|e| e.pattern.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                source,
            })?;
        Ok(Self { set, entries })
    }
}

fn case_insensitive(pattern: &str) -> String {
    if pattern.starts_with("(?i)") {
        pattern.to_string()
    } else {
        format!("(?i){pattern}")
    }
}

/// The live, mutable pattern set a [`crate::classify`] call is evaluated
/// against. Classification takes a read lock; `add`/`remove` take a write
/// lock. Classification must never mutate engine state (§5).
pub struct PatternEngine {
    tiers: RwLock<HashMap<RiskTier, CompiledTier>>,
}

impl PatternEngine {
    /// Build an engine seeded with the built-in pattern set (§4.2).
    pub fn new() -> Result<Self> {
        let mut tiers = HashMap::new();
        for tier in [
            RiskTier::Safe,
            RiskTier::Critical,
            RiskTier::Dangerous,
            RiskTier::Caution,
        ] {
            tiers.insert(tier, compile_builtin(tier)?);
        }
        Ok(Self {
            tiers: RwLock::new(tiers),
        })
    }

    /// Returns the indices of patterns in `tier` that match `segment`, in
    /// declaration order. Empty if the tier has no compiled patterns (never
    /// happens after [`PatternEngine::new`], but add/remove can clear one).
    pub(crate) fn matches(&self, tier: RiskTier, segment: &str) -> Vec<usize> {
        let guard = self.tiers.read().expect("pattern engine lock poisoned");
        match guard.get(&tier) {
            Some(compiled) => compiled.set.matches(segment).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn description_at(&self, tier: RiskTier, index: usize) -> Option<String> {
        let guard = self.tiers.read().expect("pattern engine lock poisoned");
        guard
            .get(&tier)
            .and_then(|c| c.entries.get(index))
            .map(|e| e.description.clone())
    }

    /// Add a custom pattern to `tier`. Returns an error if the regex is
    /// invalid.
    pub fn add(
        &self,
        tier: RiskTier,
        pattern: &str,
        description: &str,
        source: PatternSource,
    ) -> Result<()> {
        // Validate in isolation first so a bad pattern never corrupts the
        // existing compiled set.
        regex::Regex::new(&case_insensitive(pattern)).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut guard = self.tiers.write().expect("pattern engine lock poisoned");
        let mut entries = guard
            .get(&tier)
            .map(|c| c.entries.clone())
            .unwrap_or_default();
        entries.push(PatternEntry {
            pattern: pattern.to_string(),
            description: description.to_string(),
            source,
        });
        guard.insert(tier, CompiledTier::compile(entries)?);
        Ok(())
    }

    /// Remove every entry in `tier` whose pattern string equals `pattern`.
    pub fn remove(&self, tier: RiskTier, pattern: &str) -> Result<()> {
        let mut guard = self.tiers.write().expect("pattern engine lock poisoned");
        let entries = guard
            .get(&tier)
            .map(|c| c.entries.clone())
            .unwrap_or_default();
        let retained: Vec<_> = entries.into_iter().filter(|e| e.pattern != pattern).collect();
        guard.insert(tier, CompiledTier::compile(retained)?);
        Ok(())
    }

    /// Snapshot of the current entries for `tier`, in declaration order.
    #[must_use]
    pub fn list(&self, tier: RiskTier) -> Vec<PatternEntry> {
        let guard = self.tiers.read().expect("pattern engine lock poisoned");
        guard.get(&tier).map(|c| c.entries.clone()).unwrap_or_default()
    }

    /// Snapshot of every tier's entries.
    #[must_use]
    pub fn list_all(&self) -> HashMap<RiskTier, Vec<PatternEntry>> {
        let guard = self.tiers.read().expect("pattern engine lock poisoned");
        guard
            .iter()
            .map(|(tier, compiled)| (*tier, compiled.entries.clone()))
            .collect()
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new().expect("built-in pattern set must compile")
    }
}

fn compile_builtin(tier: RiskTier) -> Result<CompiledTier> {
    let entries: Vec<PatternEntry> = defs_to_entries(patterns::defs_for(tier));
    CompiledTier::compile(entries)
}

fn defs_to_entries(defs: &[PatternDef]) -> Vec<PatternEntry> {
    defs.iter()
        .map(|(pattern, description)| PatternEntry {
            pattern: (*pattern).to_string(),
            description: (*description).to_string(),
            source: PatternSource::BuiltIn,
        })
        .collect()
}
