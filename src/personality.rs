//! Personality collaborator contract
//!
//! The kernel reads traits when scoring actions and configuring child
//! processes; it never writes them. Trait containers live outside the core
//! and are reached only through this interface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Read-only trait lookup plus derivation of child personalities.
pub trait PersonalityProvider: Send + Sync {
    /// Trait value in `[0, 1]`, if the trait exists.
    fn get(&self, name: &str) -> Option<f64>;

    /// Derive a child personality. `rate` in `[0, 1]` controls how strongly
    /// the child inherits: 1.0 copies the parent, 0.0 regresses every
    /// trait to the 0.5 baseline.
    fn inherit(&self, rate: f64) -> Box<dyn PersonalityProvider>;
}

/// Concrete trait container backed by a plain map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalityProfile {
    traits: BTreeMap<String, f64>,
}

impl PersonalityProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trait(mut self, name: impl Into<String>, value: f64) -> Self {
        self.traits.insert(name.into(), value.clamp(0.0, 1.0));
        self
    }

    /// Traits are immutable once constructed: writes are rejected with a
    /// warning and leave state unchanged.
    pub fn set(&mut self, name: &str, _value: f64) -> bool {
        warn!(trait_name = name, "personality traits are immutable; write rejected");
        false
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}

impl PersonalityProvider for PersonalityProfile {
    fn get(&self, name: &str) -> Option<f64> {
        self.traits.get(name).copied()
    }

    fn inherit(&self, rate: f64) -> Box<dyn PersonalityProvider> {
        let rate = rate.clamp(0.0, 1.0);
        let traits = self
            .traits
            .iter()
            .map(|(name, &value)| {
                let inherited = 0.5 + (value - 0.5) * rate;
                (name.clone(), inherited.clamp(0.0, 1.0))
            })
            .collect();
        Box::new(PersonalityProfile { traits })
    }
}
