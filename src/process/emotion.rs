//! Emotion records
//!
//! Each cognitive process carries one emotion: a kind plus intensity,
//! valence, and arousal. Valence and arousal derive from the kind so the
//! `feel` syscall needs only `(kind, intensity)`.

use serde::{Deserialize, Serialize};

/// `(valence, arousal)` coordinates for the kinds the kernel knows about.
/// Unknown kinds fall back to neutral valence with intensity-driven
/// arousal.
const AFFECT_TABLE: &[(&str, f64, f64)] = &[
    ("neutral", 0.0, 0.5),
    ("joy", 0.8, 0.7),
    ("excitement", 0.7, 0.9),
    ("curiosity", 0.5, 0.6),
    ("serenity", 0.3, 0.1),
    ("sadness", -0.6, 0.3),
    ("fear", -0.7, 0.8),
    ("anger", -0.8, 0.8),
    ("frustration", -0.5, 0.7),
];

/// A process's current emotional state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    pub kind: String,
    /// Intensity in `[0, 1]`.
    pub intensity: f64,
    /// Valence in `[-1, 1]`; negative is aversive.
    pub valence: f64,
    /// Arousal in `[0, 1]`; feeds the scheduler's urgency multiplier.
    pub arousal: f64,
}

impl Default for Emotion {
    fn default() -> Self {
        Self {
            kind: "neutral".to_string(),
            intensity: 0.5,
            valence: 0.0,
            arousal: 0.5,
        }
    }
}

impl Emotion {
    /// Build an emotion from a kind and intensity, deriving valence and
    /// arousal from the affect table.
    pub fn from_kind(kind: &str, intensity: f64) -> Self {
        let intensity = intensity.clamp(0.0, 1.0);
        let entry = AFFECT_TABLE.iter().find(|(name, _, _)| *name == kind);
        let (valence, arousal) = match entry {
            Some((_, valence, arousal)) => (valence * intensity, *arousal),
            None => (0.0, intensity),
        };
        Self {
            kind: kind.to_string(),
            intensity,
            valence,
            arousal,
        }
    }

    /// One decay step, applied each cooperative cycle: intensity eases
    /// toward its floor, valence toward neutral.
    pub fn decay(&mut self) {
        if self.intensity > 0.3 {
            self.intensity *= 0.98;
        }
        if self.valence.abs() > 0.1 {
            self.valence *= 0.95;
        }
    }
}
