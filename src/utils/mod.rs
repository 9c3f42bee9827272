//! Utils Module

pub mod clock;
pub mod rng;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rng::{RandomSource, SeededRandom, ThreadRandom};
