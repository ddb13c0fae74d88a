//! Services - feed state management and the synthetic data engine
//!
//! This module contains the core business logic services:
//! - `feed_store` - Single reactive state container the application reads
//! - `alerts` - Threshold rules and TTL-bounded alert lifecycle
//! - `synthetic` - Synthetic feed generator (timer wrapper)
//! - `simulation` - Pure crowd simulation tick logic
//! - `heatmap` - Decaying occupancy grid

pub mod alerts;
pub mod feed_store;
pub mod heatmap;
pub mod simulation;
pub mod synthetic;

// Re-export commonly used types
pub use feed_store::FeedStore;
pub use simulation::{CycleRandom, RandomSource, Simulation, ThreadRandom};
pub use synthetic::SyntheticFeedGenerator;
