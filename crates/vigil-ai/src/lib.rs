//! # Vigil AI
//!
//! Agent behavior for Vigil.
//!
//! This crate provides:
//! - A generic finite-state machine with legal-transition tables and history
//! - Guard agents that hold a post, chase and melee the target
//! - Boss agents with health phases, staged attack patterns, retreats and stuns
//! - A perception scheduler that spreads line-of-sight checks over ticks
//! - A staged visibility probe over a collision query port
//! - A shared target tracker and an event bus
//! - Ports for navigation, collision queries, the target and presentation cues
//! - [`AiWorld`], which ticks all of the above in a fixed order

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod boss;
pub mod context;
pub mod cues;
pub mod events;
pub mod fsm;
pub mod guard;
pub mod health;
pub mod mock;
pub mod motion;
pub mod perception;
pub mod ports;
pub mod tracker;
pub mod visibility;
pub mod world;

#[cfg(test)]
mod scenarios;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::boss::*;
    pub use crate::context::*;
    pub use crate::cues::*;
    pub use crate::events::*;
    pub use crate::fsm::*;
    pub use crate::guard::*;
    pub use crate::health::*;
    pub use crate::motion::*;
    pub use crate::perception::*;
    pub use crate::ports::*;
    pub use crate::tracker::*;
    pub use crate::visibility::*;
    pub use crate::world::*;
}

pub use prelude::*;
