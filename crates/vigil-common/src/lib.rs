//! # Vigil Common
//!
//! Common types shared by every Vigil subsystem.
//!
//! This crate provides:
//! - Agent identifiers and the simulation tick counter
//! - Poses (position plus facing) and distance helpers
//! - The error taxonomy (configuration, port and top-level errors)
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod pose;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::pose::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_agent_id_allocation_is_sequential() {
        let mut alloc = AgentIdAllocator::default();
        let a = alloc.next_id();
        let b = alloc.next_id();
        assert_ne!(a, b);
        assert_eq!(b.raw(), a.raw() + 1);
    }

    #[test]
    fn test_pose_distance() {
        let a = Pose::at(Vec3::ZERO);
        let b = Pose::at(Vec3::new(3.0, 0.0, 4.0));
        assert!((a.distance_to(b.position) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_config_error_wraps_into_top_level() {
        let err: VigilError = ConfigError::EmptyPhaseTable.into();
        assert!(matches!(err, VigilError::Config(_)));
    }
}
