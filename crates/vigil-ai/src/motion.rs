//! Destination requests with a recompute interval.

use crate::ports::NavigationPort;
use glam::Vec3;
use tracing::debug;
use vigil_common::{ticks_since, AgentId, Pose, Tick};

/// Re-issues navigation requests at most once per interval.
///
/// Failed requests are not retried early; the next attempt waits for the
/// interval like any other, so an unreachable destination only stalls the
/// agent.
#[derive(Debug, Clone)]
pub struct PathRequester {
    interval: Tick,
    last_request: Option<Tick>,
    destination: Option<Vec3>,
    failures: u32,
}

impl PathRequester {
    /// Creates a requester that repaths every `interval` ticks.
    #[must_use]
    pub fn new(interval: Tick) -> Self {
        Self {
            interval: interval.max(1),
            last_request: None,
            destination: None,
            failures: 0,
        }
    }

    /// Requests `destination` if nothing was requested yet or the interval
    /// elapsed. Returns whether a request was issued.
    pub fn request(
        &mut self,
        nav: &dyn NavigationPort,
        agent: AgentId,
        destination: Vec3,
        tick: Tick,
    ) -> bool {
        if let Some(last) = self.last_request {
            if ticks_since(last, tick) < self.interval {
                return false;
            }
        }
        self.last_request = Some(tick);
        self.destination = Some(destination);
        match nav.set_destination(agent, destination) {
            Ok(()) => {
                self.failures = 0;
            },
            Err(e) => {
                self.failures += 1;
                debug!(
                    "Navigation request for {agent} failed ({e}), retrying in {} ticks",
                    self.interval
                );
            },
        }
        true
    }

    /// Forgets the last request so the next call issues immediately.
    pub fn reset(&mut self) {
        self.last_request = None;
        self.destination = None;
    }

    /// Last requested destination.
    #[must_use]
    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    /// Consecutive failed requests.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the agent stands at `point`, either by distance or because
    /// navigation reports arrival at that exact destination.
    #[must_use]
    pub fn arrived(
        &self,
        nav: &dyn NavigationPort,
        agent: AgentId,
        pose: &Pose,
        point: Vec3,
        epsilon: f32,
    ) -> bool {
        if pose.distance_to(point) <= epsilon {
            return true;
        }
        self.destination == Some(point) && self.failures == 0 && nav.has_arrived(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNavigation;

    #[test]
    fn test_interval_gates_requests() {
        let nav = MockNavigation::new();
        let agent = AgentId::from_raw(1);
        nav.place(agent, Vec3::ZERO);
        let mut path = PathRequester::new(3);

        assert!(path.request(&nav, agent, Vec3::X, 1));
        assert!(!path.request(&nav, agent, Vec3::X, 2));
        assert!(!path.request(&nav, agent, Vec3::X, 3));
        assert!(path.request(&nav, agent, Vec3::X, 4));
        assert_eq!(nav.destination_requests(agent), 2);
    }

    #[test]
    fn test_unreachable_keeps_retrying_on_interval() {
        let nav = MockNavigation::new();
        let agent = AgentId::from_raw(1);
        nav.place(agent, Vec3::ZERO);
        nav.set_unreachable(true);
        let mut path = PathRequester::new(2);

        for tick in 0..6 {
            path.request(&nav, agent, Vec3::new(5.0, 0.0, 0.0), tick);
        }
        assert_eq!(path.failures(), 3);
        assert_eq!(nav.destination_requests(agent), 3);
        assert!(!path.arrived(&nav, agent, &Pose::default(), Vec3::new(5.0, 0.0, 0.0), 0.5));
    }

    #[test]
    fn test_reset_forces_request() {
        let nav = MockNavigation::new();
        let agent = AgentId::from_raw(1);
        nav.place(agent, Vec3::ZERO);
        let mut path = PathRequester::new(10);
        assert!(path.request(&nav, agent, Vec3::X, 0));
        path.reset();
        assert!(path.request(&nav, agent, Vec3::Z, 1));
        assert_eq!(path.destination(), Some(Vec3::Z));
    }

    #[test]
    fn test_arrival_by_distance() {
        let nav = MockNavigation::new();
        let path = PathRequester::new(1);
        let pose = Pose::at(Vec3::new(0.2, 0.0, 0.0));
        assert!(path.arrived(&nav, AgentId::from_raw(1), &pose, Vec3::ZERO, 0.5));
    }
}
