//! Probe bookkeeping: turns raw per-round observations into a snapshot.

use tracing::{info, warn};

use super::{NodeRole, NodeStatus};

/// Immutable view of the cluster published after every probe round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    /// One entry per configured node, in configuration order.
    pub nodes: Vec<NodeStatus>,
    /// Index of the confirmed primary.
    pub primary: Option<usize>,
    /// Indexes of healthy standbys.
    pub standbys: Vec<usize>,
}

impl ClusterSnapshot {
    /// Snapshot before any probe has completed: nothing is healthy.
    pub fn unprobed(addresses: &[String]) -> Self {
        Self {
            nodes: addresses
                .iter()
                .map(|address| NodeStatus {
                    address: address.clone(),
                    role: NodeRole::Unknown,
                    healthy: false,
                })
                .collect(),
            primary: None,
            standbys: Vec::new(),
        }
    }

    /// Indexes of every node that answered its last probe.
    pub fn healthy(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.healthy)
            .map(|(i, _)| i)
    }

    pub fn primary_status(&self) -> Option<&NodeStatus> {
        self.primary.map(|i| &self.nodes[i])
    }
}

/// Tracks consecutive primary observations so a node is only promoted after
/// it has reported itself primary on `confirm_probes` rounds in a row.
#[derive(Debug)]
pub struct RoleTracker {
    confirm_probes: u32,
    streaks: Vec<u32>,
    current: ClusterSnapshot,
}

impl RoleTracker {
    pub fn new(addresses: &[String], confirm_probes: u32) -> Self {
        Self {
            confirm_probes: confirm_probes.max(1),
            streaks: vec![0; addresses.len()],
            current: ClusterSnapshot::unprobed(addresses),
        }
    }

    pub fn snapshot(&self) -> &ClusterSnapshot {
        &self.current
    }

    /// Fold one probe round into the tracker. `observed[i]` is `None` when
    /// node `i` failed or timed out.
    pub fn observe(&mut self, observed: &[Option<NodeRole>]) -> ClusterSnapshot {
        debug_assert_eq!(observed.len(), self.streaks.len());

        for (streak, role) in self.streaks.iter_mut().zip(observed) {
            if *role == Some(NodeRole::Primary) {
                *streak = streak.saturating_add(1);
            } else {
                *streak = 0;
            }
        }

        let incumbent = self
            .current
            .primary
            .filter(|&i| observed[i] == Some(NodeRole::Primary));

        let primary = incumbent.or_else(|| {
            self.streaks
                .iter()
                .position(|&streak| streak >= self.confirm_probes)
        });

        let nodes: Vec<NodeStatus> = self
            .current
            .nodes
            .iter()
            .zip(observed)
            .map(|(prev, role)| NodeStatus {
                address: prev.address.clone(),
                role: role.unwrap_or(NodeRole::Unknown),
                healthy: role.is_some(),
            })
            .collect();

        let standbys = observed
            .iter()
            .enumerate()
            .filter(|(_, role)| **role == Some(NodeRole::Standby))
            .map(|(i, _)| i)
            .collect();

        let next = ClusterSnapshot {
            nodes,
            primary,
            standbys,
        };
        self.log_transitions(&next);
        self.current = next.clone();
        next
    }

    fn log_transitions(&self, next: &ClusterSnapshot) {
        for (prev, node) in self.current.nodes.iter().zip(&next.nodes) {
            if prev.healthy && !node.healthy {
                warn!(address = %node.address, "node became unreachable");
            } else if !prev.healthy && node.healthy {
                info!(address = %node.address, role = %node.role, "node became reachable");
            } else if prev.role != node.role {
                info!(address = %node.address, from = %prev.role, to = %node.role, "node role changed");
            }
        }

        match (self.current.primary_status(), next.primary_status()) {
            (None, Some(new)) => info!(address = %new.address, "primary elected"),
            (Some(old), None) => warn!(address = %old.address, "primary lost"),
            (Some(old), Some(new)) if old.address != new.address => {
                info!(from = %old.address, to = %new.address, "primary switched")
            }
            _ => {}
        }

        let claimants = next
            .nodes
            .iter()
            .filter(|n| n.role == NodeRole::Primary)
            .count();
        if claimants > 1 {
            warn!(claimants, "several nodes report primary role");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Option<NodeRole> = Some(NodeRole::Primary);
    const S: Option<NodeRole> = Some(NodeRole::Standby);
    const DOWN: Option<NodeRole> = None;

    fn tracker(n: usize, confirm: u32) -> RoleTracker {
        let addresses: Vec<String> = (0..n).map(|i| format!("db{i}")).collect();
        RoleTracker::new(&addresses, confirm)
    }

    #[test]
    fn starts_with_nothing_healthy() {
        let t = tracker(2, 2);
        assert!(t.snapshot().primary.is_none());
        assert_eq!(t.snapshot().healthy().count(), 0);
    }

    #[test]
    fn primary_needs_confirming_probe() {
        let mut t = tracker(2, 2);
        let first = t.observe(&[P, S]);
        assert_eq!(first.primary, None);
        assert_eq!(first.standbys, vec![1]);

        let second = t.observe(&[P, S]);
        assert_eq!(second.primary, Some(0));
    }

    #[test]
    fn single_confirmation_promotes_immediately() {
        let mut t = tracker(1, 1);
        assert_eq!(t.observe(&[P]).primary, Some(0));
    }

    #[test]
    fn transient_primary_signal_is_ignored() {
        let mut t = tracker(2, 2);
        t.observe(&[S, S]);
        t.observe(&[P, S]);
        let snap = t.observe(&[S, S]);
        assert_eq!(snap.primary, None);
        assert_eq!(snap.standbys, vec![0, 1]);
    }

    #[test]
    fn failed_primary_is_dropped_at_once() {
        let mut t = tracker(2, 2);
        t.observe(&[P, S]);
        t.observe(&[P, S]);
        let snap = t.observe(&[DOWN, S]);
        assert_eq!(snap.primary, None);
        assert!(!snap.nodes[0].healthy);
        assert_eq!(snap.nodes[0].role, NodeRole::Unknown);
    }

    #[test]
    fn demoted_primary_is_dropped_at_once() {
        let mut t = tracker(2, 2);
        t.observe(&[P, S]);
        t.observe(&[P, S]);
        let snap = t.observe(&[S, S]);
        assert_eq!(snap.primary, None);
        assert_eq!(snap.standbys, vec![0, 1]);
    }

    #[test]
    fn incumbent_wins_over_new_claimant() {
        let mut t = tracker(2, 1);
        t.observe(&[P, S]);
        let snap = t.observe(&[P, P]);
        assert_eq!(snap.primary, Some(0));
    }

    #[test]
    fn failover_promotes_standby_after_confirmation() {
        let mut t = tracker(2, 2);
        t.observe(&[P, S]);
        t.observe(&[P, S]);

        assert_eq!(t.observe(&[DOWN, P]).primary, None);
        assert_eq!(t.observe(&[DOWN, P]).primary, Some(1));
    }

    #[test]
    fn flapping_node_never_gets_promoted() {
        let mut t = tracker(1, 2);
        for _ in 0..5 {
            assert_eq!(t.observe(&[P]).primary, None);
            assert_eq!(t.observe(&[DOWN]).primary, None);
        }
    }

    #[test]
    fn zero_confirmations_is_treated_as_one() {
        let mut t = tracker(1, 0);
        assert_eq!(t.observe(&[P]).primary, Some(0));
    }
}
