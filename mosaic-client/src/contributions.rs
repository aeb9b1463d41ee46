//! Contribution tracking
//!
//! Ownership is derived from the contribution log, never stored on the
//! slot: a user owns the slot named by their most recent log entry,
//! keyed by email (user ids rotate across authentication sessions,
//! emails do not). Recomputed on every log change, independent of
//! slot-array changes.

use chrono::Utc;
use mosaic_common::config::SlotPolicy;
use mosaic_common::model::{Contribution, GridState, User};

/// Derives per-user ownership from the contribution log
#[derive(Debug, Clone, Copy)]
pub struct ContributionTracker {
    policy: SlotPolicy,
}

impl ContributionTracker {
    pub fn new(policy: SlotPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }

    /// Slot owned by this user: most recent log entry for their email
    pub fn owned_slot(&self, grid: &GridState, email: &str) -> Option<usize> {
        grid.contributions
            .iter()
            .rev()
            .find(|c| c.owner_email == email)
            .map(|c| c.slot)
    }

    /// Append a contribution for `user` on `slot`.
    ///
    /// Under `SingleSlot` the user's prior entries are removed first so
    /// exactly one active record exists per email; under `Permissive`
    /// prior entries are kept.
    pub fn record_contribution(&self, grid: &mut GridState, user: &User, slot: usize) {
        if self.policy == SlotPolicy::SingleSlot {
            grid.contributions.retain(|c| c.owner_email != user.email);
        }
        grid.contributions.push(Contribution {
            slot,
            owner_id: user.id,
            owner_email: user.email.clone(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
        }
    }

    #[test]
    fn test_owned_slot_empty_log() {
        let tracker = ContributionTracker::new(SlotPolicy::SingleSlot);
        let grid = GridState::new_generation();
        assert_eq!(tracker.owned_slot(&grid, "a@x"), None);
    }

    #[test]
    fn test_record_then_owned_round_trip() {
        let tracker = ContributionTracker::new(SlotPolicy::SingleSlot);
        let mut grid = GridState::new_generation();
        let alice = user("a@x");

        tracker.record_contribution(&mut grid, &alice, 1);
        assert_eq!(tracker.owned_slot(&grid, "a@x"), Some(1));
        assert_eq!(grid.contributions.len(), 1);
        assert_eq!(grid.contributions[0].slot, 1);
        assert_eq!(grid.contributions[0].owner_email, "a@x");
    }

    #[test]
    fn test_single_slot_supersedes_prior_entries() {
        let tracker = ContributionTracker::new(SlotPolicy::SingleSlot);
        let mut grid = GridState::new_generation();
        let alice = user("a@x");
        let bob = user("b@x");

        tracker.record_contribution(&mut grid, &alice, 3);
        tracker.record_contribution(&mut grid, &bob, 5);
        tracker.record_contribution(&mut grid, &alice, 8);

        // One active record per email
        assert_eq!(grid.contributions.len(), 2);
        assert_eq!(tracker.owned_slot(&grid, "a@x"), Some(8));
        assert_eq!(tracker.owned_slot(&grid, "b@x"), Some(5));
    }

    #[test]
    fn test_permissive_keeps_prior_entries() {
        let tracker = ContributionTracker::new(SlotPolicy::Permissive);
        let mut grid = GridState::new_generation();
        let alice = user("a@x");

        tracker.record_contribution(&mut grid, &alice, 3);
        tracker.record_contribution(&mut grid, &alice, 8);

        assert_eq!(grid.contributions.len(), 2);
        // Ownership still follows the most recent entry
        assert_eq!(tracker.owned_slot(&grid, "a@x"), Some(8));
    }

    #[test]
    fn test_ownership_tracks_id_rotation() {
        let tracker = ContributionTracker::new(SlotPolicy::SingleSlot);
        let mut grid = GridState::new_generation();

        // Same email, rotated user id
        tracker.record_contribution(&mut grid, &user("a@x"), 3);
        tracker.record_contribution(&mut grid, &user("a@x"), 6);

        assert_eq!(grid.contributions.len(), 1);
        assert_eq!(tracker.owned_slot(&grid, "a@x"), Some(6));
    }
}
