//! Storage channel keys
//!
//! Persisted grid data lives under three channels per generation. The
//! closed enum replaces ad hoc string keys: every persistence backend
//! derives its keys from here, so a generation's records can never
//! collide or drift apart in spelling.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of persisted state, parameterized by generation id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateChannel {
    /// Whole-grid snapshot (slot array + contribution log)
    Grid,
    /// Per-slot take sets
    Takes,
    /// Contribution log
    Contributions,
}

impl StateChannel {
    /// Storage key for this channel under one generation
    pub fn key(self, generation: Uuid) -> String {
        let kind = match self {
            StateChannel::Grid => "grid",
            StateChannel::Takes => "takes",
            StateChannel::Contributions => "contributions",
        };
        format!("{kind}:{generation}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_keys_distinct_per_kind() {
        let generation = Uuid::new_v4();
        let keys = [
            StateChannel::Grid.key(generation),
            StateChannel::Takes.key(generation),
            StateChannel::Contributions.key(generation),
        ];
        assert_eq!(keys[0], format!("grid:{generation}"));
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn test_channel_keys_distinct_per_generation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(StateChannel::Grid.key(a), StateChannel::Grid.key(b));
    }
}
