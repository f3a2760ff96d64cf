//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Operational-state alarm sink: a revert failure during a mid-commit abort
//! raises an explicit, queryable alarm here rather than being silently
//! swallowed, and the transaction is still reported failed to its caller
//! (see [`crate::Engine::commit`]).

use std::collections::VecDeque;

#[derive(Clone, Debug)]
pub struct Alarm {
    pub transaction_id: u64,
    pub plugin: &'static str,
    pub reason: String,
}

/// A bounded ring buffer of the most recent revert failures, queryable by
/// the backend's `get` path under `/transaction-alarms`. `total` keeps
/// counting past the ring's capacity so a monitoring client can tell
/// "evicted" apart from "never happened".
pub struct Alarms {
    ring: VecDeque<Alarm>,
    capacity: usize,
    total: u64,
}

impl Alarms {
    pub fn new(capacity: usize) -> Self {
        Alarms {
            ring: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn record(&mut self, alarm: Alarm) {
        tracing::error!(
            transaction_id = alarm.transaction_id,
            plugin = alarm.plugin,
            reason = %alarm.reason,
            "commit revert failed; datastore may be partially reverted"
        );
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(alarm);
        self.total += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alarm> {
        self.ring.iter()
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for Alarms {
    fn default() -> Self {
        Alarms::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_but_keeps_total() {
        let mut alarms = Alarms::new(2);
        for i in 0..3 {
            alarms.record(Alarm {
                transaction_id: i,
                plugin: "p",
                reason: "revert failed".to_owned(),
            });
        }
        assert_eq!(alarms.iter().count(), 2);
        assert_eq!(alarms.total(), 3);
        let ids: Vec<u64> = alarms.iter().map(|a| a.transaction_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
