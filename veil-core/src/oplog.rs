//! The operation log: an ordered, appendable history of mask operations
//! with a reset compaction rule.
//!
//! A `Reset` replaces the entire log (replaying anything before a reset is
//! observably equivalent to not replaying it), and a non-reset operation
//! appended onto a log that ends in `Reset` subsumes that reset. Ordinary
//! use therefore never accumulates stale prefixes.
//!
//! `epoch` is a monotonic replacement counter: it increments whenever a
//! push discards previously-held operations. Compositors use it to detect
//! collapses that length comparison alone cannot see (a reset turning a
//! length-1 log into a different length-1 log).

use serde::{Deserialize, Serialize};

use crate::ops::MaskOp;

/// Ordered history of reveal/hide/reset instructions driving the mask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpLog {
    ops: Vec<MaskOp>,
    epoch: u64,
}

impl OpLog {
    /// Create an empty log (composites to fully opaque).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one operation, applying the reset compaction rule.
    pub fn push(&mut self, op: MaskOp) {
        let collapse = op.is_reset()
            || self.ops.is_empty()
            || self.ops.last().is_some_and(MaskOp::is_reset);
        if collapse {
            if !self.ops.is_empty() {
                self.epoch += 1;
            }
            self.ops.clear();
        }
        self.ops.push(op);
    }

    /// Append a batch of operations in order.
    pub fn extend(&mut self, ops: impl IntoIterator<Item = MaskOp>) {
        for op in ops {
            self.push(op);
        }
    }

    /// Index from which a full replay must begin: the index after the most
    /// recent `Reset`, or 0 if the log contains none.
    pub fn replay_start(&self) -> usize {
        self.ops
            .iter()
            .rposition(MaskOp::is_reset)
            .map_or(0, |i| i + 1)
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replacement counter; a change means prior operations were discarded.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The operations in replay order.
    pub fn as_slice(&self) -> &[MaskOp] {
        &self.ops
    }

    /// The tail of the log that a full replay actually visits.
    pub fn replay_tail(&self) -> &[MaskOp] {
        &self.ops[self.replay_start()..]
    }
}
