//! Wager identifier sequence
//!
//! Starts at 0; the first identifier issued is 1, matching clients that
//! compute `counter + 1` before opening. Identifiers issued so far are
//! exactly `1..=current()`.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::FlipError;

/// Counter value before any wager is issued
pub const SEQUENCE_BASE: u64 = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    count: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { count: SEQUENCE_BASE }
    }

    /// Resume from a persisted count.
    pub fn resume(count: u64) -> Self {
        Self { count }
    }

    /// Number of wagers issued so far
    pub fn current(&self) -> u64 {
        self.count
    }

    /// The identifier `next()` would issue, without committing it.
    pub fn peek_next(&self) -> Result<u64, FlipError> {
        self.count
            .checked_add(1)
            .ok_or(FlipError::InvalidComponents("identifier overflow"))
    }

    /// Issue the next identifier.
    pub fn next(&mut self) -> Result<u64, FlipError> {
        let id = self.peek_next()?;
        self.count = id;
        Ok(id)
    }

    /// Every identifier issued so far, lazily
    pub fn issued(&self) -> RangeInclusive<u64> {
        1..=self.count
    }
}
