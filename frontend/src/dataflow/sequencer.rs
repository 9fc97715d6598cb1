//! Monotonic request numbering
//!
//! Every outbound request gets the next sequence number at issue time. A
//! response is applied only when its number is above the highest one accepted
//! so far, which neutralizes out-of-order completions without cancellation.

use std::cell::Cell;

#[derive(Debug, Default)]
pub struct RequestSequencer {
    issued: Cell<u64>,
    accepted: Cell<u64>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next sequence number. The first request is `1`.
    pub fn issue(&self) -> u64 {
        let seq = self.issued.get() + 1;
        self.issued.set(seq);
        seq
    }

    pub fn latest_issued(&self) -> u64 {
        self.issued.get()
    }

    pub fn highest_accepted(&self) -> u64 {
        self.accepted.get()
    }

    /// `true` while a response for `seq` may still be applied.
    pub fn is_current(&self, seq: u64) -> bool {
        seq > self.accepted.get()
    }

    /// Returns `true` when `seq` replaced the highest accepted response.
    pub fn accept(&self, seq: u64) -> bool {
        if self.is_current(seq) {
            self.accepted.set(seq);
            true
        } else {
            false
        }
    }

    /// `true` when no request was issued after `seq`.
    pub fn is_latest(&self, seq: u64) -> bool {
        seq >= self.issued.get()
    }
}
