//! Index version counter
//!
//! Every mutation of the record collection bumps the revision; memoized
//! query results are only valid for the revision they were computed at.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic version of the record collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    /// Revision of an index that has never changed
    pub const ZERO: Revision = Revision(0);

    /// The following revision
    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl Default for Revision {
    fn default() -> Self {
        Revision::ZERO
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
