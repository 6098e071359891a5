//! Freshness state of a cache slot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Disposition of a cached element.
///
/// | From    | Event                        | To              |
/// |---------|------------------------------|-----------------|
/// | any     | value collected              | `Fresh`         |
/// | `Fresh` | start of a collection cycle  | `Stale`         |
/// | any     | node absent at reconcile     | `Nin`           |
/// | `Nin`   | node present at reconcile    | `Unknown`       |
/// | any     | node cannot answer           | `Unretrievable` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Disposition {
    #[default]
    Unknown,
    Fresh,
    Stale,
    /// Node not in network.
    Nin,
    Unretrievable,
}

impl Disposition {
    /// Whether a slot in this state may legally hold no value.
    pub fn allows_empty(self) -> bool {
        matches!(self, Disposition::Unknown | Disposition::Nin | Disposition::Unretrievable)
    }

    pub fn label(self) -> &'static str {
        match self {
            Disposition::Unknown => "unknown",
            Disposition::Fresh => "fresh",
            Disposition::Stale => "stale",
            Disposition::Nin => "nin",
            Disposition::Unretrievable => "unretrievable",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
