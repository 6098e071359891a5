//! # Parameter Descriptor Table
//!
//! Every attribute the cache can hold is described once, statically:
//! identity, cardinality, value type, the collection phase that fetches
//! it, and the flags used to build selection presets.
//!
//! ```text
//! Param (dense ordinal) ──describe()──▶ Descriptor
//!                                        ├─ cardinality   Network | Node | Link
//!                                        ├─ value_type    UInt32 | Int32 | CentiDecibel | MacAddr | Profile | Password
//!                                        ├─ source        which fill phase collects it
//!                                        └─ flags         admission_constant, link_up_timing
//! ```
//!
//! The table is `const` data. `ParamTable::new` verifies that each entry's
//! stored identity matches its position, so a reordered or truncated
//! table is caught when the `Context` is built, never at lookup time.

mod table;

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::{ValueType, MAX_NODES};
use crate::{Error, Result};

pub use table::DESCRIPTORS;

// ============================================================================
// Identity
// ============================================================================

/// Parameter identity. The discriminant is the dense table ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Param {
    // Network
    NcNode,
    BackupNcNode,
    NetworkState,
    BeaconChannel,
    NetworkMocaVersion,
    SelfNode,
    LinkUpEvents,
    LinkDownEvents,
    AdmissionFailures,
    LinkUpSeconds,
    Password,
    TabooStartChannel,
    TabooChannelMask,
    LineOfSight,
    AdvancedLinkCounter,
    LinkStatus,
    // Node
    NodeMacAddr,
    NodeMocaVersion,
    NodePreferredNc,
    NodeProtocolCaps,
    NodeAdmittedSeconds,
    NodeFirmwareVersion,
    NodeTxPower,
    NodeUptime,
    NodeRxPackets,
    NodeTemperature,
    NodeRxErrors,
    NodeBroadcastProfile,
    NodeMapProfile,
    // Link
    LinkTxPhyRate,
    LinkTxNbas,
    LinkRxPower,
    LinkSnr,
    LinkTxPackets,
    LinkRxPackets,
    LinkRxErrors,
    LinkTxBackoff,
    LinkRxUnicastProfile,
    LinkTxUnicastProfile,
}

impl Param {
    pub const COUNT: usize = 39;

    /// Every parameter in ordinal order.
    pub const ALL: [Param; Param::COUNT] = [
        Param::NcNode,
        Param::BackupNcNode,
        Param::NetworkState,
        Param::BeaconChannel,
        Param::NetworkMocaVersion,
        Param::SelfNode,
        Param::LinkUpEvents,
        Param::LinkDownEvents,
        Param::AdmissionFailures,
        Param::LinkUpSeconds,
        Param::Password,
        Param::TabooStartChannel,
        Param::TabooChannelMask,
        Param::LineOfSight,
        Param::AdvancedLinkCounter,
        Param::LinkStatus,
        Param::NodeMacAddr,
        Param::NodeMocaVersion,
        Param::NodePreferredNc,
        Param::NodeProtocolCaps,
        Param::NodeAdmittedSeconds,
        Param::NodeFirmwareVersion,
        Param::NodeTxPower,
        Param::NodeUptime,
        Param::NodeRxPackets,
        Param::NodeTemperature,
        Param::NodeRxErrors,
        Param::NodeBroadcastProfile,
        Param::NodeMapProfile,
        Param::LinkTxPhyRate,
        Param::LinkTxNbas,
        Param::LinkRxPower,
        Param::LinkSnr,
        Param::LinkTxPackets,
        Param::LinkRxPackets,
        Param::LinkRxErrors,
        Param::LinkTxBackoff,
        Param::LinkRxUnicastProfile,
        Param::LinkTxUnicastProfile,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Param> {
        Param::ALL.get(index).copied()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(DESCRIPTORS.get(self.index()).map_or("?", |d| d.name))
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// How many values a parameter has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// One value for the whole network.
    Network,
    /// One value per node.
    Node,
    /// One value per ordered (queried, remote) node pair.
    Link,
}

impl Cardinality {
    /// Cache slots reserved for one parameter.
    pub fn slots(self) -> usize {
        match self {
            Cardinality::Network => 1,
            Cardinality::Node => MAX_NODES,
            Cardinality::Link => MAX_NODES * MAX_NODES,
        }
    }
}

/// Which fill phase collects a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Local network status call.
    NetworkInfo,
    /// Local per-node info call.
    NodeInfo,
    /// Local event counter call.
    EventCounters,
    /// Dedicated full-mesh PHY rate query.
    FullMeshRate,
    /// Local password retrieval.
    Password,
    /// Single-shot local scalar getters.
    Misc,
    /// Remote Get-Queryables transactions.
    L2me,
}

/// Static description of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub param: Param,
    pub name: &'static str,
    pub cardinality: Cardinality,
    pub value_type: ValueType,
    pub source: Source,
    /// Value cannot change while the node stays admitted.
    pub admission_constant: bool,
    /// Part of the link-up timing report.
    pub link_up_timing: bool,
}

impl Descriptor {
    pub const fn new(
        param: Param,
        name: &'static str,
        cardinality: Cardinality,
        value_type: ValueType,
        source: Source,
    ) -> Self {
        Self {
            param,
            name,
            cardinality,
            value_type,
            source,
            admission_constant: false,
            link_up_timing: false,
        }
    }

    pub const fn admission_constant(mut self) -> Self {
        self.admission_constant = true;
        self
    }

    pub const fn link_up_timing(mut self) -> Self {
        self.link_up_timing = true;
        self
    }
}

// ============================================================================
// ParamTable
// ============================================================================

/// Verified view of a descriptor table plus a name index.
#[derive(Debug, Clone)]
pub struct ParamTable {
    descriptors: &'static [Descriptor],
    by_name: HashMap<&'static str, Param>,
}

impl ParamTable {
    /// Verify `descriptors` and index it by name.
    ///
    /// Fails if the table length differs from `Param::COUNT`, if any entry's
    /// identity disagrees with its position, or if a name repeats.
    pub fn new(descriptors: &'static [Descriptor]) -> Result<Self> {
        if descriptors.len() != Param::COUNT {
            return Err(Error::Structural {
                location: "ParamTable::new",
                message: format!("descriptor table has {} entries, expected {}", descriptors.len(), Param::COUNT),
            });
        }
        let mut by_name = HashMap::with_capacity(descriptors.len());
        for (index, d) in descriptors.iter().enumerate() {
            if d.param.index() != index {
                return Err(Error::Structural {
                    location: "ParamTable::new",
                    message: format!("descriptor at {index} claims identity {}", d.param.index()),
                });
            }
            if by_name.insert(d.name, d.param).is_some() {
                return Err(Error::Structural {
                    location: "ParamTable::new",
                    message: format!("duplicate parameter name '{}'", d.name),
                });
            }
        }
        Ok(Self { descriptors, by_name })
    }

    /// The built-in table.
    pub fn builtin() -> Result<Self> {
        Self::new(&DESCRIPTORS)
    }

    #[inline]
    pub fn describe(&self, param: Param) -> &Descriptor {
        &self.descriptors[param.index()]
    }

    /// Resolve a display name.
    pub fn lookup(&self, name: &str) -> Option<Param> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_verifies() {
        let table = ParamTable::builtin().unwrap();
        assert_eq!(table.len(), Param::COUNT);
        for p in Param::ALL {
            assert_eq!(table.describe(p).param, p);
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let table = ParamTable::builtin().unwrap();
        assert_eq!(table.lookup("link_snr"), Some(Param::LinkSnr));
        assert_eq!(table.lookup("no_such_param"), None);
        assert_eq!(Param::LinkSnr.to_string(), "link_snr");
    }

    #[test]
    fn test_corrupt_table_rejected() {
        static SWAPPED: std::sync::LazyLock<Vec<Descriptor>> = std::sync::LazyLock::new(|| {
            let mut v = DESCRIPTORS.to_vec();
            v.swap(0, 1);
            v
        });
        let err = ParamTable::new(SWAPPED.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn test_truncated_table_rejected() {
        assert!(ParamTable::new(&DESCRIPTORS[..10]).is_err());
    }

    #[test]
    fn test_from_index() {
        assert_eq!(Param::from_index(0), Some(Param::NcNode));
        assert_eq!(Param::from_index(Param::COUNT - 1), Some(Param::LinkTxUnicastProfile));
        assert_eq!(Param::from_index(Param::COUNT), None);
    }
}
