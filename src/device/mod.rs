//! # Device Contract
//!
//! Everything the collector needs from the network interface: the L2ME
//! transaction primitive and a handful of synchronous local getters.
//!
//! ## Implementations
//!
//! | Device      | Module | Description                               |
//! |-------------|--------|-------------------------------------------|
//! | `SimDevice` | `sim`  | In-memory simulated network for tests     |
//!
//! Getters a device cannot serve return `Error::NotSupported`; the
//! collector tolerates that per parameter.

pub mod sim;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::l2me::Submit;
use crate::model::{MacAddr, NodeId, NodeMask, MAX_NODES};
use crate::{Error, Result};

pub use sim::SimDevice;

// ============================================================================
// Transactions
// ============================================================================

/// One Get-Queryables request, as encoded submit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub submit: Vec<u32>,
}

impl Request {
    pub fn get_queryables(submit: &Submit) -> Self {
        Self { submit: submit.encode() }
    }
}

/// Outcome of a transaction the transport delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    /// Transient; the request may be retried.
    Timeout,
    /// Persistent failure with the device's error code.
    Failed(u32),
}

/// Transaction reply: status plus the concatenated response bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: TxStatus,
    pub payload: Vec<u8>,
}

// ============================================================================
// Local getter DTOs
// ============================================================================

/// Network-wide status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub nc_node: NodeId,
    pub backup_nc_node: NodeId,
    pub network_state: u32,
    pub beacon_channel: u32,
    pub moca_version: u32,
    pub self_node: NodeId,
    pub membership: NodeMask,
}

/// Per-node status as seen from the local node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub mac: MacAddr,
    pub moca_version: u32,
    pub preferred_nc: u32,
    pub protocol_caps: u32,
    pub admitted_seconds: u32,
}

impl NodeInfo {
    /// Protocol capability bit: the node answers L2ME Get-Queryables.
    pub const CAP_L2ME: u32 = 1 << 0;

    pub fn l2me_capable(&self) -> bool {
        self.protocol_caps & Self::CAP_L2ME != 0
    }
}

/// Local event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounters {
    pub link_up_events: u32,
    pub link_down_events: u32,
    pub admission_failures: u32,
    pub link_up_seconds: u32,
}

/// Per-link outcome of a full-mesh rate query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkRateStatus {
    Ok,
    NotInNetwork,
    Unavailable,
    /// The query itself failed for this link; nothing is known.
    #[default]
    QueryFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRate {
    pub status: LinkRateStatus,
    pub tx_phy_rate: u32,
    pub tx_nbas: u32,
}

/// Result of one full-mesh rate query, indexed by (queried, remote).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullMeshRates {
    links: Vec<LinkRate>,
}

impl Default for FullMeshRates {
    fn default() -> Self {
        Self { links: vec![LinkRate::default(); MAX_NODES * MAX_NODES] }
    }
}

impl FullMeshRates {
    pub fn get(&self, queried: NodeId, remote: NodeId) -> LinkRate {
        if !queried.is_valid() || !remote.is_valid() {
            return LinkRate::default();
        }
        self.links[queried.index() * MAX_NODES + remote.index()]
    }

    pub fn set(&mut self, queried: NodeId, remote: NodeId, rate: LinkRate) {
        if queried.is_valid() && remote.is_valid() {
            self.links[queried.index() * MAX_NODES + remote.index()] = rate;
        }
    }
}

/// Taboo channel configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabooChannels {
    pub start_channel: u32,
    pub channel_mask: u32,
}

// ============================================================================
// Device trait
// ============================================================================

/// The collaborator boundary of the collector.
///
/// All calls block until the device answers or refuses. `send` returns
/// `Err` only when the transport could not deliver the request at all.
pub trait Device: Send + Sync {
    /// Issue one L2ME transaction.
    fn send(&self, request: &Request) -> Result<Reply>;

    fn network_info(&self) -> Result<NetworkInfo>;

    fn node_info(&self, node: NodeId) -> Result<NodeInfo>;

    fn event_counters(&self) -> Result<EventCounters>;

    /// Query PHY rates of every link, within `budget`.
    fn full_mesh_rates(&self, _budget: Duration) -> Result<FullMeshRates> {
        Err(Error::NotSupported("full_mesh_rates".into()))
    }

    fn password(&self) -> Result<String> {
        Err(Error::NotSupported("password".into()))
    }

    fn taboo_channels(&self) -> Result<TabooChannels> {
        Err(Error::NotSupported("taboo_channels".into()))
    }

    /// Line-of-sight metric in hundredths of a decibel.
    fn line_of_sight(&self) -> Result<i32> {
        Err(Error::NotSupported("line_of_sight".into()))
    }

    fn advanced_link_counter(&self) -> Result<u32> {
        Err(Error::NotSupported("advanced_link_counter".into()))
    }

    fn link_status(&self) -> Result<u32> {
        Err(Error::NotSupported("link_status".into()))
    }

    /// Nodes currently admitted to the network.
    fn membership(&self) -> Result<NodeMask> {
        Ok(self.network_info()?.membership)
    }

    /// Admitted nodes that answer L2ME queries. A node whose info cannot
    /// be read counts as not capable.
    fn l2me_capable(&self) -> Result<NodeMask> {
        let members = self.membership()?;
        Ok(NodeMask::from_nodes(
            members.iter().filter(|n| self.node_info(*n).is_ok_and(|info| info.l2me_capable())),
        ))
    }
}
