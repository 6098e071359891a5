//! # moca-cache: MoCA Parameter Cache with Batched L2ME Queries
//!
//! A typed, host-side view of per-network, per-node and per-link attributes
//! of a coax mesh network, kept current by local getters and by batched
//! remote Get-Queryables transactions.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `Device` is the contract between the collector and the network
//! 2. **Static tables**: descriptors and the submit map are `const` data, verified once
//! 3. **Explicit context**: no globals; every operation takes a `Context`
//! 4. **Dispositions, not errors**: data a node cannot give is a slot state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use moca_cache::{Config, Mesh, NodeId, NodeMask, Param};
//!
//! # fn example() -> moca_cache::Result<()> {
//! let members = NodeMask::from_nodes((0..4).map(NodeId));
//! let mut mesh = Mesh::open_sim(Config::default(), members)?;
//!
//! let select = mesh.parse_selection("/node_uptime/link_snr-1")?;
//! let report = mesh.refresh(&select, Duration::from_secs(2), &mut std::thread::sleep)?;
//!
//! let (value, disposition) = mesh.master().view(Param::NodeUptime, NodeId(2), NodeId::ZERO);
//! println!("{value:?} ({disposition}) after {} transactions", report.transactions);
//! # Ok(())
//! # }
//! ```
//!
//! ## Devices
//!
//! | Device | Module | Description |
//! |--------|--------|-------------|
//! | Simulated | `device::sim` | In-memory network for testing and embedding |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod param;
pub mod select;
pub mod pool;
pub mod cache;
pub mod l2me;
pub mod device;
pub mod collect;
pub mod context;
pub mod config;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Disposition, MacAddr, NodeId, NodeMask, Profile, Value, ValueType, MAX_NODES};
pub use param::{Cardinality, Descriptor, Param, ParamTable, Source};
pub use select::{NodeSel, Presets, SelectionSet};
pub use pool::{ElementPool, SizeClass, SlabPool};
pub use cache::{Cache, Entry};
pub use device::{Device, SimDevice};
pub use collect::{fill_cache, FillReport, Phase};
pub use context::{Context, RecordingReporter, Reporter, TracingReporter};
pub use config::Config;

use std::time::Duration;

// ============================================================================
// Top-level Mesh handle
// ============================================================================

/// The primary entry point. A `Mesh` wraps a device and the master cache
/// that consumers read.
pub struct Mesh<D: Device> {
    ctx: Context,
    device: D,
    master: Cache,
}

impl<D: Device> Mesh<D> {
    /// Create a Mesh over `device` with an empty master cache.
    pub fn new(ctx: Context, device: D) -> Result<Self> {
        let master = Cache::new(&ctx)?;
        Ok(Self { ctx, device, master })
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Access the underlying device (for advanced use).
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The cache consumers read.
    pub fn master(&self) -> &Cache {
        &self.master
    }

    /// A new cache sharing every element of the master.
    pub fn new_cache(&self) -> Result<Cache> {
        let mut cache = Cache::new(&self.ctx)?;
        cache.copy_from(&self.master);
        Ok(cache)
    }

    pub fn parse_selection(&self, text: &str) -> Result<SelectionSet> {
        SelectionSet::parse(&self.ctx, text)
    }

    /// Fill the master cache in place.
    pub fn fill(&mut self, select: &SelectionSet, timeout: Duration, spin: &mut dyn FnMut(Duration)) -> Result<FillReport> {
        fill_cache(&self.ctx, &self.device, &mut self.master, select, timeout, spin)
    }

    /// Fill a copy of the master and swap it in once the cycle is over.
    ///
    /// Readers of `master()` never see a half-filled cache. On error the
    /// master is left as it was.
    pub fn refresh(&mut self, select: &SelectionSet, timeout: Duration, spin: &mut dyn FnMut(Duration)) -> Result<FillReport> {
        let mut next = self.new_cache()?;
        let report = fill_cache(&self.ctx, &self.device, &mut next, select, timeout, spin)?;
        self.master = next;
        Ok(report)
    }
}

/// Simulated network for testing and embedding.
impl Mesh<SimDevice> {
    pub fn open_sim(config: Config, members: NodeMask) -> Result<Self> {
        let ctx = Context::new(config)?;
        let device = SimDevice::new(&ctx, members);
        Self::new(ctx, device)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Selection syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Structural error in {location}: {message}")]
    Structural { location: &'static str, message: String },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transaction failed with code {0}")]
    Transaction(u32),

    #[error("Element pool exhausted for size class {0:?}")]
    PoolExhausted(SizeClass),

    #[error("Invalid {class:?} pool handle {handle}")]
    Dereference { class: SizeClass, handle: u32 },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
