//! # Network Model
//!
//! Plain data shared by every layer: node identifiers and masks, typed
//! parameter values, and slot dispositions.
//!
//! Design rule: no pool handles, no device types here. This module is
//! pure data with no I/O and no state.

pub mod node;
pub mod value;
pub mod disposition;

pub use node::{NodeId, NodeMask, MAX_NODES};
pub use value::{MacAddr, Profile, Value, ValueType, PASSWORD_MAX_LEN, PROFILE_NIBBLES, PROFILE_WORDS};
pub use disposition::Disposition;
