//! # L2ME Remote Queries
//!
//! Parameters that only the remote node itself knows are fetched with
//! Get-Queryables transactions. One transaction carries a *submit*: four
//! sections, each naming the queried nodes and the parameters wanted from
//! them. Every queried node answers with its values concatenated in
//! submit-map order.
//!
//! ```text
//! SelectionSet ──build_submit()──▶ Submit ──encode()──▶ Device::send
//!      ▲                                                     │
//!      └── clear resolved ◀── install_response() ◀── decode_concatenated()
//! ```
//!
//! | Section  | Cardinality | Width per value | Selection words |
//! |----------|-------------|-----------------|-----------------|
//! | `Link32` | Link        | 32 words        | 1               |
//! | `Node32` | Node        | 32 words        | 1               |
//! | `Link1`  | Link        | 1 word          | 1               |
//! | `Node1`  | Node        | 1 word          | 2               |

pub mod builder;
pub mod map;
pub mod response;
pub mod submit;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::model::PROFILE_WORDS;
use crate::param::Cardinality;

pub use builder::build_submit;
pub use map::{MapEntry, SubmitMap, SUBMIT_MAP};
pub use response::{decode_concatenated, encode_concatenated, install_response, InstallOutcome, NodeResponse, NodeResponses};
pub use submit::{ResponseItem, SectionBits, Submit, SubmitStats};

/// Most selection words any section carries.
pub const MAX_SECTION_WORDS: usize = 2;

/// Directory entry flag: the node produced a response.
pub const DIR_VALID: u32 = 1 << 31;

/// Directory entry mask of the word count.
pub const DIR_COUNT_MASK: u32 = 0xffff;

/// Submit section. The declaration order is the wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Section {
    Link32,
    Node32,
    Link1,
    Node1,
}

impl Section {
    pub const ALL: [Section; 4] = [Section::Link32, Section::Node32, Section::Link1, Section::Node1];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Selection words carried in the submit.
    pub fn words(self) -> usize {
        match self {
            Section::Node1 => 2,
            _ => 1,
        }
    }

    /// Response words one selected parameter costs per (queried, remote).
    pub fn width(self) -> usize {
        match self {
            Section::Link32 | Section::Node32 => PROFILE_WORDS,
            Section::Link1 | Section::Node1 => 1,
        }
    }

    pub fn is_link(self) -> bool {
        matches!(self, Section::Link32 | Section::Link1)
    }

    pub fn cardinality(self) -> Cardinality {
        if self.is_link() { Cardinality::Link } else { Cardinality::Node }
    }
}

/// Response size limits of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_words_per_node: usize,
    pub max_concat_words: usize,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_words_per_node: config.max_words_per_node,
            max_concat_words: config.max_concat_words,
        }
    }
}
