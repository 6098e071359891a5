//! Wire submit and its response-size accounting.
//!
//! Encoded layout, section by section in wire order:
//!
//! ```text
//! queried mask │ remote mask (Link sections only) │ selection word(s)
//! ```

use smallvec::SmallVec;

use crate::model::{NodeId, NodeMask, MAX_NODES};
use crate::param::Param;
use crate::{Error, Result};

use super::map::{MapEntry, SubmitMap};
use super::{Limits, Section, MAX_SECTION_WORDS};

/// Encoded submit length in words.
pub const SUBMIT_WORDS: usize = 4 + 2 + 1 + 1 + 1 + 2;

/// One section of a submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionBits {
    pub queried: NodeMask,
    /// Remote nodes; unused by Node sections.
    pub remote: NodeMask,
    pub words: [u32; MAX_SECTION_WORDS],
}

impl SectionBits {
    /// Number of selected parameters.
    pub fn selected(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queried.is_empty()
    }
}

/// One Get-Queryables request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submit {
    sections: [SectionBits; 4],
}

/// Response size a submit would produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitStats {
    pub per_node_words: [usize; MAX_NODES],
    pub concatenation_words: usize,
    /// Nodes whose response would exceed the per-node limit.
    pub overflowing: NodeMask,
}

impl SubmitStats {
    /// Whether the submit stays inside both limits.
    pub fn fits(&self, limits: &Limits) -> bool {
        self.overflowing.is_empty() && self.concatenation_words <= limits.max_concat_words
    }
}

/// One value in a queried node's response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseItem {
    pub param: Param,
    /// Remote node for Link parameters, node 0 otherwise.
    pub remote: NodeId,
    /// Word offset inside the node's response.
    pub offset: usize,
    pub width: usize,
}

impl Submit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, section: Section) -> &SectionBits {
        &self.sections[section.index()]
    }

    pub fn section_mut(&mut self, section: Section) -> &mut SectionBits {
        &mut self.sections[section.index()]
    }

    /// Whether the submit asks anything of anyone.
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.is_empty() || s.selected() == 0)
    }

    /// Every node queried in any section.
    pub fn queried(&self) -> NodeMask {
        self.sections.iter().fold(NodeMask::EMPTY, |acc, s| acc | s.queried)
    }

    /// Whether `entry`'s selection bit is set.
    pub fn has(&self, entry: &MapEntry) -> bool {
        self.section(entry.section).words[entry.word as usize] & entry.mask() != 0
    }

    pub fn select(&mut self, entry: &MapEntry) {
        self.section_mut(entry.section).words[entry.word as usize] |= entry.mask();
    }

    /// Remote nodes a Link section reads for queried node `queried`.
    pub fn remotes_of(&self, section: Section, queried: NodeId) -> NodeMask {
        self.section(section).remote - NodeMask::single(queried)
    }

    // ========================================================================
    // Sizing
    // ========================================================================

    /// Response words each queried node would return.
    pub fn stats(&self, limits: &Limits) -> SubmitStats {
        let mut per_node_words = [0usize; MAX_NODES];
        for section in Section::ALL {
            let bits = self.section(section);
            let words = bits.selected() * section.width();
            for q in bits.queried.iter() {
                per_node_words[q.index()] += words;
            }
        }
        let overflowing =
            NodeMask::from_nodes(NodeId::all().filter(|q| per_node_words[q.index()] > limits.max_words_per_node));
        SubmitStats {
            per_node_words,
            concatenation_words: per_node_words.iter().sum(),
            overflowing,
        }
    }

    /// Layout of `queried`'s response, in submit-map order.
    ///
    /// Every parameter takes `width` words. The remote nodes of a Link
    /// parameter (ascending, the queried node itself excluded) all read
    /// the same words.
    pub fn response_items(&self, map: &SubmitMap, queried: NodeId) -> SmallVec<[ResponseItem; 16]> {
        let mut items = SmallVec::new();
        let mut offset = 0;
        for entry in map.iter() {
            let bits = self.section(entry.section);
            if !bits.queried.contains(queried) || !self.has(entry) {
                continue;
            }
            let width = entry.section.width();
            if entry.section.is_link() {
                for remote in self.remotes_of(entry.section, queried).iter() {
                    items.push(ResponseItem { param: entry.param, remote, offset, width });
                }
            } else {
                items.push(ResponseItem { param: entry.param, remote: NodeId::ZERO, offset, width });
            }
            offset += width;
        }
        items
    }

    // ========================================================================
    // Wire codec
    // ========================================================================

    pub fn encode(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(SUBMIT_WORDS);
        for section in Section::ALL {
            let bits = self.section(section);
            out.push(bits.queried.0);
            if section.is_link() {
                out.push(bits.remote.0);
            }
            out.extend_from_slice(&bits.words[..section.words()]);
        }
        out
    }

    pub fn decode(words: &[u32]) -> Result<Submit> {
        if words.len() != SUBMIT_WORDS {
            return Err(Error::Transport(format!("submit has {} words, expected {SUBMIT_WORDS}", words.len())));
        }
        let mask = |raw: u32| -> Result<NodeMask> {
            if raw & !NodeMask::ALL.0 != 0 {
                return Err(Error::Transport(format!("node mask {raw:#x} names nodes past {MAX_NODES}")));
            }
            Ok(NodeMask(raw))
        };

        let mut submit = Submit::new();
        let mut rest = words;
        for section in Section::ALL {
            let bits = submit.section_mut(section);
            bits.queried = mask(rest[0])?;
            rest = &rest[1..];
            if section.is_link() {
                bits.remote = mask(rest[0])?;
                rest = &rest[1..];
            }
            let n = section.words();
            bits.words[..n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
        }
        Ok(submit)
    }
}
