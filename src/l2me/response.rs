//! Concatenated Get-Queryables responses.
//!
//! Wire format (big-endian 32-bit words):
//!
//! ```text
//! ┌──────────────── directory: MAX_NODES words ────────────────┐┌── payload ──┐
//! │ node 0 entry │ node 1 entry │ ... │ node 15 entry          ││ node words  │
//! └────────────────────────────────────────────────────────────┘└─────────────┘
//! entry = DIR_VALID (bit 31) | word count (bits 0..16)
//! ```
//!
//! Payloads of valid entries follow the directory in node order. A node
//! whose entry is invalid, larger than the per-node limit, past the total
//! limit or cut short by the end of the buffer is treated as having sent
//! nothing.

use tracing::{debug, warn};

use crate::cache::Cache;
use crate::context::Context;
use crate::model::{Disposition, NodeId, NodeMask, Value, MAX_NODES};
use crate::select::SelectionSet;

use super::submit::Submit;
use super::{Limits, DIR_COUNT_MASK, DIR_VALID};

/// What one node sent back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeResponse {
    pub valid: bool,
    pub words: Vec<u32>,
}

/// Per-node responses of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResponses {
    nodes: Vec<NodeResponse>,
}

impl Default for NodeResponses {
    fn default() -> Self {
        Self::none()
    }
}

impl NodeResponses {
    /// No node answered.
    pub fn none() -> Self {
        Self { nodes: vec![NodeResponse::default(); MAX_NODES] }
    }

    pub fn node(&self, node: NodeId) -> &NodeResponse {
        &self.nodes[node.index()]
    }

    /// Record `words` as `node`'s valid response.
    pub fn set(&mut self, node: NodeId, words: Vec<u32>) {
        self.nodes[node.index()] = NodeResponse { valid: true, words };
    }

    pub fn valid_nodes(&self) -> NodeMask {
        NodeMask::from_nodes(NodeId::all().filter(|n| self.nodes[n.index()].valid))
    }
}

/// Split a concatenated response into per-node word streams.
pub fn decode_concatenated(bytes: &[u8], limits: &Limits) -> NodeResponses {
    let mut out = NodeResponses::none();
    if bytes.len() % 4 != 0 {
        debug!(len = bytes.len(), "ignoring trailing response bytes");
    }
    let words: Vec<u32> = bytes.chunks_exact(4).map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]])).collect();
    if words.len() < MAX_NODES {
        warn!(words = words.len(), "response shorter than its directory");
        return out;
    }

    let (directory, payload) = words.split_at(MAX_NODES);
    let mut cursor = 0;
    let mut total = 0;
    for (q, entry) in NodeId::all().zip(directory) {
        if entry & DIR_VALID == 0 {
            continue;
        }
        let count = (entry & DIR_COUNT_MASK) as usize;
        let Some(body) = payload.get(cursor..cursor + count) else {
            warn!(node = %q, count, remaining = payload.len() - cursor, "response truncated");
            break;
        };
        cursor += count;
        total += count;
        if count > limits.max_words_per_node || total > limits.max_concat_words {
            warn!(node = %q, count, total, "response exceeds limits");
            continue;
        }
        out.set(q, body.to_vec());
    }
    out
}

/// Inverse of `decode_concatenated`.
pub fn encode_concatenated(responses: &NodeResponses) -> Vec<u8> {
    let mut words = Vec::with_capacity(MAX_NODES);
    for node in &responses.nodes {
        words.push(if node.valid { DIR_VALID | (node.words.len() as u32 & DIR_COUNT_MASK) } else { 0 });
    }
    for node in responses.nodes.iter().filter(|n| n.valid) {
        words.extend_from_slice(&node.words);
    }
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Counts from one `install_response` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOutcome {
    pub fresh: usize,
    pub unretrievable: usize,
    /// Installs the cache refused (pool exhaustion, block failures).
    pub failed: usize,
}

/// Install every value `submit` asked for into `cache`.
///
/// Each resolved triple is cleared from `needed`, whether it produced a
/// value or not. Writes are filtered by `select` when one is given.
pub fn install_response(
    ctx: &Context,
    cache: &mut Cache,
    select: Option<&SelectionSet>,
    needed: &mut SelectionSet,
    submit: &Submit,
    responses: &NodeResponses,
) -> InstallOutcome {
    let mut outcome = InstallOutcome::default();
    for q in submit.queried().iter() {
        let response = responses.node(q);
        for item in submit.response_items(ctx.submit_map(), q) {
            let value_type = ctx.describe(item.param).value_type;
            let value = response
                .valid
                .then(|| response.words.get(item.offset..item.offset + item.width))
                .flatten()
                .and_then(|words| Value::from_words(value_type, words).ok());

            let result = match value {
                Some(v) => cache.set(item.param, select, q, item.remote, Some(v), Disposition::Fresh).map(|set| (set, true)),
                None => cache.set(item.param, select, q, item.remote, None, Disposition::Unretrievable).map(|set| (set, false)),
            };
            match result {
                Ok((true, true)) => outcome.fresh += 1,
                Ok((true, false)) => outcome.unretrievable += 1,
                Ok((false, _)) => {}
                Err(e) => {
                    debug!(param = %item.param, node = %q, remote = %item.remote, error = %e, "install failed");
                    outcome.failed += 1;
                }
            }
            needed.clear_bit(ctx, item.param, q, item.remote);
        }
    }
    outcome
}
