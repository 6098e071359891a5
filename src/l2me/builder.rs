//! Greedy packing of outstanding L2ME triples into one submit.
//!
//! Four strategies run in a fixed order, round after round, until a whole
//! round adds nothing:
//!
//! 1. **Link, 1-word**: one queried node; every outstanding 1-word Link
//!    parameter of that node with the union of its remote nodes.
//! 2. **Node, 1-word**: one queried node; its outstanding 1-word Node
//!    parameters while the budgets allow.
//! 3. **Link, profile**: one parameter for one (queried, remote) pair.
//! 4. **Node, profile**: one parameter for one queried node.
//!
//! Every candidate addition is sized with `Submit::stats` from scratch and
//! dropped if it would not fit. Only the Node 1-word section ever queries
//! more than one node: when a single 1-word Node parameter is all that is
//! left, it is asked of every node that still needs it at once.

use tracing::{debug, trace};

use crate::context::Context;
use crate::model::{NodeId, NodeMask};
use crate::select::SelectionSet;
use crate::{Error, Result};

use super::map::MapEntry;
use super::submit::Submit;
use super::{Limits, Section};

type Strategy = fn(&Context, &Limits, &mut Submit, &mut SelectionSet) -> Result<bool>;

const STRATEGIES: [(&str, Strategy); 4] = [
    ("link_words", add_link_words),
    ("node_words", add_node_words),
    ("link_profile", add_link_profile),
    ("node_profile", add_node_profile),
];

/// Pack as much of `needed` as one transaction allows.
///
/// Returns an empty submit only when nothing in `needed` has a submit bit.
pub fn build_submit(ctx: &Context, needed: &SelectionSet) -> Result<Submit> {
    let limits = Limits::from(ctx.config());
    let mut submit = Submit::new();

    if let Some(entry) = lone_node_word(ctx, needed) {
        let bits = submit.section_mut(Section::Node1);
        bits.queried = needed.slot(entry.param, NodeId::ZERO);
        submit.select(entry);
        ensure_fits(&submit, &limits, "lone_node_word")?;
        debug!(param = %entry.param, nodes = %submit.queried(), "submit for a lone node parameter");
        return Ok(submit);
    }

    let mut remaining = needed.clone();
    let mut rounds = 0;
    loop {
        let mut added = false;
        for (name, strategy) in STRATEGIES {
            if strategy(ctx, &limits, &mut submit, &mut remaining)? {
                trace!(strategy = name, round = rounds, "strategy added to submit");
                added = true;
            }
        }
        rounds += 1;
        if !added {
            break;
        }
    }

    let stats = submit.stats(&limits);
    debug!(
        rounds,
        nodes = %submit.queried(),
        words = stats.concatenation_words,
        "built submit"
    );
    Ok(submit)
}

/// The single 1-word Node parameter `needed` still holds, if that is all
/// it holds.
fn lone_node_word(ctx: &Context, needed: &SelectionSet) -> Option<&'static MapEntry> {
    match needed.selected_params().as_slice() {
        [param] => ctx.submit_map().entry_for(*param).filter(|e| e.section == Section::Node1),
        _ => None,
    }
}

fn ensure_fits(submit: &Submit, limits: &Limits, strategy: &str) -> Result<()> {
    let stats = submit.stats(limits);
    if stats.fits(limits) {
        return Ok(());
    }
    Err(Error::Internal(format!(
        "submit already overflows before {strategy}: {} words, overflowing nodes {}",
        stats.concatenation_words, stats.overflowing
    )))
}

fn fits(submit: &Submit, limits: &Limits) -> bool {
    submit.stats(limits).fits(limits)
}

fn add_link_words(ctx: &Context, limits: &Limits, submit: &mut Submit, remaining: &mut SelectionSet) -> Result<bool> {
    ensure_fits(submit, limits, "link_words")?;
    if !submit.section(Section::Link1).is_empty() {
        return Ok(false);
    }
    let map = ctx.submit_map();

    for q in NodeId::all() {
        let mut trial = submit.clone();
        let mut any = false;
        for entry in map.section(Section::Link1) {
            let remotes = remaining.remotes_for(entry.param, q);
            if remotes.is_empty() {
                continue;
            }
            let mut candidate = trial.clone();
            let bits = candidate.section_mut(Section::Link1);
            bits.queried = NodeMask::single(q);
            bits.remote = bits.remote | remotes;
            candidate.select(entry);
            if fits(&candidate, limits) {
                trial = candidate;
                any = true;
            }
        }
        if !any {
            continue;
        }

        *submit = trial;
        let remotes = submit.remotes_of(Section::Link1, q);
        for entry in map.section(Section::Link1).filter(|e| submit.has(e)) {
            for r in remotes.iter() {
                remaining.clear_bit(ctx, entry.param, q, r);
            }
        }
        return Ok(true);
    }
    Ok(false)
}

fn add_node_words(ctx: &Context, limits: &Limits, submit: &mut Submit, remaining: &mut SelectionSet) -> Result<bool> {
    ensure_fits(submit, limits, "node_words")?;
    let map = ctx.submit_map();
    let queried = submit.section(Section::Node1).queried;

    let node = match (queried.len(), queried.first()) {
        (0, _) => {
            let outstanding = map.section(Section::Node1).fold(NodeMask::EMPTY, |acc, e| acc | remaining.slot(e.param, NodeId::ZERO));
            match outstanding.first() {
                Some(q) => q,
                None => return Ok(false),
            }
        }
        (1, Some(q)) => q,
        _ => return Ok(false),
    };

    let mut added = false;
    for entry in map.section(Section::Node1) {
        if submit.has(entry) || !remaining.slot(entry.param, NodeId::ZERO).contains(node) {
            continue;
        }
        let mut candidate = submit.clone();
        candidate.section_mut(Section::Node1).queried = NodeMask::single(node);
        candidate.select(entry);
        if !fits(&candidate, limits) {
            break;
        }
        *submit = candidate;
        remaining.clear_bit(ctx, entry.param, node, NodeId::ZERO);
        added = true;
    }
    Ok(added)
}

fn add_link_profile(ctx: &Context, limits: &Limits, submit: &mut Submit, remaining: &mut SelectionSet) -> Result<bool> {
    ensure_fits(submit, limits, "link_profile")?;
    if !submit.section(Section::Link32).is_empty() {
        return Ok(false);
    }
    for q in NodeId::all() {
        for r in NodeId::all().filter(|r| *r != q) {
            for entry in ctx.submit_map().section(Section::Link32) {
                if !remaining.slot(entry.param, r).contains(q) {
                    continue;
                }
                let mut candidate = submit.clone();
                let bits = candidate.section_mut(Section::Link32);
                bits.queried = NodeMask::single(q);
                bits.remote = NodeMask::single(r);
                candidate.select(entry);
                if fits(&candidate, limits) {
                    *submit = candidate;
                    remaining.clear_bit(ctx, entry.param, q, r);
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn add_node_profile(ctx: &Context, limits: &Limits, submit: &mut Submit, remaining: &mut SelectionSet) -> Result<bool> {
    ensure_fits(submit, limits, "node_profile")?;
    if !submit.section(Section::Node32).is_empty() {
        return Ok(false);
    }
    for q in NodeId::all() {
        for entry in ctx.submit_map().section(Section::Node32) {
            if !remaining.slot(entry.param, NodeId::ZERO).contains(q) {
                continue;
            }
            let mut candidate = submit.clone();
            candidate.section_mut(Section::Node32).queried = NodeMask::single(q);
            candidate.select(entry);
            if fits(&candidate, limits) {
                *submit = candidate;
                remaining.clear_bit(ctx, entry.param, q, NodeId::ZERO);
                return Ok(true);
            }
        }
    }
    Ok(false)
}
