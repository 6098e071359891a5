//! Fixed per-parameter slot ranges.
//!
//! | Cardinality | Slots      | Index                         |
//! |-------------|------------|-------------------------------|
//! | Network     | 1          | `base`                        |
//! | Node        | N          | `base + queried`              |
//! | Link        | N²         | `base + queried · N + remote` |
//!
//! Ranges are laid out in parameter order and never move.

use crate::model::{NodeId, MAX_NODES};
use crate::param::{Cardinality, Descriptor, Param, ParamTable};
use crate::{Error, Result};

/// Contiguous slots reserved for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub base: usize,
    pub len: usize,
}

impl SlotRange {
    pub fn end(&self) -> usize {
        self.base + self.len
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.base..self.end()).contains(&index)
    }
}

/// Frozen slot ranges of every parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    ranges: Vec<SlotRange>,
    total: usize,
    capacity: usize,
}

impl CacheLayout {
    /// Lay out every parameter of `params` inside `capacity` slots.
    pub fn new(params: &ParamTable, capacity: usize) -> Result<Self> {
        let mut ranges = Vec::with_capacity(params.len());
        let mut base = 0;
        for d in params.iter() {
            let len = d.cardinality.slots();
            ranges.push(SlotRange { base, len });
            base += len;
        }
        if base > capacity {
            return Err(Error::Structural {
                location: "CacheLayout::new",
                message: format!("parameters need {base} slots, cache capacity is {capacity}"),
            });
        }
        Ok(Self { ranges, total: base, capacity })
    }

    #[inline]
    pub fn range(&self, param: Param) -> SlotRange {
        self.ranges[param.index()]
    }

    /// Slots reserved across all parameters.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot of (`queried`, `remote`) of a parameter, or `None` when the
    /// computed slot falls outside the parameter's range. Arguments that
    /// a cardinality does not use are ignored.
    pub fn index_of(&self, d: &Descriptor, queried: NodeId, remote: NodeId) -> Option<usize> {
        let range = self.range(d.param);
        let offset = match d.cardinality {
            Cardinality::Network => 0,
            Cardinality::Node => queried.index(),
            Cardinality::Link => {
                if !remote.is_valid() {
                    return None;
                }
                queried.index() * MAX_NODES + remote.index()
            }
        };
        let index = range.base + offset;
        range.contains(index).then_some(index)
    }
}
