//! Submit map: where each L2ME parameter sits in a submit.
//!
//! Entries are stored in ascending (section, word, bit) order. Responses
//! are laid out in that same order, so the decoder depends on it.

use crate::model::ValueType;
use crate::param::{Param, ParamTable, Source};
use crate::{Error, Result};

use super::Section;

/// One parameter's selection bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapEntry {
    pub param: Param,
    pub section: Section,
    pub word: u8,
    pub bit: u8,
}

impl MapEntry {
    pub const fn new(param: Param, section: Section, word: u8, bit: u8) -> Self {
        Self { param, section, word, bit }
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        1u32 << self.bit
    }

    fn key(&self) -> (Section, u8, u8) {
        (self.section, self.word, self.bit)
    }
}

/// The built-in submit map.
pub static SUBMIT_MAP: [MapEntry; 16] = [
    MapEntry::new(Param::LinkRxUnicastProfile, Section::Link32, 0, 0),
    MapEntry::new(Param::LinkTxUnicastProfile, Section::Link32, 0, 1),
    MapEntry::new(Param::NodeBroadcastProfile, Section::Node32, 0, 0),
    MapEntry::new(Param::NodeMapProfile, Section::Node32, 0, 1),
    MapEntry::new(Param::LinkRxPower, Section::Link1, 0, 0),
    MapEntry::new(Param::LinkSnr, Section::Link1, 0, 1),
    MapEntry::new(Param::LinkTxPackets, Section::Link1, 0, 2),
    MapEntry::new(Param::LinkRxPackets, Section::Link1, 0, 3),
    MapEntry::new(Param::LinkRxErrors, Section::Link1, 0, 4),
    MapEntry::new(Param::LinkTxBackoff, Section::Link1, 0, 5),
    MapEntry::new(Param::NodeFirmwareVersion, Section::Node1, 0, 0),
    MapEntry::new(Param::NodeTxPower, Section::Node1, 0, 1),
    MapEntry::new(Param::NodeUptime, Section::Node1, 0, 2),
    MapEntry::new(Param::NodeRxPackets, Section::Node1, 0, 3),
    MapEntry::new(Param::NodeTemperature, Section::Node1, 1, 0),
    MapEntry::new(Param::NodeRxErrors, Section::Node1, 1, 1),
];

/// Verified submit map with a reverse index by parameter.
#[derive(Debug, Clone)]
pub struct SubmitMap {
    entries: &'static [MapEntry],
    by_param: [Option<u8>; Param::COUNT],
}

impl SubmitMap {
    /// Verify `entries` against the descriptor table.
    ///
    /// Every entry must sit inside its section, entries must be strictly
    /// ascending, the section must match the parameter's cardinality and
    /// width, and every L2ME parameter must appear exactly once.
    pub fn new(entries: &'static [MapEntry], params: &ParamTable) -> Result<Self> {
        let structural = |message: String| Error::Structural { location: "SubmitMap::new", message };

        let mut by_param = [None; Param::COUNT];
        for (i, e) in entries.iter().enumerate() {
            if e.word as usize >= e.section.words() || e.bit >= 32 {
                return Err(structural(format!("{} at {:?} word {} bit {} is outside its section", e.param, e.section, e.word, e.bit)));
            }
            if i > 0 && entries[i - 1].key() >= e.key() {
                return Err(structural(format!("{} is out of order after {}", e.param, entries[i - 1].param)));
            }
            let d = params.describe(e.param);
            if d.source != Source::L2me {
                return Err(structural(format!("{} is not collected through L2ME", e.param)));
            }
            let width_ok = match e.section.width() {
                1 => d.value_type.is_scalar(),
                _ => d.value_type == ValueType::Profile,
            };
            if d.cardinality != e.section.cardinality() || !width_ok {
                return Err(structural(format!("{} ({:?}, {:?}) does not fit section {:?}", e.param, d.cardinality, d.value_type, e.section)));
            }
            if by_param[e.param.index()].replace(i as u8).is_some() {
                return Err(structural(format!("{} is mapped twice", e.param)));
            }
        }

        if let Some(missing) = params.iter().find(|d| d.source == Source::L2me && by_param[d.param.index()].is_none()) {
            return Err(structural(format!("{} has no submit bit", missing.param)));
        }
        Ok(Self { entries, by_param })
    }

    /// The built-in map.
    pub fn builtin(params: &ParamTable) -> Result<Self> {
        Self::new(&SUBMIT_MAP, params)
    }

    pub fn entries(&self) -> &'static [MapEntry] {
        self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static MapEntry> {
        self.entries.iter()
    }

    /// Entries of one section, in bit order.
    pub fn section(&self, section: Section) -> impl Iterator<Item = &'static MapEntry> {
        self.entries.iter().filter(move |e| e.section == section)
    }

    pub fn entry_for(&self, param: Param) -> Option<&'static MapEntry> {
        let entries = self.entries;
        self.by_param[param.index()].map(|i| &entries[i as usize])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
