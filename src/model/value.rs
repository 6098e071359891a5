//! Typed parameter values.
//!
//! Every cached element holds one `Value`. Values cross three boundaries:
//! pool blocks (fixed-size byte storage), L2ME response words, and the
//! consumer-facing API.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Error, Result};

/// Nibbles in one bit-loading profile.
pub const PROFILE_NIBBLES: usize = 256;

/// 32-bit words one profile occupies on the wire (8 nibbles per word).
pub const PROFILE_WORDS: usize = PROFILE_NIBBLES / 8;

/// Longest password a pool block can hold (one length byte + text).
pub const PASSWORD_MAX_LEN: usize = 255;

/// Value type of a parameter, fixed by its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    UInt32,
    Int32,
    /// Signed hundredths of a decibel.
    CentiDecibel,
    MacAddr,
    /// 256 four-bit entries.
    Profile,
    Password,
}

impl ValueType {
    pub fn is_scalar(self) -> bool {
        matches!(self, ValueType::UInt32 | ValueType::Int32 | ValueType::CentiDecibel)
    }
}

/// 48-bit MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

/// Bit-loading profile: one nibble (0..=15) per subcarrier group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    nibbles: Vec<u8>,
}

impl Profile {
    /// Build from exactly `PROFILE_NIBBLES` values, each masked to 4 bits.
    pub fn from_nibbles(nibbles: &[u8]) -> Result<Self> {
        if nibbles.len() != PROFILE_NIBBLES {
            return Err(Error::TypeError {
                expected: format!("{PROFILE_NIBBLES} nibbles"),
                got: format!("{} nibbles", nibbles.len()),
            });
        }
        Ok(Self { nibbles: nibbles.iter().map(|n| n & 0x0f).collect() })
    }

    /// A profile with every entry equal to `nibble`.
    pub fn uniform(nibble: u8) -> Self {
        Self { nibbles: vec![nibble & 0x0f; PROFILE_NIBBLES] }
    }

    pub fn nibbles(&self) -> &[u8] {
        &self.nibbles
    }

    /// Unpack from wire words, low nibble of each word first.
    pub fn from_words(words: &[u32]) -> Result<Self> {
        if words.len() != PROFILE_WORDS {
            return Err(Error::TypeError {
                expected: format!("{PROFILE_WORDS} profile words"),
                got: format!("{} words", words.len()),
            });
        }
        let mut nibbles = Vec::with_capacity(PROFILE_NIBBLES);
        for word in words {
            for shift in 0..8 {
                nibbles.push(((word >> (shift * 4)) & 0x0f) as u8);
            }
        }
        Ok(Self { nibbles })
    }

    /// Pack into wire words, low nibble of each word first.
    pub fn to_words(&self) -> SmallVec<[u32; PROFILE_WORDS]> {
        self.nibbles
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u32, |w, (i, n)| w | ((*n as u32 & 0x0f) << (i * 4)))
            })
            .collect()
    }
}

/// A cached parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    UInt32(u32),
    Int32(i32),
    CentiDecibel(i32),
    MacAddr(MacAddr),
    Profile(Profile),
    Password(String),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::UInt32(_) => ValueType::UInt32,
            Value::Int32(_) => ValueType::Int32,
            Value::CentiDecibel(_) => ValueType::CentiDecibel,
            Value::MacAddr(_) => ValueType::MacAddr,
            Value::Profile(_) => ValueType::Profile,
            Value::Password(_) => ValueType::Password,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) | Value::CentiDecibel(v) => Some(*v),
            _ => None,
        }
    }
}

// ============================================================================
// Wire words (L2ME responses)
// ============================================================================

impl Value {
    /// Decode a value of type `ty` from its wire words.
    pub fn from_words(ty: ValueType, words: &[u32]) -> Result<Value> {
        match (ty, words) {
            (ValueType::UInt32, [w]) => Ok(Value::UInt32(*w)),
            (ValueType::Int32, [w]) => Ok(Value::Int32(*w as i32)),
            (ValueType::CentiDecibel, [w]) => Ok(Value::CentiDecibel(*w as i32)),
            (ValueType::Profile, words) => Profile::from_words(words).map(Value::Profile),
            _ => Err(Error::TypeError {
                expected: format!("{ty:?} wire encoding"),
                got: format!("{} words", words.len()),
            }),
        }
    }

    /// Encode into wire words. MAC addresses and passwords have no wire form.
    pub fn to_words(&self) -> Option<SmallVec<[u32; PROFILE_WORDS]>> {
        match self {
            Value::UInt32(v) => Some(smallvec::smallvec![*v]),
            Value::Int32(v) | Value::CentiDecibel(v) => Some(smallvec::smallvec![*v as u32]),
            Value::Profile(p) => Some(p.to_words()),
            Value::MacAddr(_) | Value::Password(_) => None,
        }
    }
}

// ============================================================================
// Pool block encoding
// ============================================================================

impl Value {
    /// Serialize into a pool block. The block must be at least as large as
    /// the value's size class.
    pub fn write_block(&self, block: &mut [u8]) -> Result<()> {
        let need = match self {
            Value::UInt32(_) | Value::Int32(_) | Value::CentiDecibel(_) => 4,
            Value::MacAddr(_) => 6,
            Value::Profile(_) => PROFILE_NIBBLES,
            Value::Password(s) => 1 + s.len(),
        };
        if let Value::Password(s) = self {
            if s.len() > PASSWORD_MAX_LEN {
                return Err(Error::TypeError {
                    expected: format!("password of at most {PASSWORD_MAX_LEN} bytes"),
                    got: format!("{} bytes", s.len()),
                });
            }
        }
        if block.len() < need {
            return Err(Error::Internal(format!(
                "pool block of {} bytes cannot hold {:?}",
                block.len(),
                self.value_type()
            )));
        }
        match self {
            Value::UInt32(v) => block[..4].copy_from_slice(&v.to_le_bytes()),
            Value::Int32(v) | Value::CentiDecibel(v) => block[..4].copy_from_slice(&v.to_le_bytes()),
            Value::MacAddr(mac) => block[..6].copy_from_slice(&mac.0),
            Value::Profile(p) => block[..PROFILE_NIBBLES].copy_from_slice(p.nibbles()),
            Value::Password(s) => {
                block[0] = s.len() as u8;
                block[1..1 + s.len()].copy_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }

    /// Deserialize a value of type `ty` from a pool block.
    pub fn read_block(ty: ValueType, block: &[u8]) -> Result<Value> {
        let short = || Error::Internal(format!("pool block of {} bytes too short for {ty:?}", block.len()));
        let word = |b: &[u8]| -> Result<[u8; 4]> { b.get(..4).and_then(|s| s.try_into().ok()).ok_or_else(short) };
        match ty {
            ValueType::UInt32 => Ok(Value::UInt32(u32::from_le_bytes(word(block)?))),
            ValueType::Int32 => Ok(Value::Int32(i32::from_le_bytes(word(block)?))),
            ValueType::CentiDecibel => Ok(Value::CentiDecibel(i32::from_le_bytes(word(block)?))),
            ValueType::MacAddr => {
                let bytes: [u8; 6] = block.get(..6).and_then(|s| s.try_into().ok()).ok_or_else(short)?;
                Ok(Value::MacAddr(MacAddr(bytes)))
            }
            ValueType::Profile => {
                let nibbles = block.get(..PROFILE_NIBBLES).ok_or_else(short)?;
                Profile::from_nibbles(nibbles).map(Value::Profile)
            }
            ValueType::Password => {
                let len = *block.first().ok_or_else(short)? as usize;
                let text = block.get(1..1 + len).ok_or_else(short)?;
                String::from_utf8(text.to_vec())
                    .map(Value::Password)
                    .map_err(|e| Error::TypeError { expected: "UTF-8 password".into(), got: e.to_string() })
            }
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::CentiDecibel(v) => {
                let sign = if *v < 0 { "-" } else { "" };
                let abs = v.unsigned_abs();
                write!(f, "{sign}{}.{:02} dB", abs / 100, abs % 100)
            }
            Value::MacAddr(mac) => write!(f, "{mac}"),
            Value::Profile(p) => {
                for n in p.nibbles() {
                    write!(f, "{n:x}")?;
                }
                Ok(())
            }
            Value::Password(s) => write!(f, "{s}"),
        }
    }
}

impl From<u32> for Value { fn from(v: u32) -> Self { Value::UInt32(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int32(v) } }
impl From<MacAddr> for Value { fn from(v: MacAddr) -> Self { Value::MacAddr(v) } }
impl From<Profile> for Value { fn from(v: Profile) -> Self { Value::Profile(v) } }
