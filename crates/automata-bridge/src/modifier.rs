//! Modifier packing.
//!
//! Object commands carry up to eight one-byte modifiers packed big-endian
//! into a single `u64` parameter, first modifier in the most significant
//! position that is used.

use std::{fmt, str::FromStr};

use arrayvec::ArrayVec;

/// Maximum number of modifiers that fit in one packed parameter.
pub const MAX_MODIFIERS: usize = 8;

/// Packs `modifiers` with `acc = (acc << 8) + next`.
///
/// The length is not checked: with more than [`MAX_MODIFIERS`] entries the
/// leading bytes are shifted out of the result. Use [`ModifierSet`] when the
/// input is not already known to be in range.
pub fn encode_modifiers(modifiers: &[u8]) -> u64 {
    modifiers.iter().fold(0u64, |acc, &m| (acc << 8) + u64::from(m))
}

/// An ordered sequence of at most [`MAX_MODIFIERS`] modifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierSet(ArrayVec<u8, MAX_MODIFIERS>);

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packs the set into a single command parameter.
    pub fn encode(&self) -> u64 {
        encode_modifiers(&self.0)
    }

    /// Inverse of [`encode`](Self::encode) for a set of `len` modifiers.
    pub fn decode(packed: u64, len: usize) -> Result<Self, ModifierError> {
        if len > MAX_MODIFIERS {
            return Err(ModifierError::TooMany(len));
        }
        let bytes = packed.to_be_bytes();
        Ok(Self(bytes[MAX_MODIFIERS - len..].iter().copied().collect()))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&[u8]> for ModifierSet {
    type Error = ModifierError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        ArrayVec::try_from(value).map(Self).map_err(|_| ModifierError::TooMany(value.len()))
    }
}

impl TryFrom<Vec<u8>> for ModifierSet {
    type Error = ModifierError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from(value.as_slice())
    }
}

impl<const N: usize> TryFrom<[u8; N]> for ModifierSet {
    type Error = ModifierError;

    fn try_from(value: [u8; N]) -> Result<Self, Self::Error> {
        Self::try_from(value.as_slice())
    }
}

/// Parses a comma-separated list such as `0,0,0,0,0,0,0,4`.
impl FromStr for ModifierSet {
    type Err = ModifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<u8>().map_err(|_| ModifierError::Invalid(v.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_from(values)
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u8::to_string).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

/// Errors raised while building a [`ModifierSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifierError {
    /// More modifiers than fit in one packed parameter.
    TooMany(usize),
    /// A list entry that is not an integer in `0..=255`.
    Invalid(String),
}

impl fmt::Display for ModifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooMany(n) => write!(f, "too many modifiers: {n} (max {MAX_MODIFIERS})"),
            Self::Invalid(v) => write!(f, "invalid modifier: {v:?} (expected 0-255)"),
        }
    }
}

impl std::error::Error for ModifierError {}
