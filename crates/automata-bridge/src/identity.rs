//! Processing keys and the player ids derived from them.
//!
//! A player id is words `[1]` and `[2]` of the little-endian `u64`
//! decomposition of the public key's x coordinate. The settlement contract
//! emits the same two words in `TopUp`, so the derivation has to match the
//! rollup bit for bit.

use std::{fmt, str::FromStr};

use ark_ed_on_bn254::Fr as Scalar;
use ark_ff::PrimeField;

use crate::curve::{self, Point};

/// Secret credential authorising commands for one account.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessingKey(String);

impl ProcessingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key string.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Parses the key as a hexadecimal private scalar.
    pub fn private_key(&self) -> Result<PrivateKey, KeyError> {
        PrivateKey::from_hex(&self.0)
    }

    pub fn public_key(&self) -> Result<PublicKey, KeyError> {
        self.private_key()?.public_key()
    }

    pub fn player_id(&self) -> Result<PlayerId, KeyError> {
        derive_id(self)
    }
}

impl fmt::Debug for ProcessingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProcessingKey(<redacted>)")
    }
}

impl FromStr for ProcessingKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = Self::new(s.trim());
        key.private_key()?;
        Ok(key)
    }
}

/// Derives the player id for `key`.
pub fn derive_id(key: &ProcessingKey) -> Result<PlayerId, KeyError> {
    Ok(key.public_key()?.player_id())
}

/// Private scalar parsed from a processing key, reduced modulo the order
/// of the base point.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PrivateKey(Scalar);

impl PrivateKey {
    /// Parses a hex string (optional `0x` prefix, odd length allowed),
    /// reducing the value modulo the base point's subgroup order.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let digits = s.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        if digits.is_empty() {
            return Err(KeyError::Empty);
        }
        let padded =
            if digits.len() % 2 == 1 { format!("0{digits}") } else { digits.to_string() };
        let bytes = hex::decode(&padded).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Ok(Self(Scalar::from_be_bytes_mod_order(&bytes)))
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn public_key(&self) -> Result<PublicKey, KeyError> {
        Point::base().mul(&self.0).map(PublicKey).ok_or(KeyError::Degenerate)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Public curve point of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(Point);

impl PublicKey {
    pub fn point(&self) -> &Point {
        &self.0
    }

    /// x coordinate as little-endian hex, the form the rollup indexes accounts by.
    pub fn pkx_le_hex(&self) -> String {
        curve::to_le_hex(&self.0.x)
    }

    pub fn pky_le_hex(&self) -> String {
        curve::to_le_hex(&self.0.y)
    }

    /// Little-endian `u64` limbs of the x coordinate.
    pub fn x_words(&self) -> [u64; 4] {
        curve::to_u64_words(&self.0.x)
    }

    pub fn player_id(&self) -> PlayerId {
        let words = self.x_words();
        PlayerId { hi: words[1], lo: words[2] }
    }
}

/// Two-word account identifier shared with the settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId {
    pub hi: u64,
    pub lo: u64,
}

impl PlayerId {
    pub const fn new(hi: u64, lo: u64) -> Self {
        Self { hi, lo }
    }

    pub const fn words(&self) -> [u64; 2] {
        [self.hi, self.lo]
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.hi, self.lo)
    }
}

/// Errors raised while interpreting a processing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    Empty,
    InvalidHex(String),
    /// Scalar multiplication hit a vanishing denominator.
    Degenerate,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "processing key is empty"),
            Self::InvalidHex(e) => write!(f, "processing key is not valid hex: {e}"),
            Self::Degenerate => write!(f, "processing key yields a degenerate public key"),
        }
    }
}

impl std::error::Error for KeyError {}
