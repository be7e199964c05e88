//! Twisted Edwards curve used by the rollup for account keys.
//!
//! `-x² + y² = 1 + d·x²·y²` over the BN254 scalar field. `d` is a
//! non-square and `-1` is a square, so the addition law is complete.

use ark_bn254::Fr;
use ark_ff::{BigInteger, Field, MontFp, One, PrimeField, Zero};

/// Curve coefficient `d`.
pub(crate) const D: Fr =
    MontFp!("12181644023421730124874158521699555681764249180949974110617291017600649128846");

const BASE_X: Fr =
    MontFp!("21237458262955047976410108958495203094252581401952870797780751629344472264183");
const BASE_Y: Fr =
    MontFp!("2544379904535866821506503524998632645451772693132171985463128613946158519479");

/// An affine curve point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: Fr,
    pub y: Fr,
}

impl Point {
    /// The neutral element `(0, 1)`.
    pub fn identity() -> Self {
        Self { x: Fr::zero(), y: Fr::one() }
    }

    /// The generator all public keys are derived from.
    pub const fn base() -> Self {
        Self { x: BASE_X, y: BASE_Y }
    }

    pub fn is_on_curve(&self) -> bool {
        let xx = self.x.square();
        let yy = self.y.square();
        yy - xx == Fr::one() + D * xx * yy
    }

    /// Edwards addition. Returns `None` only if a denominator vanishes,
    /// which cannot happen for points on the curve.
    pub fn add(&self, other: &Self) -> Option<Self> {
        let t = D * self.x * other.x * self.y * other.y;
        let x = (self.x * other.y + self.y * other.x) * (Fr::one() + t).inverse()?;
        let y = (self.y * other.y + self.x * other.x) * (Fr::one() - t).inverse()?;
        Some(Self { x, y })
    }

    /// Double-and-add, most significant bit first. Accepts elements of
    /// either the base field or the subgroup scalar field.
    pub fn mul<S: PrimeField>(&self, scalar: &S) -> Option<Self> {
        let mut acc = Self::identity();
        for bit in scalar.into_bigint().to_bits_be() {
            acc = acc.add(&acc)?;
            if bit {
                acc = acc.add(self)?;
            }
        }
        Some(acc)
    }
}

/// Little-endian byte encoding of a field element (32 bytes).
pub(crate) fn to_le_bytes<F: PrimeField>(value: &F) -> Vec<u8> {
    value.into_bigint().to_bytes_le()
}

/// Little-endian hex encoding of a field element (64 hex characters).
pub(crate) fn to_le_hex<F: PrimeField>(value: &F) -> String {
    hex::encode(to_le_bytes(value))
}

/// Little-endian `u64` limbs of a field element.
pub(crate) fn to_u64_words(value: &Fr) -> [u64; 4] {
    let bytes = to_le_bytes(value);
    let mut words = [0u64; 4];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *word = u64::from_le_bytes(buf);
    }
    words
}
