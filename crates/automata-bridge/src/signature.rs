//! Signed command envelope accepted by the rollup's `/send` endpoint.

use ark_bn254::Fr;
use ark_ff::{PrimeField, Zero};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    command::Command,
    curve::{self, Point},
    identity::{KeyError, ProcessingKey},
};

/// Scalars modulo the order of the base point's subgroup.
type Scalar = ark_ed_on_bn254::Fr;

/// Command bytes plus public key and signature, all little-endian hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedCommand {
    pub msg: String,
    pub pkx: String,
    pub pky: String,
    pub sigx: String,
    pub sigy: String,
    pub sigr: String,
}

/// Folds the command words into one field element: `Σ wᵢ · 2^(64·i)`.
pub(crate) fn message_hash(words: &[u64]) -> Fr {
    let shift = Fr::from(u128::from(u64::MAX)) + Fr::from(1u64);
    let mut factor = Fr::from(1u64);
    let mut acc = Fr::zero();
    for &word in words {
        acc += Fr::from(word) * factor;
        factor *= shift;
    }
    acc
}

fn to_scalar(value: &Fr) -> Scalar {
    Scalar::from_le_bytes_mod_order(&curve::to_le_bytes(value))
}

/// Signs `command` with `key`: `R = r·G`, `s = r + h·sk`.
///
/// `r` is derived from the key and the message, so signing the same
/// command twice yields the same envelope.
pub fn sign(command: &Command, key: &ProcessingKey) -> Result<SignedCommand, KeyError> {
    let sk = key.private_key()?;
    let pk = sk.public_key()?;
    let msg = command.to_bytes();

    let mut hasher = Sha256::new();
    hasher.update(key.expose_secret().as_bytes());
    hasher.update(&msg);
    let r = Scalar::from_le_bytes_mod_order(&hasher.finalize());

    let big_r = Point::base().mul(&r).ok_or(KeyError::Degenerate)?;
    let h = to_scalar(&message_hash(&command.to_words()));
    let s = r + *sk.scalar() * h;

    Ok(SignedCommand {
        msg: hex::encode(&msg),
        pkx: pk.pkx_le_hex(),
        pky: pk.pky_le_hex(),
        sigx: curve::to_le_hex(&big_r.x),
        sigy: curve::to_le_hex(&big_r.y),
        sigr: curve::to_le_hex(&s),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Opcode;

    fn field_from_hex(hex_str: &str) -> Fr {
        Fr::from_le_bytes_mod_order(&hex::decode(hex_str).unwrap())
    }

    #[test]
    fn hash_of_single_word_is_the_word() {
        assert_eq!(message_hash(&[42]), Fr::from(42u64));
        assert_eq!(message_hash(&[]), Fr::zero());
    }

    #[test]
    fn hash_places_words_by_limb() {
        let expected = Fr::from(7u64) + Fr::from(1u128 << 64) * Fr::from(3u64);
        assert_eq!(message_hash(&[7, 3]), expected);
    }

    #[test]
    fn signature_verifies() {
        let key = ProcessingKey::new("1234");
        let cmd = Command::build(5, Opcode::InstallObject, [0, 4]);
        let signed = sign(&cmd, &key).unwrap();

        // s·G == R + h·P
        let pk = key.public_key().unwrap();
        let h = message_hash(&cmd.to_words());
        let s = Scalar::from_le_bytes_mod_order(&hex::decode(&signed.sigr).unwrap());
        let big_r = Point { x: field_from_hex(&signed.sigx), y: field_from_hex(&signed.sigy) };
        assert!(big_r.is_on_curve());

        let lhs = Point::base().mul(&s).unwrap();
        let rhs = big_r.add(&pk.point().mul(&h).unwrap()).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn signature_verifies_for_key_above_field_modulus() {
        let key = ProcessingKey::new(
            "30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000002",
        );
        let cmd = Command::build(3, Opcode::Withdraw, [1, 2, 3]);
        let signed = sign(&cmd, &key).unwrap();

        let pk = key.public_key().unwrap();
        let h = message_hash(&cmd.to_words());
        let s = Scalar::from_le_bytes_mod_order(&hex::decode(&signed.sigr).unwrap());
        let big_r = Point { x: field_from_hex(&signed.sigx), y: field_from_hex(&signed.sigy) };

        let lhs = Point::base().mul(&s).unwrap();
        let rhs = big_r.add(&pk.point().mul(&h).unwrap()).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn envelope_fields() {
        let key = ProcessingKey::new("1234");
        let cmd = Command::build(0, Opcode::InstallPlayer, Vec::new());
        let signed = sign(&cmd, &key).unwrap();
        assert_eq!(signed.msg, "0101000000000000");
        assert_eq!(signed.pkx, key.public_key().unwrap().pkx_le_hex());
        assert_eq!(signed.sigr.len(), 64);
        assert_eq!(sign(&cmd, &key).unwrap(), signed);
    }

    #[test]
    fn different_commands_get_different_nonce_points() {
        let key = ProcessingKey::new("1234");
        let a = sign(&Command::build(1, Opcode::InstallCard, Vec::new()), &key).unwrap();
        let b = sign(&Command::build(2, Opcode::InstallCard, Vec::new()), &key).unwrap();
        assert_ne!(a.sigx, b.sigx);
    }
}
