//! Rollup command construction.

use std::fmt;

/// Command opcodes understood by the rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    InstallPlayer = 1,
    InstallObject = 2,
    RestartObject = 3,
    UpgradeObject = 4,
    InstallCard = 5,
    Withdraw = 6,
    Deposit = 7,
    Bounty = 8,
}

impl Opcode {
    pub const fn code(self) -> u64 {
        self as u64
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::InstallPlayer => "install_player",
            Self::InstallObject => "install_object",
            Self::RestartObject => "restart_object",
            Self::UpgradeObject => "upgrade_object",
            Self::InstallCard => "install_card",
            Self::Withdraw => "withdraw",
            Self::Deposit => "deposit",
            Self::Bounty => "bounty",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Largest nonce the header can carry; the top 16 bits of the header word
/// hold the nonce above the length and opcode bytes.
pub const MAX_NONCE: u64 = (1 << 48) - 1;

/// A single command ready for signing and submission.
///
/// Built fresh for every call and handed straight to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub nonce: u64,
    pub opcode: Opcode,
    pub params: Vec<u64>,
}

impl Command {
    /// Assembles a command. Parameter arity is the caller's concern.
    pub fn build(nonce: u64, opcode: Opcode, params: impl Into<Vec<u64>>) -> Self {
        Self { nonce, opcode, params: params.into() }
    }

    /// Header word: `nonce << 16 | (params + 1) << 8 | opcode`.
    ///
    /// Only the low 48 bits of the nonce fit; callers check against
    /// [`MAX_NONCE`] before building.
    pub fn header(&self) -> u64 {
        let len = (self.params.len() as u64 + 1) & 0xff;
        (self.nonce << 16) | (len << 8) | self.opcode.code()
    }

    /// Header followed by the parameters, as sent on the wire.
    pub fn to_words(&self) -> Vec<u64> {
        let mut words = Vec::with_capacity(self.params.len() + 1);
        words.push(self.header());
        words.extend_from_slice(&self.params);
        words
    }

    /// Little-endian bytes of [`to_words`](Self::to_words).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_words().iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}
