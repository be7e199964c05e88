//! Account session: one processing key bound to one rollup transport.
//!
//! Every mutating call fetches the account nonce, builds a fresh command,
//! and hands it to the transport. The best-effort wrappers log failures with
//! the operation context and resolve to `None`; [`AccountSession::submit`]
//! returns the error instead.

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, ensure};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    command::{Command, MAX_NONCE, Opcode},
    identity::{PlayerId, ProcessingKey},
    modifier::ModifierSet,
    transport::{RollupRpc, RpcError},
};

/// A mutating account operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    InstallPlayer,
    InstallObject { object_id: u64, modifiers: ModifierSet },
    RestartObject { object_id: u64, modifiers: ModifierSet },
    UpgradeObject { object_id: u64, feature: u64 },
    InstallCard,
    Withdraw { address: Address, amount: u32 },
    Deposit { player: PlayerId, amount: u64 },
    Bounty { resource_index: u64 },
}

impl Operation {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::InstallPlayer => Opcode::InstallPlayer,
            Self::InstallObject { .. } => Opcode::InstallObject,
            Self::RestartObject { .. } => Opcode::RestartObject,
            Self::UpgradeObject { .. } => Opcode::UpgradeObject,
            Self::InstallCard => Opcode::InstallCard,
            Self::Withdraw { .. } => Opcode::Withdraw,
            Self::Deposit { .. } => Opcode::Deposit,
            Self::Bounty { .. } => Opcode::Bounty,
        }
    }

    pub fn params(&self) -> Vec<u64> {
        match self {
            Self::InstallPlayer | Self::InstallCard => Vec::new(),
            Self::InstallObject { object_id, modifiers }
            | Self::RestartObject { object_id, modifiers } => vec![*object_id, modifiers.encode()],
            Self::UpgradeObject { object_id, feature } => vec![*object_id, *feature],
            Self::Withdraw { address, amount } => withdraw_params(address, *amount).to_vec(),
            Self::Deposit { player, amount } => vec![player.hi, player.lo, *amount],
            Self::Bounty { resource_index } => vec![*resource_index],
        }
    }

    /// Only `InstallPlayer` runs before the account exists, so it always
    /// uses nonce 0.
    pub const fn needs_nonce(&self) -> bool {
        !matches!(self, Self::InstallPlayer)
    }

    pub fn command(&self, nonce: u64) -> Command {
        Command::build(nonce, self.opcode(), self.params())
    }
}

/// Splits a 20-byte L1 address into three words, each read little-endian:
/// `[(bytes[0..4] << 32) | amount, bytes[4..12], bytes[12..20]]`.
pub fn withdraw_params(address: &Address, amount: u32) -> [u64; 3] {
    let bytes = address.as_slice();
    let le = |chunk: &[u8]| {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        u64::from_le_bytes(buf)
    };
    [(le(&bytes[0..4]) << 32) | u64::from(amount), le(&bytes[4..12]), le(&bytes[12..20])]
}

/// Operations on one rollup account.
pub struct AccountSession<T> {
    rpc: Arc<T>,
    key: ProcessingKey,
    player: Option<PlayerId>,
}

impl<T> std::fmt::Debug for AccountSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSession").field("player", &self.player).finish()
    }
}

impl<T: RollupRpc> AccountSession<T> {
    pub fn new(rpc: Arc<T>, key: ProcessingKey) -> Self {
        let player = key.player_id().ok();
        Self { rpc, key, player }
    }

    /// Player id of this account, if the key is usable.
    pub const fn player_id(&self) -> Option<PlayerId> {
        self.player
    }

    pub const fn key(&self) -> &ProcessingKey {
        &self.key
    }

    fn label(&self) -> String {
        self.player.map_or_else(|| "<invalid key>".to_string(), |p| p.to_string())
    }

    /// Runs `op`, propagating any failure.
    pub async fn submit(&self, op: Operation) -> anyhow::Result<Value> {
        let nonce = if op.needs_nonce() {
            self.rpc
                .nonce(&self.key)
                .await
                .with_context(|| format!("failed to fetch nonce for {}", op.opcode()))?
        } else {
            0
        };
        ensure!(
            nonce <= MAX_NONCE,
            "{} failed: nonce {nonce} does not fit the header",
            op.opcode()
        );

        let command = op.command(nonce);
        self.rpc
            .send_transaction(&command, &self.key)
            .await
            .with_context(|| format!("{} failed at nonce {nonce}", op.opcode()))
    }

    /// Runs `op`, logging and swallowing any failure.
    async fn best_effort(&self, op: Operation) -> Option<Value> {
        match self.submit(op.clone()).await {
            Ok(result) => {
                info!(operation = %op.opcode(), player = %self.label(), "operation processed");
                Some(result)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(
                    operation = %op.opcode(),
                    player = %self.label(),
                    params = ?op.params(),
                    error = %reason,
                    "operation failed"
                );
                None
            }
        }
    }

    pub async fn install_player(&self) -> Option<Value> {
        self.best_effort(Operation::InstallPlayer).await
    }

    pub async fn install_object(&self, object_id: u64, modifiers: &ModifierSet) -> Option<Value> {
        self.best_effort(Operation::InstallObject { object_id, modifiers: modifiers.clone() }).await
    }

    pub async fn restart_object(&self, object_id: u64, modifiers: &ModifierSet) -> Option<Value> {
        self.best_effort(Operation::RestartObject { object_id, modifiers: modifiers.clone() }).await
    }

    pub async fn upgrade_object(&self, object_id: u64, feature: u64) -> Option<Value> {
        self.best_effort(Operation::UpgradeObject { object_id, feature }).await
    }

    pub async fn install_card(&self) -> Option<Value> {
        self.best_effort(Operation::InstallCard).await
    }

    pub async fn withdraw(&self, address: Address, amount: u32) -> Option<Value> {
        self.best_effort(Operation::Withdraw { address, amount }).await
    }

    /// Credits `amount` whole tokens to `player`. Only admin keys are
    /// accepted by the rollup for this opcode.
    pub async fn deposit(&self, player: PlayerId, amount: u64) -> Option<Value> {
        self.best_effort(Operation::Deposit { player, amount }).await
    }

    pub async fn redeem_bounty(&self, resource_index: u64) -> Option<Value> {
        self.best_effort(Operation::Bounty { resource_index }).await
    }

    /// Remote account state. Errors are returned unmodified.
    pub async fn state(&self) -> Result<Value, RpcError> {
        self.rpc.state(&self.key).await
    }

    /// Global rollup configuration. Errors are returned unmodified.
    pub async fn config(&self) -> Result<Value, RpcError> {
        self.rpc.config().await
    }
}
