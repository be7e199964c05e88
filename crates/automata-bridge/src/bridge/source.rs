//! Where deposit events come from.

use alloy::{
    primitives::Address,
    providers::Provider,
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use async_trait::async_trait;
use tracing::warn;

use super::DepositEvent;
use crate::bindings::Settlement::TopUp;

/// A queryable stream of `TopUp` events, addressed by block number.
#[async_trait]
pub trait DepositSource: Send + Sync {
    /// Current chain tip.
    async fn latest_block(&self) -> anyhow::Result<u64>;

    /// All deposits emitted in `from..=to`, in log order.
    async fn deposits(&self, from: u64, to: u64) -> anyhow::Result<Vec<DepositEvent>>;
}

#[async_trait]
impl<S: DepositSource + ?Sized> DepositSource for std::sync::Arc<S> {
    async fn latest_block(&self) -> anyhow::Result<u64> {
        (**self).latest_block().await
    }

    async fn deposits(&self, from: u64, to: u64) -> anyhow::Result<Vec<DepositEvent>> {
        (**self).deposits(from, to).await
    }
}

/// Reads `TopUp` logs of the settlement contract through `eth_getLogs`.
pub struct ContractDeposits<P> {
    provider: P,
    address: Address,
}

impl<P> std::fmt::Debug for ContractDeposits<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractDeposits").field("address", &self.address).finish()
    }
}

impl<P> ContractDeposits<P> {
    pub const fn new(provider: P, address: Address) -> Self {
        Self { provider, address }
    }
}

fn decode(log: &Log) -> Option<DepositEvent> {
    match log.log_decode::<TopUp>() {
        Ok(decoded) => {
            let ev = decoded.inner.data;
            Some(DepositEvent {
                l1_token: ev.l1token,
                l1_address: ev.account,
                id_word_hi: ev.pid_1,
                id_word_lo: ev.pid_2,
                amount_wei: ev.amount,
                block_number: log.block_number,
                tx_hash: log.transaction_hash,
            })
        }
        Err(e) => {
            warn!(
                block = ?log.block_number,
                tx = ?log.transaction_hash,
                error = %e,
                "skipping undecodable TopUp log"
            );
            None
        }
    }
}

#[async_trait]
impl<P: Provider + Send + Sync + 'static> DepositSource for ContractDeposits<P> {
    async fn latest_block(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn deposits(&self, from: u64, to: u64) -> anyhow::Result<Vec<DepositEvent>> {
        let filter = Filter::new()
            .address(self.address)
            .event_signature(TopUp::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);

        let logs = self.provider.get_logs(&filter).await?;
        Ok(logs.iter().filter_map(decode).collect())
    }
}
