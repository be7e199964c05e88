//! Deposit bridge: forwards settlement-contract `TopUp` events into the
//! rollup as admin `deposit` commands.
//!
//! The bridge polls a [`DepositSource`] for new blocks, converts each event's
//! wei amount to whole tokens, drops events below one token, and credits the
//! rest through the admin [`AccountSession`]. Events are handled one at a
//! time, in log order, instead of one task per event: every deposit is
//! signed by the same admin key, so concurrent dispatch would race on its
//! nonce. A failed dispatch is logged and the next event still runs.

mod cursor;
mod source;

pub use cursor::CursorStore;
pub use source::{ContractDeposits, DepositSource};

use std::{fmt, time::Duration};

use alloy::primitives::{Address, B256, U256};
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    identity::PlayerId,
    service::Service,
    session::AccountSession,
    transport::RollupRpc,
};

/// Wei per whole token (`10^18`).
pub const WEI_PER_TOKEN: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// One decoded `TopUp` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub l1_token: Address,
    pub l1_address: Address,
    pub id_word_hi: U256,
    pub id_word_lo: U256,
    pub amount_wei: U256,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
}

impl DepositEvent {
    /// Recipient and whole-token amount, or the reason the event is dropped.
    pub fn to_deposit(&self) -> Result<(PlayerId, u64), DepositRejection> {
        let hi = u64::try_from(self.id_word_hi)
            .map_err(|_| DepositRejection::PlayerIdOverflow(self.id_word_hi))?;
        let lo = u64::try_from(self.id_word_lo)
            .map_err(|_| DepositRejection::PlayerIdOverflow(self.id_word_lo))?;
        let amount = to_token_units(self.amount_wei)?;
        Ok((PlayerId::new(hi, lo), amount))
    }
}

/// Converts wei to whole tokens, rounding down.
///
/// Anything under one token is rejected, as is anything too large for a
/// single `deposit` parameter.
pub fn to_token_units(amount_wei: U256) -> Result<u64, DepositRejection> {
    let tokens = amount_wei / WEI_PER_TOKEN;
    if tokens.is_zero() {
        return Err(DepositRejection::BelowMinimum(amount_wei));
    }
    u64::try_from(tokens).map_err(|_| DepositRejection::AmountOverflow(amount_wei))
}

/// Why a deposit event was dropped without being forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositRejection {
    /// Less than one whole token
    BelowMinimum(U256),
    /// Token amount does not fit in a `u64`
    AmountOverflow(U256),
    /// A player id word does not fit in a `u64`
    PlayerIdOverflow(U256),
}

impl fmt::Display for DepositRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowMinimum(wei) => write!(f, "deposit of {wei} wei is below one token"),
            Self::AmountOverflow(wei) => write!(f, "deposit of {wei} wei overflows u64 tokens"),
            Self::PlayerIdOverflow(word) => write!(f, "player id word {word} overflows u64"),
        }
    }
}

impl std::error::Error for DepositRejection {}

/// Tuning for the bridge polling loop.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub poll_interval: Duration,
    /// Upper bound on blocks covered by a single `eth_getLogs` call.
    pub max_block_range: u64,
    /// First block to scan when no cursor has been saved. Defaults to the
    /// block after the current tip.
    pub start_block: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(5), max_block_range: 1000, start_block: None }
    }
}

/// The deposit bridge service.
pub struct DepositBridge<T, S> {
    admin: AccountSession<T>,
    source: S,
    config: BridgeConfig,
    cursor: Option<CursorStore>,
}

impl<T, S> fmt::Debug for DepositBridge<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepositBridge")
            .field("admin", &self.admin)
            .field("config", &self.config)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<T: RollupRpc + 'static, S: DepositSource + 'static> DepositBridge<T, S> {
    pub const fn new(admin: AccountSession<T>, source: S, config: BridgeConfig) -> Self {
        Self { admin, source, config, cursor: None }
    }

    pub fn with_cursor(mut self, cursor: CursorStore) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Forwards one event. Policy rejections are logged and returned;
    /// dispatch failures are logged by the session and yield `Ok(None)`.
    pub async fn handle_event(
        &self,
        event: &DepositEvent,
    ) -> Result<Option<Value>, DepositRejection> {
        let (player, amount) = match event.to_deposit() {
            Ok(deposit) => deposit,
            Err(reason) => {
                warn!(
                    block = ?event.block_number,
                    tx = ?event.tx_hash,
                    account = %event.l1_address,
                    reason = %reason,
                    "dropping deposit"
                );
                return Err(reason);
            }
        };

        info!(
            block = ?event.block_number,
            tx = ?event.tx_hash,
            player = %player,
            amount,
            "forwarding deposit"
        );
        Ok(self.admin.deposit(player, amount).await)
    }

    /// Block to resume from: saved cursor, then configured start block,
    /// then `None` (wait for the tip).
    async fn resume_block(&self) -> Option<u64> {
        if let Some(store) = &self.cursor {
            match store.load().await {
                Ok(Some(next)) => {
                    info!(
                        next_block = next,
                        path = %store.path().display(),
                        "resuming from cursor"
                    );
                    return Some(next);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ignoring unreadable cursor"),
            }
        }
        self.config.start_block
    }

    /// Scans and handles every block from `from` up to the current tip,
    /// returning the next block to scan. Events are awaited in sequence so
    /// each deposit reads the admin nonce left by the previous one.
    async fn drain(&self, mut from: u64, cancel: &CancellationToken) -> u64 {
        let range = self.config.max_block_range.max(1);

        while !cancel.is_cancelled() {
            let tip = match self.source.latest_block().await {
                Ok(tip) => tip,
                Err(e) => {
                    warn!(error = %e, "failed to get latest block number");
                    break;
                }
            };
            if from > tip {
                break;
            }

            let to = tip.min(from.saturating_add(range - 1));
            let events = match self.source.deposits(from, to).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(from, to, error = %e, "failed to fetch deposit logs");
                    break;
                }
            };
            info!(from, to, events = events.len(), "scanned block range");

            for event in &events {
                let _ = self.handle_event(event).await;
            }

            from = to + 1;
            if let Some(store) = &self.cursor {
                if let Err(e) = store.save(from).await {
                    error!(next_block = from, error = %e, "failed to persist cursor");
                }
            }
        }
        from
    }

    /// Run the polling loop until the cancellation token fires.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut next_block = self.resume_block().await;
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("deposit bridge shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let from = match next_block {
                        Some(n) => n,
                        None => match self.source.latest_block().await {
                            Ok(tip) => tip + 1,
                            Err(e) => {
                                warn!(error = %e, "failed to get latest block number");
                                continue;
                            }
                        },
                    };
                    next_block = Some(self.drain(from, &cancel).await);
                }
            }
        }
    }
}

impl<T: RollupRpc + 'static, S: DepositSource + 'static> Service for DepositBridge<T, S> {
    fn name(&self) -> &str {
        "deposit-bridge"
    }

    fn spawn(self: Box<Self>, set: &mut JoinSet<()>, cancel: CancellationToken) {
        set.spawn(async move {
            info!(player = ?self.admin.player_id(), "starting deposit bridge");
            if let Err(e) = self.run(cancel).await {
                error!(error = %e, "deposit bridge stopped with error");
            } else {
                info!("deposit bridge stopped gracefully");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        command::{Command, Opcode},
        identity::ProcessingKey,
        session::tests::MockRpc,
    };

    fn tokens(n: u64) -> U256 {
        U256::from(n) * WEI_PER_TOKEN
    }

    fn event(hi: u64, lo: u64, amount_wei: U256, block: u64) -> DepositEvent {
        DepositEvent {
            l1_token: Address::ZERO,
            l1_address: Address::ZERO,
            id_word_hi: U256::from(hi),
            id_word_lo: U256::from(lo),
            amount_wei,
            block_number: Some(block),
            tx_hash: None,
        }
    }

    /// Serves a fixed set of events; the tip can be moved by the test.
    #[derive(Default)]
    struct MockSource {
        tip: AtomicU64,
        events: Vec<DepositEvent>,
        queries: Mutex<Vec<(u64, u64)>>,
    }

    #[async_trait]
    impl DepositSource for MockSource {
        async fn latest_block(&self) -> anyhow::Result<u64> {
            Ok(self.tip.load(Ordering::SeqCst))
        }

        async fn deposits(&self, from: u64, to: u64) -> anyhow::Result<Vec<DepositEvent>> {
            self.queries.lock().unwrap().push((from, to));
            Ok(self
                .events
                .iter()
                .filter(|e| e.block_number.is_some_and(|b| (from..=to).contains(&b)))
                .cloned()
                .collect())
        }
    }

    fn bridge(
        rpc: MockRpc,
        source: MockSource,
        config: BridgeConfig,
    ) -> (DepositBridge<MockRpc, Arc<MockSource>>, Arc<MockRpc>, Arc<MockSource>) {
        let rpc = Arc::new(rpc);
        let source = Arc::new(source);
        let admin = AccountSession::new(Arc::clone(&rpc), ProcessingKey::new("1"));
        (DepositBridge::new(admin, Arc::clone(&source), config), rpc, source)
    }

    #[test]
    fn conversion_floors() {
        assert_eq!(to_token_units(tokens(10)).unwrap(), 10);
        assert_eq!(to_token_units(tokens(1) + tokens(1) - U256::from(1u64)).unwrap(), 1);
        assert_eq!(to_token_units(WEI_PER_TOKEN).unwrap(), 1);
    }

    #[test]
    fn below_one_token_is_rejected() {
        let half = WEI_PER_TOKEN / U256::from(2u64);
        assert_eq!(to_token_units(half), Err(DepositRejection::BelowMinimum(half)));
        assert!(to_token_units(U256::ZERO).is_err());

        let just_under = WEI_PER_TOKEN - U256::from(1u64);
        assert_eq!(to_token_units(just_under), Err(DepositRejection::BelowMinimum(just_under)));
        assert_eq!(to_token_units(just_under + U256::from(1u64)), Ok(1));
    }

    #[test]
    fn oversized_values_are_rejected() {
        let huge = tokens(u64::MAX) + WEI_PER_TOKEN;
        assert_eq!(to_token_units(huge), Err(DepositRejection::AmountOverflow(huge)));

        let mut ev = event(1, 2, tokens(1), 0);
        ev.id_word_lo = U256::from(u64::MAX) + U256::from(1u64);
        assert!(matches!(ev.to_deposit(), Err(DepositRejection::PlayerIdOverflow(_))));
    }

    #[tokio::test]
    async fn ten_tokens_forwarded_as_deposit() {
        let (bridge, rpc, _) =
            bridge(MockRpc::default(), MockSource::default(), BridgeConfig::default());

        let result = bridge.handle_event(&event(11, 22, tokens(10), 1)).await.unwrap();
        assert!(result.is_some());
        assert_eq!(rpc.sent(), vec![Command::build(0, Opcode::Deposit, [11, 22, 10])]);
    }

    #[tokio::test]
    async fn half_token_is_dropped() {
        let (bridge, rpc, _) =
            bridge(MockRpc::default(), MockSource::default(), BridgeConfig::default());

        let half = WEI_PER_TOKEN / U256::from(2u64);
        let err = bridge.handle_event(&event(11, 22, half, 1)).await.unwrap_err();
        assert_eq!(err, DepositRejection::BelowMinimum(half));
        assert!(rpc.sent().is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_stop_the_loop() {
        let source = MockSource {
            tip: AtomicU64::new(5),
            events: vec![event(1, 1, tokens(2), 1), event(2, 2, tokens(3), 4)],
            ..Default::default()
        };
        let config = BridgeConfig {
            poll_interval: Duration::from_millis(10),
            max_block_range: 2,
            start_block: Some(0),
        };
        let (bridge, rpc, source) =
            bridge(MockRpc { fail_send: true, ..Default::default() }, source, config);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(bridge.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let params: Vec<Vec<u64>> = rpc.sent().into_iter().map(|c| c.params).collect();
        assert_eq!(params, vec![vec![1, 1, 2], vec![2, 2, 3]]);
        assert_eq!(source.queries.lock().unwrap()[..3], [(0, 1), (2, 3), (4, 5)]);
    }

    #[tokio::test]
    async fn cursor_advances_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("cursor.json"));
        store.save(3).await.unwrap();

        let source = MockSource {
            tip: AtomicU64::new(6),
            events: vec![event(1, 1, tokens(1), 2), event(7, 8, tokens(4), 5)],
            ..Default::default()
        };
        let config = BridgeConfig {
            poll_interval: Duration::from_millis(10),
            max_block_range: 100,
            start_block: Some(0),
        };
        let (bridge, rpc, source) = bridge(MockRpc::default(), source, config);
        let bridge = bridge.with_cursor(store.clone());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(bridge.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Block 2 is behind the saved cursor and must not be replayed.
        assert_eq!(rpc.sent(), vec![Command::build(0, Opcode::Deposit, [7, 8, 4])]);
        assert_eq!(store.load().await.unwrap(), Some(7));

        // New blocks are picked up on the next tick.
        source.tip.store(9, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(store.load().await.unwrap(), Some(10));
        assert_eq!(source.queries.lock().unwrap()[..2], [(3, 6), (7, 9)]);
    }

    #[tokio::test]
    async fn starts_after_tip_without_cursor() {
        let source = MockSource {
            tip: AtomicU64::new(50),
            events: vec![event(1, 1, tokens(1), 50)],
            ..Default::default()
        };
        let config =
            BridgeConfig { poll_interval: Duration::from_millis(10), ..Default::default() };
        let (bridge, rpc, source) = bridge(MockRpc::default(), source, config);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(bridge.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.tip.store(51, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(rpc.sent().is_empty());
        assert_eq!(source.queries.lock().unwrap().first(), Some(&(51, 51)));
    }

    #[tokio::test]
    async fn bridge_cancellation() {
        let (bridge, _, _) =
            bridge(MockRpc::default(), MockSource::default(), BridgeConfig::default());
        let cancel = CancellationToken::new();
        let mut set = JoinSet::new();
        Box::new(bridge).spawn(&mut set, cancel.clone());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), set.join_next()).await;
        assert!(matches!(result, Ok(Some(Ok(())))), "bridge did not stop");
    }
}
