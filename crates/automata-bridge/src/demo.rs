//! Scripted end-to-end walk through every account operation.
//!
//! Installs a player, credits it from the admin account, then installs,
//! restarts and upgrades an object before withdrawing. Each step is
//! best-effort; the report says which ones went through.

use alloy::primitives::{Address, address};
use serde_json::Value;
use tracing::{info, warn};

use crate::{modifier::ModifierSet, session::AccountSession, transport::RollupRpc};

/// Default L1 withdrawal target.
pub const DEFAULT_WITHDRAW_ADDRESS: Address = address!("c177d1d314c8ffe1ea93ca1e147ea3be0ee3e470");

/// Parameters of the demo run.
#[derive(Debug, Clone)]
pub struct DemoPlan {
    pub object_id: u64,
    pub install_modifiers: ModifierSet,
    pub restart_modifiers: ModifierSet,
    pub feature: u64,
    /// Whole tokens credited by the admin. Skipped without an admin session.
    pub deposit: u64,
    pub withdraw_to: Address,
    pub withdraw_amount: u32,
}

impl Default for DemoPlan {
    fn default() -> Self {
        let mut restart = [0u8; 8];
        restart[7] = 4;
        Self {
            object_id: 0,
            install_modifiers: ModifierSet::try_from([0u8; 8]).unwrap_or_default(),
            restart_modifiers: ModifierSet::try_from(restart).unwrap_or_default(),
            feature: 0,
            deposit: 10,
            withdraw_to: DEFAULT_WITHDRAW_ADDRESS,
            withdraw_amount: 1,
        }
    }
}

/// Outcome of one demo step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoStep {
    pub name: &'static str,
    pub succeeded: bool,
}

fn record(steps: &mut Vec<DemoStep>, name: &'static str, result: Option<Value>) {
    match &result {
        Some(value) => info!(step = name, result = %value, "demo step done"),
        None => warn!(step = name, "demo step failed"),
    }
    steps.push(DemoStep { name, succeeded: result.is_some() });
}

/// Runs `plan` for `player`, with `admin` funding the account.
pub async fn run_demo<T: RollupRpc>(
    player: &AccountSession<T>,
    admin: Option<&AccountSession<T>>,
    plan: &DemoPlan,
) -> Vec<DemoStep> {
    let mut steps = Vec::new();

    let config = match player.config().await {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(error = %e, "failed to fetch config");
            None
        }
    };
    record(&mut steps, "config", config);

    record(&mut steps, "install_player", player.install_player().await);

    match (admin, player.player_id()) {
        (Some(admin), Some(pid)) => {
            record(&mut steps, "install_admin", admin.install_player().await);
            record(&mut steps, "deposit", admin.deposit(pid, plan.deposit).await);
        }
        _ => info!("no admin session, skipping deposit"),
    }

    record(
        &mut steps,
        "install_object",
        player.install_object(plan.object_id, &plan.install_modifiers).await,
    );
    record(&mut steps, "install_card", player.install_card().await);
    record(
        &mut steps,
        "restart_object",
        player.restart_object(plan.object_id, &plan.restart_modifiers).await,
    );
    record(
        &mut steps,
        "upgrade_object",
        player.upgrade_object(plan.object_id, plan.feature).await,
    );

    let state = match player.state().await {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "failed to query state");
            None
        }
    };
    record(&mut steps, "query_state", state);

    record(&mut steps, "withdraw", player.withdraw(plan.withdraw_to, plan.withdraw_amount).await);
    steps
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        command::Opcode,
        identity::ProcessingKey,
        session::tests::MockRpc,
    };

    #[tokio::test]
    async fn demo_issues_every_operation_in_order() {
        let rpc = Arc::new(MockRpc { nonce: 1, ..Default::default() });
        let player = AccountSession::new(Arc::clone(&rpc), ProcessingKey::new("1234"));
        let admin = AccountSession::new(Arc::clone(&rpc), ProcessingKey::new("1"));

        let steps = run_demo(&player, Some(&admin), &DemoPlan::default()).await;

        let sent = rpc.sent();
        let opcodes: Vec<Opcode> = sent.iter().map(|c| c.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::InstallPlayer,
                Opcode::InstallPlayer,
                Opcode::Deposit,
                Opcode::InstallObject,
                Opcode::InstallCard,
                Opcode::RestartObject,
                Opcode::UpgradeObject,
                Opcode::Withdraw,
            ]
        );

        assert_eq!(sent[2].params, vec![842_671_162_104_160_002, 6_593_547_414_110_829_039, 10]);
        assert_eq!(sent[5].params, vec![0, 4]);

        // The mock has no config endpoint; everything else succeeds.
        let failed: Vec<_> = steps.iter().filter(|s| !s.succeeded).map(|s| s.name).collect();
        assert_eq!(failed, vec!["config"]);
    }

    #[tokio::test]
    async fn demo_without_admin_skips_deposit() {
        let rpc = Arc::new(MockRpc::default());
        let player = AccountSession::new(Arc::clone(&rpc), ProcessingKey::new("1234"));

        let steps = run_demo(&player, None, &DemoPlan::default()).await;
        assert!(steps.iter().all(|s| s.name != "deposit"));
        assert!(rpc.sent().iter().all(|c| c.opcode != Opcode::Deposit));
    }

    #[test]
    fn default_plan_matches_script() {
        let plan = DemoPlan::default();
        assert_eq!(plan.install_modifiers.len(), 8);
        assert_eq!(plan.install_modifiers.encode(), 0);
        assert_eq!(plan.restart_modifiers.encode(), 4);
        assert_eq!(plan.deposit, 10);
    }
}
