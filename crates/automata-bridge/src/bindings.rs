//! Contract bindings via `alloy::sol!`.
//!
//! Only the events we actually consume are included.

use alloy::sol;

// ── Settlement proxy ────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface Settlement {
        event TopUp(address l1token, address account, uint256 pid_1, uint256 pid_2, uint256 amount);
    }
}
