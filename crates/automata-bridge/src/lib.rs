//! Automata bridge: client-side command dispatch for a zkWasm mini-rollup
//! account, plus a listener that credits L1 `TopUp` deposits into the rollup.

pub mod bindings;
pub mod bridge;
pub mod command;
pub mod curve;
pub mod demo;
pub mod identity;
pub mod modifier;
pub mod service;
pub mod session;
pub mod signature;
pub mod transport;

pub use command::{Command, Opcode};
pub use identity::{PlayerId, ProcessingKey, derive_id};
pub use modifier::{ModifierSet, encode_modifiers};
pub use session::{AccountSession, Operation};
pub use transport::{HttpRollupRpc, RollupRpc, RpcError};
