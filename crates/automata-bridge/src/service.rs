//! Long-running services.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A self-contained service that can be spawned onto a [`JoinSet`].
///
/// The binary spawns every service the same way and cancels them together
/// on shutdown.
pub trait Service: Send {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Spawn this service as one or more tasks on the given [`JoinSet`].
    fn spawn(self: Box<Self>, set: &mut JoinSet<()>, cancel: CancellationToken);
}
