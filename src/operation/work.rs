use crate::operation::Operation;
use async_trait::async_trait;

/// Work function of an operation.
///
/// Replaces subclass-overridden `main` with a supplied behavior: the operation
/// itself is a sealed state machine, the work is what it runs once the
/// scheduler drives it to `Executing`.
///
/// Contract: `main` must call [`Operation::finish`] exactly once on every code
/// path after writing the output, including failure paths. The framework does
/// not finish on the work's behalf. Long-running work should race the
/// operation's cancellation (see [`Operation::cancellation`]) instead of
/// blocking the worker.
#[async_trait]
pub trait Work<In, Out>: Send + Sync {
    /// Work name, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Performs the operation's transformation.
    async fn main(&self, op: &Operation<In, Out>);
}
