use crate::errors::{Error, Result};
use crate::operation::state::OperationState;
use crate::operation::work::Work;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type CompletionFn = Box<dyn FnOnce() + Send>;

/// Shared state of one operation; the [`Operation`] handle is an `Arc` over it
/// so the scheduler, the work function, and a chained predecessor can all hold
/// the same unit.
struct OperationCell<In, Out> {
    /// Holds `Err(EmptyInput)` until a caller or a predecessor writes it.
    input: Mutex<Result<In>>,
    /// Holds `Err(EmptyOutput)` until the work (or cancellation) writes it.
    output: Mutex<Result<Out>>,
    /// State transitions are published through a watch channel so schedulers
    /// observe readiness changes without polling.
    state: watch::Sender<OperationState>,
    /// Completion callback; `None` is the no-op default. Replaced once by
    /// `then` to forward output into a successor's input.
    completed: Mutex<Option<CompletionFn>>,
    /// Supplied work function. `None` means the base behavior: finish
    /// immediately.
    work: Mutex<Option<Box<dyn Work<In, Out>>>>,
    /// Scheduling dependencies: state receivers of operations that must reach
    /// `Finished` before this one may start.
    dependencies: Mutex<Vec<watch::Receiver<OperationState>>>,
    name: &'static str,
}

/// A cancellable, typed unit of work.
///
/// Each operation consumes a typed input and produces a typed output, both
/// carried as [`Result`] values so that failure travels through a chain the
/// same way success does. The handle is cheap to clone; all clones refer to
/// the same unit.
pub struct Operation<In, Out> {
    cell: Arc<OperationCell<In, Out>>,
}

impl<In, Out> Clone for Operation<In, Out> {
    fn clone(&self) -> Self {
        Operation {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<In, Out> Operation<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Creates an operation driven by the given work function.
    pub fn new<W>(work: W) -> Self
    where
        W: Work<In, Out> + 'static,
    {
        let name = work.name();
        Self::build(Some(Box::new(work)), name)
    }

    /// Creates an operation with the base behavior: `start` finishes
    /// immediately without producing an output.
    pub fn inert() -> Self {
        Self::build(None, "inert")
    }

    fn build(work: Option<Box<dyn Work<In, Out>>>, name: &'static str) -> Self {
        let (state, _) = watch::channel(OperationState::Ready);
        Operation {
            cell: Arc::new(OperationCell {
                input: Mutex::new(Err(Error::empty_input())),
                output: Mutex::new(Err(Error::empty_output())),
                state,
                completed: Mutex::new(None),
                work: Mutex::new(work),
                dependencies: Mutex::new(Vec::new()),
                name,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.cell.name
    }

    // ------------------------------------------------------------------
    // Input / output accessors. The two locks are independent so input and
    // output can be mutated concurrently by different parties.
    // ------------------------------------------------------------------

    pub fn input(&self) -> Result<In>
    where
        In: Clone,
    {
        self.cell.input.lock().unwrap().clone()
    }

    pub fn set_input(&self, input: Result<In>) {
        *self.cell.input.lock().unwrap() = input;
    }

    pub fn output(&self) -> Result<Out>
    where
        Out: Clone,
    {
        self.cell.output.lock().unwrap().clone()
    }

    pub fn set_output(&self, output: Result<Out>) {
        *self.cell.output.lock().unwrap() = output;
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    pub fn state(&self) -> OperationState {
        *self.cell.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == OperationState::Ready
    }

    pub fn is_executing(&self) -> bool {
        self.state() == OperationState::Executing
    }

    pub fn is_finished(&self) -> bool {
        self.state() == OperationState::Finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == OperationState::Cancelled
    }

    /// Subscribes to state transitions. Schedulers await this receiver to
    /// learn promptly when the operation becomes ready, finished or cancelled.
    pub fn subscribe(&self) -> watch::Receiver<OperationState> {
        self.cell.state.subscribe()
    }

    /// Starts the operation. Called exactly once by the scheduler, after all
    /// declared dependencies have finished.
    ///
    /// An already-cancelled operation transitions directly to `Finished`
    /// (firing the completion callback) without running its work.
    pub async fn start(&self) {
        if !self.can_proceed() {
            return;
        }

        let work = self.cell.work.lock().unwrap().take();
        match work {
            Some(work) => {
                debug!("operation {} executing", work.name());
                work.main(self).await;
            }
            None => self.finish(),
        }
    }

    /// Invokes the completion callback, then transitions to `Finished`.
    ///
    /// Must be called exactly once per run on every code path; the callback is
    /// consumed on first invocation so a redundant post-cancel completion from
    /// a transport layer cannot fire it twice.
    pub fn finish(&self) {
        let completed = { self.cell.completed.lock().unwrap().take() };
        if let Some(completed) = completed {
            completed();
        }
        self.cell.state.send_replace(OperationState::Finished);
    }

    /// Cancels the operation.
    ///
    /// Maps the current input through the cancellation constructor: a success
    /// input becomes `Err(Cancelled)`, an already-failed input keeps its
    /// failure verbatim so cancellation never masks a pre-existing error. The
    /// terminal states are left untouched.
    pub fn cancel(&self) {
        match self.state() {
            OperationState::Cancelled | OperationState::Finished => return,
            OperationState::Ready | OperationState::Executing => {}
        }

        let output = match &*self.cell.input.lock().unwrap() {
            Ok(_) => Err(Error::cancelled()),
            Err(e) => Err(e.clone()),
        };
        *self.cell.output.lock().unwrap() = output;

        self.cell.state.send_replace(OperationState::Cancelled);
        debug!("operation {} cancelled", self.name());
    }

    /// Completes once the operation is driven to `Cancelled`; pends forever
    /// otherwise. Intended for racing against in-flight transport work.
    pub async fn cancellation(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == OperationState::Cancelled).await;
    }

    /// Awaits the operation reaching `Finished` (including the
    /// cancelled-then-finished path).
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == OperationState::Finished).await;
    }

    fn can_proceed(&self) -> bool {
        if self.is_cancelled() {
            self.finish();
            return false;
        }

        self.cell.state.send_replace(OperationState::Executing);
        true
    }

    fn set_completed(&self, completed: CompletionFn) {
        *self.cell.completed.lock().unwrap() = Some(completed);
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    /// Declares that this operation must not start before the given state
    /// receiver reports `Finished`.
    pub fn add_dependency(&self, dependency: watch::Receiver<OperationState>) {
        self.cell.dependencies.lock().unwrap().push(dependency);
    }

    /// Awaits every declared dependency at `Finished`. A dependency whose
    /// operation was dropped without ever finishing is treated as settled.
    pub async fn wait_for_dependencies(&self) {
        let mut dependencies: Vec<_> = {
            let mut guard = self.cell.dependencies.lock().unwrap();
            guard.drain(..).collect()
        };
        for rx in dependencies.iter_mut() {
            if rx
                .wait_for(|s| *s == OperationState::Finished)
                .await
                .is_err()
            {
                warn!(
                    "operation {}: dependency dropped before finishing",
                    self.name()
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Chaining
    // ------------------------------------------------------------------

    /// Wires `next` to run after this operation, with this operation's output
    /// copied into `next`'s input at the moment this one finishes.
    ///
    /// Returns `next` so chains compose: `a.then(b).then(c)` is equivalent to
    /// wiring `a -> b` and `b -> c` independently. A cancelled predecessor
    /// still fires the forwarding callback on its cancel-then-finish path, so
    /// the successor's input holds the cancellation failure rather than the
    /// `EmptyInput` sentinel.
    pub fn then<Next>(&self, next: Operation<Out, Next>) -> Operation<Out, Next>
    where
        Out: Clone,
        Next: Send + 'static,
    {
        next.add_dependency(self.subscribe());

        let predecessor = self.clone();
        let successor = next.clone();
        self.set_completed(Box::new(move || {
            successor.set_input(predecessor.output());
        }));

        next
    }

    /// Ordering-only chaining: `next` runs after this operation but its input
    /// is supplied independently.
    pub fn after<NextIn, NextOut>(&self, next: Operation<NextIn, NextOut>) -> Operation<NextIn, NextOut>
    where
        NextIn: Send + 'static,
        NextOut: Send + 'static,
    {
        next.add_dependency(self.subscribe());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DecodeError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // In -> Out passthrough that maps the input through a function.
    struct MapWork<F>(F);

    #[async_trait]
    impl<In, Out, F> Work<In, Out> for MapWork<F>
    where
        In: Clone + Send + Sync + 'static,
        Out: Send + Sync + 'static,
        F: Fn(In) -> Out + Send + Sync,
    {
        fn name(&self) -> &'static str {
            "MapWork"
        }

        async fn main(&self, op: &Operation<In, Out>) {
            let output = op.input().map(&self.0);
            op.set_output(output);
            op.finish();
        }
    }

    // Records each run into a shared counter.
    struct CountingWork {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Work<i32, i32> for CountingWork {
        fn name(&self) -> &'static str {
            "CountingWork"
        }

        async fn main(&self, op: &Operation<i32, i32>) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let output = op.input();
            op.set_output(output);
            op.finish();
        }
    }

    #[tokio::test]
    async fn fresh_operation_reads_empty_sentinels() {
        let op: Operation<i32, String> = Operation::inert();
        assert!(op.input().unwrap_err().is_empty_input());
        assert!(op.output().unwrap_err().is_empty_output());
        assert!(op.is_ready());
    }

    #[tokio::test]
    async fn inert_operation_finishes_without_output() {
        let op: Operation<i32, i32> = Operation::inert();
        op.start().await;
        assert!(op.is_finished());
        assert!(op.output().unwrap_err().is_empty_output());
    }

    #[tokio::test]
    async fn cancel_maps_success_input_to_cancelled_output() {
        let op: Operation<i32, i32> = Operation::inert();
        op.set_input(Ok(5));
        op.cancel();
        assert!(op.is_cancelled());
        assert!(op.output().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn cancel_preserves_pre_existing_input_failure() {
        let op: Operation<i32, i32> = Operation::inert();
        op.set_input(Err(DecodeError::EmptyData.into()));
        op.cancel();
        let err = op.output().unwrap_err();
        assert!(err.is_decode());
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_twice_does_not_recompute_output() {
        let op: Operation<i32, i32> = Operation::inert();
        op.set_input(Err(DecodeError::EmptyData.into()));
        op.cancel();

        // If a second cancel recomputed the output from the new input it
        // would now read back as Cancelled.
        op.set_input(Ok(9));
        op.cancel();

        assert!(op.is_cancelled());
        assert!(op.output().unwrap_err().is_decode());
    }

    #[tokio::test]
    async fn cancelled_operation_resolves_to_finished_on_start() {
        let op: Operation<i32, i32> = Operation::inert();
        op.cancel();
        op.start().await;
        assert!(op.is_finished());
    }

    #[tokio::test]
    async fn then_propagates_success_before_successor_starts() {
        let a: Operation<i32, i32> = Operation::new(MapWork(|n: i32| n * 2));
        let b: Operation<i32, String> = Operation::new(MapWork(|n: i32| format!("n={n}")));
        a.set_input(Ok(21));
        let b = a.then(b);

        a.start().await;

        // The predecessor has finished; the successor holds the value but has
        // not been started yet.
        assert!(a.is_finished());
        assert!(b.is_ready());
        assert_eq!(b.input().unwrap(), 42);

        b.start().await;
        assert_eq!(b.output().unwrap(), "n=42");
    }

    #[tokio::test]
    async fn then_after_cancel_propagates_cancelled_not_empty_input() {
        let a: Operation<i32, i32> = Operation::new(MapWork(|n: i32| n));
        let b: Operation<i32, i32> = Operation::new(MapWork(|n: i32| n));
        a.set_input(Ok(1));
        let b = a.then(b);

        a.cancel();
        // The scheduler still drives a cancelled operation through start so
        // the chain observes it as done.
        a.start().await;

        assert!(a.is_finished());
        let err = b.input().unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_empty_input());
    }

    #[tokio::test]
    async fn failure_flows_through_chain_as_data() {
        let a: Operation<i32, i32> = Operation::new(MapWork(|n: i32| n));
        let b: Operation<i32, i32> = Operation::new(MapWork(|n: i32| n + 1));
        // Input never set: a runs with the EmptyInput sentinel.
        let b = a.then(b);

        a.start().await;
        b.start().await;

        assert!(b.output().unwrap_err().is_empty_input());
    }

    #[tokio::test]
    async fn chain_runs_each_work_exactly_once() {
        let runs_a = Arc::new(AtomicUsize::new(0));
        let runs_b = Arc::new(AtomicUsize::new(0));
        let runs_c = Arc::new(AtomicUsize::new(0));

        let a = Operation::new(CountingWork { runs: runs_a.clone() });
        let b = Operation::new(CountingWork { runs: runs_b.clone() });
        let c = Operation::new(CountingWork { runs: runs_c.clone() });

        a.set_input(Ok(3));
        let b = a.then(b);
        let c = b.then(c);

        a.start().await;
        b.start().await;
        c.start().await;

        assert_eq!(runs_a.load(Ordering::SeqCst), 1);
        assert_eq!(runs_b.load(Ordering::SeqCst), 1);
        assert_eq!(runs_c.load(Ordering::SeqCst), 1);
        assert_eq!(c.output().unwrap(), 3);
    }

    #[tokio::test]
    async fn after_orders_without_propagating_data() {
        let a: Operation<i32, i32> = Operation::new(MapWork(|n: i32| n));
        let s: Operation<String, String> = Operation::new(MapWork(|v: String| v));
        a.set_input(Ok(1));
        s.set_input(Ok("independent".to_string()));
        let s = a.after(s);

        a.start().await;
        s.wait_for_dependencies().await;
        s.start().await;

        assert_eq!(s.output().unwrap(), "independent");
    }
}
