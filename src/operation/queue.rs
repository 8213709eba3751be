use crate::operation::Operation;
use log::debug;
use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Minimal dependency-respecting dispatcher.
///
/// Each added operation is spawned onto the tokio runtime, waits for its
/// declared dependencies to finish, then is started. This is not a general
/// thread pool: it exists so pipelines built with `then` can be driven the way
/// the operation contracts expect an external scheduler to drive them.
/// Cancelled operations are still started so they resolve to `Finished`.
pub struct OperationQueue {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl OperationQueue {
    pub fn new() -> Self {
        OperationQueue {
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Enqueues an operation. It starts as soon as every dependency has
    /// reached `Finished`.
    pub fn add<In, Out>(&self, op: Operation<In, Out>)
    where
        In: Send + Sync + 'static,
        Out: Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            op.wait_for_dependencies().await;
            debug!("operation {} dependencies settled, starting", op.name());
            op.start().await;
        });
        self.handles.lock().unwrap().push(handle);
    }

    /// Awaits every enqueued operation, including ones added while waiting.
    pub async fn wait(&self) {
        loop {
            let handle = { self.handles.lock().unwrap().pop() };
            match handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => break,
            }
        }
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}
