pub mod operation;
pub mod queue;
pub mod state;
pub mod work;

pub use operation::Operation;
pub use queue::OperationQueue;
pub use state::OperationState;
pub use work::Work;
