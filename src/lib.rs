//! opflow: composable, cancellable units of work over tokio.
//!
//! An [`operation::Operation`] wraps an async job with typed input and
//! output slots, a watchable lifecycle, and `then`-chaining that feeds each
//! result (success or failure) into the next unit. Built-in units cover
//! HTTP fetching, multipart uploads, and JSON decoding.

pub mod prelude;

#[path = "decode/lib.rs"]
pub mod decode;
#[path = "errors/lib.rs"]
pub mod errors;
#[path = "network/lib.rs"]
pub mod network;
#[path = "operation/lib.rs"]
pub mod operation;
#[path = "utils/lib.rs"]
pub mod utils;
