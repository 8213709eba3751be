pub mod operation;

pub use operation::DecodeOperation;
