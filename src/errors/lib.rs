pub mod error;

pub use error::{
    BoxError, DecodeError, Error, ErrorKind, MultipartError, MultipartSegment, NetworkError,
    OperationError, RequestError, Result,
};
