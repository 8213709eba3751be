// Core unit of work
pub use crate::operation::{Operation, OperationQueue, OperationState, Work};

// Errors
pub use crate::errors::{
    BoxError, DecodeError, Error, ErrorKind, MultipartError, MultipartSegment, NetworkError,
    OperationError, RequestError, Result,
};

// Network units
pub use crate::network::{
    ApiRequest, BackgroundHttpSession, HttpMethod, HttpRequest, HttpSession, MultipartData,
    MultipartNetworkOperation, NetworkConfig, NetworkOperation, RequestConvertible, Session,
    TransportResponse, UploadEvent, UploadSession,
};

// Decode unit
pub use crate::decode::DecodeOperation;

pub mod operation {
    pub use crate::operation::Operation;
    pub use crate::operation::OperationQueue;
    pub use crate::operation::OperationState;
    pub use crate::operation::Work;
}
pub mod network {
    pub use crate::network::ApiRequest;
    pub use crate::network::HttpMethod;
    pub use crate::network::HttpRequest;
    pub use crate::network::HttpSession;
    pub use crate::network::MultipartData;
    pub use crate::network::MultipartNetworkOperation;
    pub use crate::network::NetworkConfig;
    pub use crate::network::NetworkOperation;
    pub use crate::network::RequestConvertible;
}
