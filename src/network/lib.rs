pub mod config;
pub mod constants;
pub mod multipart;
pub mod operation;
pub mod request;
pub mod session;

pub use config::NetworkConfig;
pub use multipart::{MultipartData, MultipartNetworkOperation};
pub use operation::NetworkOperation;
pub use request::{ApiRequest, HttpMethod, HttpRequest, RequestConvertible};
pub use session::{
    BackgroundHttpSession, HttpSession, Session, TransportResponse, UploadEvent, UploadSession,
};
