use std::ops::Range;

/// HTTP status codes accepted by network operations.
pub const VALID_STATUS_CODES: Range<u16> = 200..300;

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const ACCEPT_HEADER: &str = "Accept";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// RFC 7578 multipart delimiter templates.
///
/// Each line ends with `\r\n`; a part starts with `--{boundary}` and the body
/// ends with `\r\n--{boundary}--\r\n`.
pub mod multipart {
    pub fn content_type(boundary: &str) -> String {
        format!("multipart/form-data; boundary={boundary}")
    }

    pub fn boundary_header_delimiter(boundary: &str) -> String {
        format!("--{boundary}\r\n")
    }

    pub fn boundary_footer_delimiter(boundary: &str) -> String {
        format!("\r\n--{boundary}--\r\n")
    }

    pub fn content_disposition(name: &str, filename: &str) -> String {
        format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
    }

    pub fn mime_content_type(mime_type: &str) -> String {
        format!("Content-Type: {mime_type}\r\n\r\n")
    }
}
