//! Minimal HTTP/1.1 surface
//!
//! One request line in, one `200`/`404` response out.

mod mime;
mod request;
mod response;

pub use mime::{
    ContentClass, ContentKind, MimeTable, DEFAULT_CONTENT_TYPE, DEFAULT_IMAGE_EXTENSIONS,
};
pub use request::{normalize_target, Request, DEFAULT_INDEX, REQUEST_BUFFER_SIZE};
pub use response::{Response, Status, NOT_FOUND_BODY};
