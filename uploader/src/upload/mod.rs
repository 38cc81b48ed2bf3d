//! Chunked, resumable transfer of one object to the video platform.

mod engine;
mod session;

pub use engine::{DEFAULT_CONTENT_TYPE, UploadEngine};
pub use session::{SessionError, SessionStatus, UploadSession};
