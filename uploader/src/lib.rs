//! Publishes videos stored in S3 to YouTube through the resumable upload protocol.
//!
//! An invocation names an object in the source bucket plus the video's metadata. The object is
//! streamed to YouTube in fixed-size chunks, a companion thumbnail is attached when one exists,
//! and an optional webhook is told how it went. See [`pipeline::Pipeline`] for the flow.

pub mod config;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;
pub mod oauth;
pub mod pipeline;
pub mod secrets;
pub mod storage;
pub mod token;
pub mod upload;
pub mod webhook;
pub mod youtube_api;

pub use config::Config;
pub use error::{ErrorKind, PipelineError};
pub use model::{InvocationReport, InvocationResponse, UploadRequest, UploadResult};
pub use pipeline::Pipeline;
