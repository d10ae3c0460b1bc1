//! The two HTTP exchanges of the smart protocol, behind a caller-supplied seam.
//!
//! The core never retries, authenticates or times out on its own; those are
//! concerns of the [`Transport`] implementation.

use std::future::Future;

use anyhow::Result;

mod http;

pub use http::HttpTransport;

/// MIME type of an upload-pack request body.
pub const UPLOAD_PACK_REQUEST_TYPE: &str = "application/x-git-upload-pack-request";
/// MIME type of an upload-pack response body.
pub const UPLOAD_PACK_RESULT_TYPE: &str = "application/x-git-upload-pack-result";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRequest {
    /// `GET <base>/info/refs?service=git-upload-pack`
    InfoRefs,
    /// `POST <base>/git-upload-pack` with a pkt-line framed body.
    UploadPack { body: String },
}

/// Performs one request and returns the raw response body.
pub trait Transport {
    fn request(&self, request: GitRequest) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Any `Fn(GitRequest) -> Future` closure is a transport, which keeps
/// scripted transports in tests to a few lines.
impl<F, Fut> Transport for F
where
    F: Fn(GitRequest) -> Fut,
    Fut: Future<Output = Result<Vec<u8>>> + Send,
{
    fn request(&self, request: GitRequest) -> impl Future<Output = Result<Vec<u8>>> + Send {
        self(request)
    }
}
