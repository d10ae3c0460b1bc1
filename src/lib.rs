#![deny(clippy::mod_module_files)]
//! Shallow, path-filtered clones over Git's smart HTTP protocol.
//!
//! Fetches a single commit's files in three upload-pack rounds without
//! history or an object store, decoding packfiles entirely in memory.

pub mod config;
pub mod error;
pub mod hash;
pub mod pack;
pub mod pkt_line;
pub mod refs;
pub mod transport;
pub mod upload_pack;
pub mod worktree;

pub use config::FetchConfig;
pub use error::{Error, Result};
pub use hash::HashAlgorithm;
pub use refs::{find_commit_of_ref, find_commit_of_ref_in_advertisement, maybe_find_commit_of_ref};
pub use transport::{GitRequest, HttpTransport, Transport};
pub use upload_pack::{
    shallow_clone_commit, shallow_clone_ref, ClonedFile, PathFilter, ShallowCloneOptions,
};
