//! Git packfile support
//!
//! Decodes the packs returned by `git-upload-pack` into fully materialized,
//! content-addressed objects, resolving `ref_delta` entries against objects
//! seen earlier in the same pack.

mod commit;
mod decode;
mod delta;
mod encode;
mod entry;
mod objects;
mod tree;

pub use commit::{parse_commit_links, GitCommitLinks};
pub use decode::{decode_pack, decode_pack_with};
pub use delta::{apply_delta, decode_delta, encode_delta, Delta, DeltaInstruction};
pub use encode::PackBuilder;
pub use entry::{read_entry_header, EntryHeader, PackEntryType};
pub use objects::{kind_name, GitObject, GitPack, ObjectId};
pub use tree::{encode_tree, is_directory_mode, parse_tree, GitTreeEntry};
