//! Shallow, path-filtered clone over three upload-pack rounds.
//!
//! 1. want the commit with `deepen 1` and `filter tree:0`, read its tree id;
//! 2. want the root tree with `filter blob:none`, receiving every tree;
//! 3. walk the trees, keep the leaves the filter accepts and want their blobs.
//!
//! Rounds are strictly sequential and nothing is kept between clones.

use std::collections::{HashMap, HashSet};
use std::fmt;

use gix_object::Kind;

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::pack::{
    decode_pack_with, parse_commit_links, parse_tree, GitObject, GitTreeEntry, ObjectId,
};
use crate::pkt_line::{format_line, read_pack_response};
use crate::refs::find_commit_of_ref;
use crate::transport::{GitRequest, Transport};

pub use crate::pack::is_directory_mode;

/// Capabilities announced on the first `want` line of every round.
pub const CAPABILITIES: &str =
    "multi_ack_detailed no-done no-progress side-band-64k thin-pack deepen-since deepen-not filter";

/// Flush followed by the `done` line that ends every request.
pub const DONE_LINE: &str = "00000008done";

/// One file of the checked-out tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonedFile {
    /// Slash-separated path relative to the repository root.
    pub path: String,
    pub content: Vec<u8>,
}

/// `(path, is_directory, depth, filename) -> keep`
///
/// Only called for leaves, so `is_directory` is always `false`; directories
/// are always descended.
pub type PathFilter = dyn Fn(&str, bool, usize, &str) -> bool + Send + Sync;

#[derive(Default)]
pub struct ShallowCloneOptions {
    filter: Option<Box<PathFilter>>,
    algorithm: HashAlgorithm,
}

impl ShallowCloneOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, bool, usize, &str) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn accepts(&self, path: &str, depth: usize, filename: &str) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter(path, false, depth, filename))
    }
}

impl fmt::Debug for ShallowCloneOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShallowCloneOptions")
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStage {
    ResolvingCommit,
    ResolvingTree,
    FetchingBlobs,
    Done,
}

impl fmt::Display for CloneStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloneStage::ResolvingCommit => "resolving commit",
            CloneStage::ResolvingTree => "resolving tree",
            CloneStage::FetchingBlobs => "fetching blobs",
            CloneStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A leaf kept by the tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectedBlob {
    path: String,
    id: ObjectId,
}

/// Resolve `ref_name` from the advertisement, then clone that commit.
pub async fn shallow_clone_ref<T: Transport>(
    ref_name: &str,
    transport: &T,
    options: &ShallowCloneOptions,
) -> Result<Vec<ClonedFile>> {
    let commit = find_commit_of_ref(ref_name, transport).await?;
    shallow_clone_commit(&commit, transport, options).await
}

/// Fetch the files of `commit` that the filter accepts, without history.
pub async fn shallow_clone_commit<T: Transport>(
    commit: &str,
    transport: &T,
    options: &ShallowCloneOptions,
) -> Result<Vec<ClonedFile>> {
    let algorithm = options.algorithm;
    let commit = commit.to_ascii_lowercase();
    if commit.len() != algorithm.hex_len() || !commit.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidObjectId(commit));
    }

    tracing::info!("{}: {}", CloneStage::ResolvingCommit, commit);
    let objects = fetch_objects(transport, commit_request(&commit), algorithm).await?;
    let commit_object = match objects.as_slice() {
        [object] if object.kind == Kind::Commit && object.id == commit => object,
        _ => {
            return Err(Error::ProtocolInconsistency(format!(
                "expected only commit {}, received {} object(s)",
                commit,
                objects.len()
            )))
        }
    };
    let root = parse_commit_links(&commit_object.data, algorithm)?.tree;

    tracing::info!("{}: {}", CloneStage::ResolvingTree, root);
    let objects = fetch_objects(transport, tree_request(&root, &commit), algorithm).await?;
    let trees = index_trees(&objects, algorithm)?;
    let selected = select_blobs(&root, &trees, options)?;

    if selected.is_empty() {
        tracing::info!("no files selected");
        tracing::debug!("{}", CloneStage::Done);
        return Ok(Vec::new());
    }

    let wanted = distinct_ids(&selected);
    tracing::info!(
        "{}: {} file(s), {} distinct blob(s)",
        CloneStage::FetchingBlobs,
        selected.len(),
        wanted.len()
    );
    let objects = fetch_objects(transport, blob_request(&wanted, &commit), algorithm).await?;
    let files = assemble_files(&selected, &wanted, objects)?;

    tracing::info!("{}: {} file(s)", CloneStage::Done, files.len());
    Ok(files)
}

async fn fetch_objects<T: Transport>(
    transport: &T,
    body: String,
    algorithm: HashAlgorithm,
) -> Result<Vec<GitObject>> {
    let response = transport
        .request(GitRequest::UploadPack { body })
        .await
        .map_err(Error::Transport)?;
    let pack = read_pack_response(&response)?;
    Ok(decode_pack_with(&pack, algorithm)?.objects)
}

fn commit_request(commit: &str) -> String {
    let mut body = format_line(&format!("want {} {}", commit, CAPABILITIES));
    body.push_str(&format_line("deepen 1"));
    body.push_str(&format_line("filter tree:0"));
    body.push_str(DONE_LINE);
    body
}

fn tree_request(tree: &str, commit: &str) -> String {
    let mut body = format_line(&format!("want {} {}", tree, CAPABILITIES));
    body.push_str(&format_line(&format!("shallow {}", commit)));
    body.push_str(&format_line("filter blob:none"));
    body.push_str(DONE_LINE);
    body
}

fn blob_request(blobs: &[ObjectId], commit: &str) -> String {
    let mut body = String::new();
    for (index, id) in blobs.iter().enumerate() {
        let line = if index == 0 {
            format!("want {} {}", id, CAPABILITIES)
        } else {
            format!("want {}", id)
        };
        body.push_str(&format_line(&line));
    }
    body.push_str(&format_line(&format!("shallow {}", commit)));
    body.push_str(&format_line("filter blob:none"));
    body.push_str(DONE_LINE);
    body
}

fn index_trees(
    objects: &[GitObject],
    algorithm: HashAlgorithm,
) -> Result<HashMap<ObjectId, Vec<GitTreeEntry>>> {
    let mut trees = HashMap::new();
    for object in objects {
        if object.kind != Kind::Tree {
            tracing::debug!("ignoring non-tree object {} in tree pack", object.id);
            continue;
        }
        trees.insert(object.id.clone(), parse_tree(&object.data, algorithm)?);
    }
    Ok(trees)
}

/// Preorder walk from `root`: a directory's contents come before its later
/// siblings. Uses an explicit stack so deep trees cannot exhaust the call
/// stack.
fn select_blobs(
    root: &str,
    trees: &HashMap<ObjectId, Vec<GitTreeEntry>>,
    options: &ShallowCloneOptions,
) -> Result<Vec<SelectedBlob>> {
    struct Frame<'a> {
        entries: std::slice::Iter<'a, GitTreeEntry>,
        prefix: String,
        depth: usize,
    }

    let mut selected = Vec::new();
    let mut stack = vec![Frame {
        entries: lookup_tree(trees, root)?.iter(),
        prefix: String::new(),
        depth: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(entry) = frame.entries.next() else {
            stack.pop();
            continue;
        };
        let path = if frame.prefix.is_empty() {
            entry.filename.clone()
        } else {
            format!("{}/{}", frame.prefix, entry.filename)
        };
        let depth = frame.depth;

        if entry.is_directory() {
            stack.push(Frame {
                entries: lookup_tree(trees, &entry.id)?.iter(),
                prefix: path,
                depth: depth + 1,
            });
        } else if options.accepts(&path, depth, &entry.filename) {
            selected.push(SelectedBlob {
                path,
                id: entry.id.clone(),
            });
        }
    }

    Ok(selected)
}

fn lookup_tree<'a>(
    trees: &'a HashMap<ObjectId, Vec<GitTreeEntry>>,
    id: &str,
) -> Result<&'a [GitTreeEntry]> {
    trees
        .get(id)
        .map(Vec::as_slice)
        .ok_or_else(|| Error::ProtocolInconsistency(format!("tree {} missing from pack", id)))
}

fn distinct_ids(selected: &[SelectedBlob]) -> Vec<ObjectId> {
    let mut seen = HashSet::new();
    selected
        .iter()
        .filter(|blob| seen.insert(blob.id.as_str()))
        .map(|blob| blob.id.clone())
        .collect()
}

/// Pair returned blobs with every path that referenced them, in walk order.
/// Requested blobs the server did not send are left out.
fn assemble_files(
    selected: &[SelectedBlob],
    wanted: &[ObjectId],
    objects: Vec<GitObject>,
) -> Result<Vec<ClonedFile>> {
    let wanted: HashSet<&str> = wanted.iter().map(String::as_str).collect();
    let mut contents: HashMap<ObjectId, Vec<u8>> = HashMap::new();

    for object in objects {
        if !wanted.contains(object.id.as_str()) {
            return Err(Error::UnexpectedObject(object.id));
        }
        if contents.contains_key(&object.id) {
            tracing::warn!("blob {} sent twice, keeping the first copy", object.id);
            continue;
        }
        contents.insert(object.id, object.data);
    }

    let missing = wanted.len() - contents.len();
    if missing > 0 {
        tracing::warn!("server did not send {} requested blob(s)", missing);
    }

    Ok(selected
        .iter()
        .filter_map(|blob| {
            contents.get(&blob.id).map(|content| ClonedFile {
                path: blob.path.clone(),
                content: content.clone(),
            })
        })
        .collect())
}
