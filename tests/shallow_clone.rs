//! End-to-end clones against a scripted in-memory remote.

use std::sync::Mutex;

use anyhow::Result;
use gix_object::Kind;

use git_shallow_fetch::{
    hash::{compute_object_id, HashAlgorithm},
    pack::{encode_delta, encode_tree, DeltaInstruction, GitTreeEntry, PackBuilder},
    pkt_line::{encode_sideband, format_line, BAND_ERROR, BAND_PACK, BAND_PROGRESS, FLUSH},
    shallow_clone_commit, shallow_clone_ref, ClonedFile, Error, GitRequest, ShallowCloneOptions,
};

const A_CONTENT: &[u8] = b"contents of a\n";
const B_CONTENT: &[u8] = b"contents of b, somewhat longer\n";

/// Answers `info/refs` and the three upload-pack rounds from canned packs.
struct Remote {
    commit: String,
    root: String,
    advertisement: Vec<u8>,
    commit_response: Vec<u8>,
    tree_response: Vec<u8>,
    blob_response: Vec<u8>,
    requests: Mutex<Vec<GitRequest>>,
}

impl Remote {
    fn respond(&self, request: GitRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        match request {
            GitRequest::InfoRefs => Ok(self.advertisement.clone()),
            GitRequest::UploadPack { body } if body.contains("deepen 1") => {
                Ok(self.commit_response.clone())
            }
            GitRequest::UploadPack { body } if body.contains(&format!("want {} ", self.root)) => {
                Ok(self.tree_response.clone())
            }
            GitRequest::UploadPack { .. } => Ok(self.blob_response.clone()),
        }
    }

    fn upload_pack_bodies(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|request| match request {
                GitRequest::UploadPack { body } => Some(body.clone()),
                GitRequest::InfoRefs => None,
            })
            .collect()
    }
}

fn tree_entry(mode: &str, filename: &str, id: &str) -> GitTreeEntry {
    GitTreeEntry {
        mode: mode.to_string(),
        filename: filename.to_string(),
        id: id.to_string(),
    }
}

fn pack_of(objects: &[(Kind, &[u8])]) -> Vec<u8> {
    pack_with(HashAlgorithm::Sha1, objects)
}

fn pack_with(algorithm: HashAlgorithm, objects: &[(Kind, &[u8])]) -> Vec<u8> {
    let mut builder = PackBuilder::with_algorithm(algorithm);
    for (kind, data) in objects {
        builder.add_object(*kind, data).unwrap();
    }
    builder.finish()
}

/// `shallow` lines, `NAK`, a progress message, then the pack on band 1.
fn upload_pack_response(pack: &[u8]) -> Vec<u8> {
    let mut response = format_line("NAK\n").into_bytes();
    response.extend(encode_sideband(BAND_PROGRESS, b"Enumerating objects: done.\n"));
    response.extend(encode_sideband(BAND_PACK, pack));
    response.extend(FLUSH.as_bytes());
    response
}

fn advertisement(commit: &str) -> Vec<u8> {
    let mut buffer = format_line("# service=git-upload-pack\n");
    buffer.push_str(FLUSH);
    buffer.push_str(&format_line(&format!(
        "{} HEAD\0multi_ack thin-pack side-band-64k filter\n",
        commit
    )));
    buffer.push_str(&format_line(&format!("{} refs/heads/main\n", commit)));
    buffer.push_str(FLUSH);
    buffer.into_bytes()
}

/// Root tree with `a.txt` and `dir/b.txt`.
fn remote() -> Remote {
    remote_with(HashAlgorithm::Sha1)
}

fn remote_with(algorithm: HashAlgorithm) -> Remote {
    let a = algorithm.object_id(Kind::Blob, A_CONTENT);
    let b = algorithm.object_id(Kind::Blob, B_CONTENT);

    let dir = encode_tree(&[tree_entry("100644", "b.txt", &b)]).unwrap();
    let dir_id = algorithm.object_id(Kind::Tree, &dir);
    let root = encode_tree(&[
        tree_entry("100644", "a.txt", &a),
        tree_entry("40000", "dir", &dir_id),
    ])
    .unwrap();
    let root_id = algorithm.object_id(Kind::Tree, &root);

    let commit = format!(
        "tree {}\nauthor A U Thor <author@example.com> 1700000000 +0000\n\
         committer A U Thor <author@example.com> 1700000000 +0000\n\ninitial\n",
        root_id
    );
    let commit_id = algorithm.object_id(Kind::Commit, commit.as_bytes());

    let mut commit_response = format_line(&format!("shallow {}\n", commit_id)).into_bytes();
    commit_response.extend(FLUSH.as_bytes());
    commit_response.extend(upload_pack_response(&pack_with(
        algorithm,
        &[(Kind::Commit, commit.as_bytes())],
    )));

    Remote {
        advertisement: advertisement(&commit_id),
        commit_response,
        tree_response: upload_pack_response(&pack_with(
            algorithm,
            &[(Kind::Tree, &root), (Kind::Tree, &dir)],
        )),
        blob_response: upload_pack_response(&pack_with(
            algorithm,
            &[(Kind::Blob, A_CONTENT), (Kind::Blob, B_CONTENT)],
        )),
        commit: commit_id,
        root: root_id,
        requests: Mutex::new(Vec::new()),
    }
}

fn paths(files: &[ClonedFile]) -> Vec<&str> {
    files.iter().map(|file| file.path.as_str()).collect()
}

#[tokio::test]
async fn test_clone_without_filter() {
    let remote = remote();
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let files = shallow_clone_commit(&remote.commit, &transport, &ShallowCloneOptions::new())
        .await
        .unwrap();

    assert_eq!(paths(&files), vec!["a.txt", "dir/b.txt"]);
    assert_eq!(files[0].content, A_CONTENT);
    assert_eq!(files[1].content, B_CONTENT);

    let bodies = remote.upload_pack_bodies();
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0].contains("filter tree:0"));
    assert!(bodies[1].contains(&format!("shallow {}", remote.commit)));
    assert_eq!(bodies[2].matches("want ").count(), 2);
    assert!(bodies.iter().all(|body| body.ends_with("00000008done")));
}

#[tokio::test]
async fn test_clone_with_filter() {
    let remote = remote();
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };
    let options =
        ShallowCloneOptions::new().with_filter(|path, _, _, _| !path.starts_with("dir/"));

    let files = shallow_clone_commit(&remote.commit, &transport, &options)
        .await
        .unwrap();

    assert_eq!(paths(&files), vec!["a.txt"]);
    let bodies = remote.upload_pack_bodies();
    assert_eq!(bodies[2].matches("want ").count(), 1);
    assert!(bodies[2].contains(&compute_object_id(Kind::Blob, A_CONTENT)));
}

#[tokio::test]
async fn test_clone_by_ref() {
    let remote = remote();
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let files = shallow_clone_ref("refs/heads/main", &transport, &ShallowCloneOptions::new())
        .await
        .unwrap();
    assert_eq!(paths(&files), vec!["a.txt", "dir/b.txt"]);
    assert_eq!(remote.requests.lock().unwrap()[0], GitRequest::InfoRefs);
}

#[tokio::test]
async fn test_unknown_ref() {
    let remote = remote();
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let err = shallow_clone_ref("refs/heads/mai", &transport, &ShallowCloneOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RefNotFound(name) if name == "refs/heads/mai"));
    assert!(remote.upload_pack_bodies().is_empty());
}

#[tokio::test]
async fn test_nothing_selected_skips_blob_round() {
    let remote = remote();
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };
    let options = ShallowCloneOptions::new().with_filter(|_, _, _, _| false);

    let files = shallow_clone_commit(&remote.commit, &transport, &options)
        .await
        .unwrap();
    assert!(files.is_empty());
    assert_eq!(remote.upload_pack_bodies().len(), 2);
}

#[tokio::test]
async fn test_extraneous_blob() {
    let mut remote = remote();
    remote.blob_response = upload_pack_response(&pack_of(&[
        (Kind::Blob, A_CONTENT),
        (Kind::Blob, B_CONTENT),
        (Kind::Blob, b"not requested\n"),
    ]));
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let err = shallow_clone_commit(&remote.commit, &transport, &ShallowCloneOptions::new())
        .await
        .unwrap_err();
    let extra = compute_object_id(Kind::Blob, b"not requested\n");
    assert!(matches!(err, Error::UnexpectedObject(id) if id == extra));
}

#[tokio::test]
async fn test_missing_subtree() {
    let mut remote = remote();
    let a = compute_object_id(Kind::Blob, A_CONTENT);
    let dangling = "0123456789abcdef0123456789abcdef01234567";
    let root = encode_tree(&[
        tree_entry("100644", "a.txt", &a),
        tree_entry("40000", "dir", dangling),
    ])
    .unwrap();
    let commit = format!("tree {}\n\nno subtree\n", compute_object_id(Kind::Tree, &root));
    remote.commit = compute_object_id(Kind::Commit, commit.as_bytes());
    remote.root = compute_object_id(Kind::Tree, &root);
    remote.commit_response =
        upload_pack_response(&pack_of(&[(Kind::Commit, commit.as_bytes())]));
    remote.tree_response = upload_pack_response(&pack_of(&[(Kind::Tree, &root)]));
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let err = shallow_clone_commit(&remote.commit, &transport, &ShallowCloneOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolInconsistency(message) if message.contains(dangling)));
}

#[tokio::test]
async fn test_blob_sent_as_ref_delta() {
    let mut remote = remote();
    // b.txt = "contents of b" + ", somewhat longer\n", built on a.txt
    let delta = encode_delta(
        A_CONTENT.len(),
        &[
            DeltaInstruction::Copy {
                offset: 0,
                size: 12,
            },
            DeltaInstruction::Insert(b"b, somewhat longer\n"),
        ],
    )
    .unwrap();
    let mut builder = PackBuilder::new();
    builder.add_object(Kind::Blob, A_CONTENT).unwrap();
    builder
        .add_ref_delta(&compute_object_id(Kind::Blob, A_CONTENT), &delta)
        .unwrap();
    remote.blob_response = upload_pack_response(&builder.finish());
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let files = shallow_clone_commit(&remote.commit, &transport, &ShallowCloneOptions::new())
        .await
        .unwrap();
    assert_eq!(paths(&files), vec!["a.txt", "dir/b.txt"]);
    assert_eq!(files[1].content, B_CONTENT);
}

#[tokio::test]
async fn test_round_one_must_return_the_commit() {
    let mut remote = remote();
    remote.commit_response = upload_pack_response(&pack_of(&[(Kind::Blob, A_CONTENT)]));
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let err = shallow_clone_commit(&remote.commit, &transport, &ShallowCloneOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolInconsistency(_)));
}

#[tokio::test]
async fn test_remote_error_band() {
    let mut remote = remote();
    let mut response = format_line("NAK\n").into_bytes();
    response.extend(encode_sideband(BAND_ERROR, b"filter not allowed\n"));
    remote.tree_response = response;
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let err = shallow_clone_commit(&remote.commit, &transport, &ShallowCloneOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote(message) if message == "filter not allowed"));
}

#[tokio::test]
async fn test_transport_failure_aborts() {
    let remote = remote();
    let transport = |_: GitRequest| async {
        Err::<Vec<u8>, _>(anyhow::anyhow!("503 Service Unavailable"))
    };

    let err = shallow_clone_commit(&remote.commit, &transport, &ShallowCloneOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn test_sha256_clone_by_ref() {
    let remote = remote_with(HashAlgorithm::Sha256);
    assert_eq!(remote.commit.len(), 64);
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };
    let options = ShallowCloneOptions::new().with_algorithm(HashAlgorithm::Sha256);

    let files = shallow_clone_ref("refs/heads/main", &transport, &options)
        .await
        .unwrap();

    assert_eq!(paths(&files), vec!["a.txt", "dir/b.txt"]);
    assert_eq!(files[1].content, B_CONTENT);
    let bodies = remote.upload_pack_bodies();
    assert_eq!(bodies.len(), 3);
    assert!(bodies[1].starts_with(&format!("00a7want {} ", remote.root)));
}

#[tokio::test]
async fn test_sha1_options_reject_sha256_commit() {
    let remote = remote_with(HashAlgorithm::Sha256);
    let transport = |request: GitRequest| {
        let response = remote.respond(request);
        async move { response }
    };

    let err = shallow_clone_ref("refs/heads/main", &transport, &ShallowCloneOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidObjectId(id) if id == remote.commit));
    assert!(remote.upload_pack_bodies().is_empty());
}
