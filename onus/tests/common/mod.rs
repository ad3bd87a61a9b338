use gix::{objs, ObjectId, Repository};

const SIGNATURE_TIME: i64 = 1_700_000_000;

/// A throwaway repository to write test histories into.
pub fn repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().expect("can create a temporary directory");
    let repo = gix::init(dir.path()).expect("can initialize a repository");
    (dir, repo)
}

/// Write a commit whose tree holds exactly `files`. The commit is addressed
/// by id only; no reference is moved.
pub fn commit(
    repo: &Repository,
    files: &[(&str, &str)],
    parents: &[ObjectId],
    message: &str,
) -> ObjectId {
    let mut entries: Vec<objs::tree::Entry> = files
        .iter()
        .map(|(name, contents)| objs::tree::Entry {
            mode: objs::tree::EntryMode::Blob,
            filename: (*name).into(),
            oid: repo
                .write_blob(contents.as_bytes())
                .expect("can write blob")
                .detach(),
        })
        .collect();
    entries.sort();

    let tree = repo
        .write_object(&objs::Tree { entries })
        .expect("can write tree")
        .detach();

    let signature = gix::actor::Signature {
        name: "Pickaxe Tester".into(),
        email: "tester@example.com".into(),
        time: gix::date::Time {
            seconds: SIGNATURE_TIME,
            offset: 0,
            sign: gix::date::time::Sign::Plus,
        },
    };
    let commit = objs::Commit {
        tree,
        parents: parents.iter().copied().collect(),
        author: signature.clone(),
        committer: signature,
        encoding: None,
        message: message.into(),
        extra_headers: Vec::new(),
    };
    repo.write_object(&commit).expect("can write commit").detach()
}

/// The blamed commit of every line, in order.
pub fn line_commits(blame: &onus::Blame) -> Vec<ObjectId> {
    blame.blamed_lines().iter().map(|line| line.commit).collect()
}
