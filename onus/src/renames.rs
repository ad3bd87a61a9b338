use gix::{
    bstr::{BStr, BString, ByteSlice},
    ObjectId, Repository,
};

use crate::chunks;
use crate::error::Error;
use crate::origin::{OriginId, Origins};
use crate::Result;

/// Matched preimage share (in 1/1000ths) below which two blobs are not
/// considered a rename pair.
const RENAME_THRESHOLD: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

/// One changed path between a parent tree and a child tree. `prev_id` is the
/// parent-side blob, `id` the child-side one; absent on the side the path
/// does not exist on.
#[derive(Debug, Clone)]
pub(crate) struct TreeChange {
    pub kind: ChangeKind,
    pub path: BString,
    pub prev_id: Option<ObjectId>,
    pub id: Option<ObjectId>,
}

/// Collect the blob-level changes between two commits' trees.
pub(crate) fn tree_changes(
    repo: &Repository,
    parent: ObjectId,
    child: ObjectId,
) -> Result<Vec<TreeChange>> {
    let old = repo.find_object(parent)?.peel_to_tree()?;
    let new = repo.find_object(child)?.peel_to_tree()?;

    let mut changes = Vec::new();
    let mut platform = old
        .changes()
        .map_err(|e| Error::TreeDiff(Box::new(e)))?;
    platform.track_path();
    platform.track_rewrites(None);
    platform
        .for_each_to_obtain_tree(&new, |change| {
            use gix::object::tree::diff::change::Event::*;
            match change.event {
                Addition { entry_mode, id } if entry_mode.is_blob() => changes.push(TreeChange {
                    kind: ChangeKind::Added,
                    path: change.location.to_owned(),
                    prev_id: None,
                    id: Some(id.detach()),
                }),
                Deletion { entry_mode, id } if entry_mode.is_blob() => changes.push(TreeChange {
                    kind: ChangeKind::Deleted,
                    path: change.location.to_owned(),
                    prev_id: Some(id.detach()),
                    id: None,
                }),
                Modification {
                    previous_entry_mode,
                    previous_id,
                    entry_mode,
                    id,
                } if previous_entry_mode.is_blob() && entry_mode.is_blob() => {
                    changes.push(TreeChange {
                        kind: ChangeKind::Modified,
                        path: change.location.to_owned(),
                        prev_id: Some(previous_id.detach()),
                        id: Some(id.detach()),
                    })
                }
                _ => {}
            }
            Ok::<_, std::convert::Infallible>(gix::object::tree::diff::Action::Continue)
        })
        .map_err(|e| Error::TreeDiff(Box::new(e)))?;

    Ok(changes)
}

/// Every blob reachable from a commit's tree, with its full path.
pub(crate) fn all_blobs(repo: &Repository, commit: ObjectId) -> Result<Vec<(BString, ObjectId)>> {
    let tree = repo.find_object(commit)?.peel_to_tree()?;
    let mut blobs = Vec::new();
    collect_blobs(repo, &tree, BString::default(), &mut blobs)?;
    Ok(blobs)
}

fn collect_blobs(
    repo: &Repository,
    tree: &gix::Tree<'_>,
    prefix: BString,
    out: &mut Vec<(BString, ObjectId)>,
) -> Result<()> {
    for entry in tree.iter() {
        let entry = entry.map_err(|e| Error::TreeDiff(Box::new(e)))?;
        let mut path = prefix.clone();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(entry.filename());

        let mode = entry.mode();
        if mode.is_tree() {
            let subtree = repo
                .find_object(entry.oid().to_owned())?
                .try_into_tree()
                .map_err(|e| Error::TreeDiff(Box::new(e)))?;
            collect_blobs(repo, &subtree, path, out)?;
        } else if mode.is_blob() {
            out.push((path, entry.oid().to_owned()));
        }
    }
    Ok(())
}

/// How much of two blobs' lines survive between them, in 1/1000ths of the
/// larger line count.
pub(crate) fn similarity(old: &[u8], new: &[u8]) -> u32 {
    let old_lines = count_lines(old);
    let new_lines = count_lines(new);
    let largest = old_lines.max(new_lines);
    if largest == 0 {
        return 1000;
    }

    let changed: u32 = chunks::diff_blobs(old, new, 0)
        .iter()
        .map(|c| c.t_next - c.same)
        .sum();
    (new_lines - changed) * 1000 / largest
}

fn count_lines(buf: &[u8]) -> u32 {
    let mut lines = buf.iter().filter(|b| **b == b'\n').count() as u32;
    if buf.last().is_some_and(|b| *b != b'\n') {
        lines += 1;
    }
    lines
}

/// Find the parent-side path the child origin's file was renamed from, if
/// any, and load its origin.
///
/// This is only consulted after a same-path lookup failed, so the child path
/// is an addition relative to the parent; rename sources are the parent's
/// deletions. An exact pair is matched by blob id alone, otherwise the
/// deleted blob most similar to the child blob wins, if similar enough.
pub(crate) fn find_rename(
    repo: &Repository,
    origins: &mut Origins,
    parent: ObjectId,
    child_commit: ObjectId,
    child_path: &BStr,
    child_blob: ObjectId,
) -> Result<Option<OriginId>> {
    let changes = tree_changes(repo, parent, child_commit)?;
    if !changes
        .iter()
        .any(|c| c.kind == ChangeKind::Added && c.path.as_bstr() == child_path)
    {
        return Ok(None);
    }
    let deleted = || {
        changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Deleted)
            .map(|c| (&c.path, c.prev_id.expect("deletions have a parent-side blob")))
    };

    if let Some((path, _)) = deleted().find(|(_, id)| *id == child_blob) {
        return origins.find_origin(repo, parent, path.as_bstr());
    }

    let new_data = repo.find_object(child_blob)?.detach().data;
    let mut best: Option<(&BString, u32)> = None;
    for (path, blob) in deleted() {
        let old_data = repo.find_object(blob)?.detach().data;
        let score = similarity(&old_data, &new_data);
        if score >= RENAME_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
            best = Some((path, score));
        }
    }

    match best {
        Some((path, _)) => {
            let path = path.clone();
            origins.find_origin(repo, parent, path.as_bstr())
        }
        None => Ok(None),
    }
}
