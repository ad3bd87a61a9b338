use std::collections::HashSet;
use std::path::Path;

use flagset::{flags, FlagSet};
use gix::{
    bstr::{BStr, BString, ByteSlice},
    ObjectId, Repository,
};
use smallvec::{smallvec, SmallVec};

use crate::chunks;
use crate::error::Error;
use crate::grafts::Grafts;
use crate::lines::FileIndex;
use crate::origin::{OriginId, Origins};
use crate::renames::{self, ChangeKind};
use crate::scoreboard::{ent_score, split_if_better, split_overlap, Entry, Scoreboard, Split};
use crate::Result;

#[cfg(feature = "trace")]
use trace::trace;
#[cfg(feature = "trace")]
trace::init_depth_var!();

/// Parents beyond this many are not considered when digging.
pub const MAX_PARENTS: usize = 16;

/// An overlap scoring lower than this is not moved to the parent by `-M`.
pub const DEFAULT_MOVE_SCORE: u32 = 20;
/// An overlap scoring lower than this is not moved to the parent by `-C`.
pub const DEFAULT_COPY_SCORE: u32 = 40;

flags! {
    /// Extra searches for lines the file's own history cannot explain.
    pub enum Detect: u8 {
        /// Look for line movements within the parent's version of the file.
        Move,
        /// Look for lines copied from the parent's other files.
        Copy,
        /// Consider every file in the parent as a copy source, not just
        /// changed ones.
        CopyHarder,
    }
}

/// Configuration of one attribution run.
#[derive(Debug)]
pub struct Options {
    pub detect: FlagSet<Detect>,
    pub move_score: u32,
    pub copy_score: u32,
    /// One-based inclusive line range to restrict attribution to.
    pub range: Option<(u32, u32)>,
    /// Do not dig past commits committed before this epoch second.
    pub since: Option<i64>,
    pub grafts: Grafts,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            detect: FlagSet::default(),
            move_score: DEFAULT_MOVE_SCORE,
            copy_score: DEFAULT_COPY_SCORE,
            range: None,
            since: None,
            grafts: Grafts::default(),
        }
    }
}

/// One group of lines in the final file together with the commit and path
/// that introduced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameEntry {
    pub commit: ObjectId,
    pub path: BString,
    /// First line of the group in the final file, zero-based.
    pub lno: u32,
    pub num_lines: u32,
    /// First line of the group in the blamed commit's version, zero-based.
    pub s_lno: u32,
    /// One more than the number of alphanumeric bytes on the group's lines.
    pub score: u32,
}

/// A line from the blamed file with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlamedLine<'a> {
    pub commit: ObjectId,
    pub path: &'a BStr,
    /// Zero-based line number in the final file.
    pub line_no: u32,
    /// Zero-based line number in the blamed commit's version of the file.
    pub orig_line_no: u32,
    pub line: &'a BStr,
}

/// The finished attribution of a file: an ordered list of blamed groups
/// tiling the requested line range.
#[derive(Debug)]
pub struct Blame {
    pub(crate) entries: Vec<BlameEntry>,
    pub(crate) file: FileIndex,
    pub(crate) path: BString,
    pub(crate) final_commit: ObjectId,
}

impl Blame {
    pub fn entries(&self) -> &[BlameEntry] {
        &self.entries
    }

    pub fn path(&self) -> &BStr {
        self.path.as_bstr()
    }

    pub fn final_commit(&self) -> ObjectId {
        self.final_commit
    }

    /// The per-line view of the attribution.
    pub fn blamed_lines(&self) -> Vec<BlamedLine<'_>> {
        self.entries
            .iter()
            .flat_map(|e| {
                (0..e.num_lines).map(move |i| BlamedLine {
                    commit: e.commit,
                    path: e.path.as_bstr(),
                    line_no: e.lno + i,
                    orig_line_no: e.s_lno + i,
                    line: self.file.line(e.lno + i).as_bstr(),
                })
            })
            .collect()
    }
}

/// Obtain the blame record for `path` as of the commit `start`, not digging
/// into `ends` or their ancestors.
pub fn blame_file(
    repo: &Repository,
    start: ObjectId,
    ends: &[ObjectId],
    path: &Path,
    options: &Options,
) -> Result<Blame> {
    let path = gix::path::into_bstr(path).into_owned();

    let mut origins = Origins::default();
    let origin = match origins.find_origin(repo, start, path.as_bstr())? {
        Some(o) => o,
        None => {
            return Err(Error::PathMissing {
                path,
                commit: start,
            })
        }
    };

    let buf = blob_data(repo, origins.get(origin).blob)?;
    let file = FileIndex::new(buf);
    let num_lines = file.num_lines();

    let (bottom, top) = match options.range {
        None => (0, num_lines),
        Some((b, t)) => {
            let (b, t) = if b > 0 && t > 0 && t < b { (t, b) } else { (b, t) };
            let bottom = b.max(1) - 1;
            let top = if t == 0 { num_lines } else { t };
            if top > num_lines || bottom >= top {
                return Err(Error::RangePastEndOfFile {
                    path,
                    lines: num_lines,
                });
            }
            (bottom, top)
        }
    };

    let mut sb = Scoreboard {
        final_commit: start,
        path,
        file,
        ent: Vec::new(),
        origins,
    };
    if top > bottom {
        sb.ent.push(Entry {
            lno: bottom,
            num_lines: top - bottom,
            suspect: origin,
            guilty: false,
            s_lno: bottom,
            score: 0,
        });
    }

    let mut uninteresting = HashSet::new();
    if !ends.is_empty() {
        for info in repo.rev_walk(ends.iter().copied()).all()? {
            let info = info.map_err(|e| Error::Traverse(Box::new(e)))?;
            uninteresting.insert(info.id);
        }
    }

    assign_blame(repo, &mut sb, &uninteresting, options)?;
    sb.coalesce();

    let mut entries = Vec::with_capacity(sb.ent.len());
    for mut e in sb.ent.iter().copied() {
        let score = ent_score(&sb.file, &mut e);
        let suspect = sb.origins.get(e.suspect);
        entries.push(BlameEntry {
            commit: suspect.commit,
            path: suspect.path.clone(),
            lno: e.lno,
            num_lines: e.num_lines,
            s_lno: e.s_lno,
            score,
        });
    }

    Ok(Blame {
        entries,
        file: sb.file,
        path: sb.path,
        final_commit: sb.final_commit,
    })
}

/// The driver: keep picking a suspect that has not been proven guilty, try to
/// pass its lines to its parents, and hold it responsible for whatever
/// remains.
#[cfg_attr(feature = "trace", trace(prefix_enter = "", prefix_exit = ""))]
fn assign_blame(
    repo: &Repository,
    sb: &mut Scoreboard,
    uninteresting: &HashSet<ObjectId>,
    options: &Options,
) -> Result<()> {
    loop {
        let suspect = match sb.ent.iter().find(|e| !e.guilty) {
            Some(e) => e.suspect,
            None => return Ok(()),
        };

        let commit = sb.origins.get(suspect).commit;
        let too_old = match options.since {
            Some(cutoff) => commit_time(repo, commit)? < cutoff,
            None => false,
        };
        if !uninteresting.contains(&commit) && !too_old {
            pass_blame(repo, sb, suspect, options)?;
        }

        // Take responsibility for the remaining entries.
        for e in &mut sb.ent {
            if e.suspect == suspect {
                e.guilty = true;
            }
        }
        sb.coalesce();
    }
}

/// One driver iteration for `origin`: resolve parent origins and run the
/// parent pass and the optional move/copy passes against each.
#[cfg_attr(feature = "trace", trace(prefix_enter = "", prefix_exit = ""))]
fn pass_blame(
    repo: &Repository,
    sb: &mut Scoreboard,
    origin: OriginId,
    options: &Options,
) -> Result<()> {
    let (commit, path, blob) = {
        let o = sb.origins.get(origin);
        (o.commit, o.path.clone(), o.blob)
    };
    let parents = parents_of(repo, commit, &options.grafts)?;
    let mut parent_origins: SmallVec<[Option<OriginId>; 2]> = smallvec![None; parents.len()];

    for (i, parent) in parents.iter().enumerate() {
        let porigin = match sb.origins.find_origin(repo, *parent, path.as_bstr())? {
            Some(po) => Some(po),
            None => renames::find_rename(
                repo,
                &mut sb.origins,
                *parent,
                commit,
                path.as_bstr(),
                blob,
            )?,
        };
        let porigin = match porigin {
            Some(po) => po,
            None => continue,
        };
        if sb.origins.get(porigin).blob == blob {
            // The parent has identical contents: hand every group over
            // without looking at a single diff.
            for e in &mut sb.ent {
                if e.suspect == origin {
                    e.suspect = porigin;
                }
            }
            return Ok(());
        }
        parent_origins[i] = Some(porigin);
    }

    for porigin in parent_origins.iter().flatten() {
        if pass_blame_to_parent(repo, sb, origin, *porigin)? {
            return Ok(());
        }
    }

    if options.detect.contains(Detect::Move) {
        for porigin in parent_origins.iter().flatten() {
            if find_move_in_parent(repo, sb, origin, *porigin, options)? {
                return Ok(());
            }
        }
    }

    if options.detect.contains(Detect::Copy) {
        for (i, parent) in parents.iter().enumerate() {
            if find_copy_in_parent(repo, sb, origin, *parent, parent_origins[i], options)? {
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Migrate every line range the diff proves unchanged between `parent` and
/// `target` one step up the graph. Returns `true` once nothing remains to be
/// done for `target`, so the caller can stop early.
fn pass_blame_to_parent(
    repo: &Repository,
    sb: &mut Scoreboard,
    target: OriginId,
    parent: OriginId,
) -> Result<bool> {
    let last_in_target = match sb.find_last_in_target(target) {
        Some(last) => last,
        None => return Ok(true),
    };

    let pre = blob_data(repo, sb.origins.get(parent).blob)?;
    let post = blob_data(repo, sb.origins.get(target).blob)?;
    let patch = chunks::diff_blobs(&pre, &post, 0);

    let (mut plno, mut tlno) = (0, 0);
    for chunk in &patch {
        sb.blame_chunk(tlno, plno, chunk.same, target, parent);
        plno = chunk.p_next;
        tlno = chunk.t_next;
    }
    // The rest, up to the last line of interest, is the same as the parent.
    sb.blame_chunk(tlno, plno, last_in_target, target, parent);

    Ok(false)
}

/// Search `parent_blob` for the best region matching `e`'s lines, diffing
/// with one line of context so that only certain matches count.
fn find_copy_in_blob(
    sb: &Scoreboard,
    e: &Entry,
    parent: OriginId,
    parent_blob: &[u8],
) -> Split {
    let slice = sb.file.line_bytes(e.lno..e.lno + e.num_lines);
    let patch = chunks::diff_blobs(parent_blob, slice, 1);

    let mut best = Split::default();
    let (mut plno, mut tlno) = (0u32, 0u32);
    for chunk in &patch {
        if e.num_lines <= tlno {
            break;
        }
        if tlno < chunk.same {
            // Slice lines [tlno, chunk.same) match the parent at plno.
            let this = split_overlap(e, tlno + e.s_lno, plno, chunk.same + e.s_lno, parent);
            split_if_better(&sb.file, &mut best, this);
        }
        plno = chunk.p_next;
        tlno = chunk.t_next;
    }
    if tlno < e.num_lines {
        // Anything after the final chunk matches the parent as well.
        let this = split_overlap(e, tlno + e.s_lno, plno, e.num_lines + e.s_lno, parent);
        split_if_better(&sb.file, &mut best, this);
    }
    best
}

/// The `-M` pass: re-attribute line runs that moved around within the
/// parent's version of the file.
fn find_move_in_parent(
    repo: &Repository,
    sb: &mut Scoreboard,
    target: OriginId,
    parent: OriginId,
    options: &Options,
) -> Result<bool> {
    if sb.find_last_in_target(target).is_none() {
        return Ok(true);
    }

    let parent_blob = blob_data(repo, sb.origins.get(parent).blob)?;
    let mut i = 0;
    while i < sb.ent.len() {
        let e = sb.ent[i];
        if !e.guilty && e.suspect == target {
            let mut split = find_copy_in_blob(sb, &e, parent, &parent_blob);
            let significant = match split.mid.as_mut() {
                Some(mid) => ent_score(&sb.file, mid) > options.move_score,
                None => false,
            };
            if significant {
                sb.split_blame(i, split);
            }
        }
        i += 1;
    }
    Ok(false)
}

/// The `-C` pass: re-attribute line runs copied from other files in the
/// parent. Candidate blobs are the parent side of every changed path, plus
/// unchanged parent files whose blob reappears verbatim in the target tree;
/// with [`Detect::CopyHarder`] every blob in the parent tree is considered.
fn find_copy_in_parent(
    repo: &Repository,
    sb: &mut Scoreboard,
    target: OriginId,
    parent: ObjectId,
    porigin: Option<OriginId>,
    options: &Options,
) -> Result<bool> {
    if sb.find_last_in_target(target).is_none() {
        return Ok(true);
    }

    let target_commit = sb.origins.get(target).commit;
    let porigin_path = porigin.map(|po| sb.origins.get(po).path.clone());

    let mut candidates: Vec<(BString, ObjectId)> = Vec::new();
    if options.detect.contains(Detect::CopyHarder) {
        candidates = renames::all_blobs(repo, parent)?;
    } else {
        let changes = renames::tree_changes(repo, parent, target_commit)?;
        for change in &changes {
            if let Some(prev_id) = change.prev_id {
                candidates.push((change.path.clone(), prev_id));
            }
        }
        let additions: Vec<ObjectId> = changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .filter_map(|c| c.id)
            .collect();
        if !additions.is_empty() {
            for (path, id) in renames::all_blobs(repo, parent)? {
                if additions.contains(&id) && !candidates.iter().any(|(p, _)| *p == path) {
                    candidates.push((path, id));
                }
            }
        }
    }
    // The move pass already dealt with the file itself.
    candidates.retain(|(p, _)| porigin_path.as_ref().map_or(true, |pp| pp != p));

    let mut blobs: Vec<(OriginId, Vec<u8>)> = Vec::new();
    for (path, _) in &candidates {
        if let Some(norigin) = sb.origins.find_origin(repo, parent, path.as_bstr())? {
            let data = blob_data(repo, sb.origins.get(norigin).blob)?;
            blobs.push((norigin, data));
        }
    }

    let mut i = 0;
    while i < sb.ent.len() {
        let e = sb.ent[i];
        if !e.guilty && e.suspect == target {
            let mut best = Split::default();
            for (norigin, data) in &blobs {
                let this = find_copy_in_blob(sb, &e, *norigin, data);
                split_if_better(&sb.file, &mut best, this);
            }
            let significant = match best.mid.as_mut() {
                Some(mid) => ent_score(&sb.file, mid) > options.copy_score,
                None => false,
            };
            if significant {
                sb.split_blame(i, best);
            }
        }
        i += 1;
    }
    Ok(false)
}

fn parents_of(
    repo: &Repository,
    commit: ObjectId,
    grafts: &Grafts,
) -> Result<SmallVec<[ObjectId; 2]>> {
    if let Some(parents) = grafts.parents_of(commit) {
        return Ok(parents.iter().copied().take(MAX_PARENTS).collect());
    }
    let commit = repo
        .find_object(commit)?
        .try_into_commit()
        .map_err(|e| Error::Commit(Box::new(e)))?;
    Ok(commit
        .parent_ids()
        .take(MAX_PARENTS)
        .map(|id| id.detach())
        .collect())
}

fn commit_time(repo: &Repository, commit: ObjectId) -> Result<i64> {
    let commit = repo
        .find_object(commit)?
        .try_into_commit()
        .map_err(|e| Error::Commit(Box::new(e)))?;
    let committer = commit
        .committer()
        .map_err(|e| Error::Commit(Box::new(e)))?;
    Ok(committer.time.seconds)
}

pub(crate) fn blob_data(repo: &Repository, blob: ObjectId) -> Result<Vec<u8>> {
    Ok(repo.find_object(blob)?.detach().data)
}
