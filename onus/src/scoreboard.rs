use gix::{bstr::BString, ObjectId};

use crate::lines::FileIndex;
use crate::origin::{OriginId, Origins};

/// A contiguous group of lines in the final image, accused of coming from one
/// suspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    /// First line of this group in the final file, zero-based.
    pub lno: u32,
    /// How many lines this group has.
    pub num_lines: u32,
    /// The origin currently accused of introducing this group.
    pub suspect: OriginId,
    /// Set once no ancestor of the suspect can explain the group.
    pub guilty: bool,
    /// First line of this group in the suspect's blob, zero-based.
    pub s_lno: u32,
    /// Cached significance of this group; 0 means "recompute".
    pub score: u32,
}

/// The pre/mid/post outcome of splitting one entry against an equivalence
/// region. An absent part would have had fewer than one line.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Split {
    pub pre: Option<Entry>,
    pub mid: Option<Entry>,
    pub post: Option<Entry>,
}

/// The full attribution state for one run.
///
/// `ent` tiles the blamed line range without gaps or overlap, ordered by
/// ascending `lno`.
#[derive(Debug)]
pub(crate) struct Scoreboard {
    pub final_commit: ObjectId,
    pub path: BString,
    pub file: FileIndex,
    pub ent: Vec<Entry>,
    pub origins: Origins,
}

/// Significance of an entry: one more than the number of alphanumeric bytes
/// on its lines in the final image. Cached on the entry.
pub(crate) fn ent_score(file: &FileIndex, e: &mut Entry) -> u32 {
    if e.score != 0 {
        return e.score;
    }
    let bytes = file.line_bytes(e.lno..e.lno + e.num_lines);
    let score = 1 + bytes.iter().filter(|b| b.is_ascii_alphanumeric()).count() as u32;
    e.score = score;
    score
}

/// Split `e` against the knowledge that its suspect's lines `[tlno, same)`
/// came from `parent`, with `plno` being the parent line corresponding to
/// `tlno`. Up to three parts result: lines before the region and after it
/// keep the old suspect, the overlap moves to the parent.
pub(crate) fn split_overlap(
    e: &Entry,
    tlno: u32,
    plno: u32,
    same: u32,
    parent: OriginId,
) -> Split {
    let mut split = Split::default();
    let mid_lno;
    let mid_s_lno;

    if e.s_lno < tlno {
        split.pre = Some(Entry {
            lno: e.lno,
            num_lines: tlno - e.s_lno,
            suspect: e.suspect,
            guilty: false,
            s_lno: e.s_lno,
            score: 0,
        });
        mid_lno = e.lno + (tlno - e.s_lno);
        mid_s_lno = plno;
    } else {
        mid_lno = e.lno;
        mid_s_lno = plno + (e.s_lno - tlno);
    }

    let chunk_end_lno = if same < e.s_lno + e.num_lines {
        split.post = Some(Entry {
            lno: e.lno + (same - e.s_lno),
            num_lines: e.s_lno + e.num_lines - same,
            suspect: e.suspect,
            guilty: false,
            s_lno: same,
            score: 0,
        });
        e.lno + (same - e.s_lno)
    } else {
        e.lno + e.num_lines
    };

    if chunk_end_lno > mid_lno {
        split.mid = Some(Entry {
            lno: mid_lno,
            num_lines: chunk_end_lno - mid_lno,
            suspect: parent,
            guilty: false,
            s_lno: mid_s_lno,
            score: 0,
        });
    }
    split
}

/// Keep `best` pointing at the split whose overlap is the most significant.
/// An equally good later candidate loses; the first one wins.
pub(crate) fn split_if_better(file: &FileIndex, best: &mut Split, mut this: Split) {
    let Some(this_mid) = this.mid.as_mut() else {
        return;
    };
    if let Some(best_mid) = best.mid.as_mut() {
        if ent_score(file, this_mid) <= ent_score(file, best_mid) {
            return;
        }
    }
    *best = this;
}

impl Scoreboard {
    /// Replace the entry at `idx` with the parts of `split`, in line order.
    /// The caller guarantees the overlap part exists.
    pub fn split_blame(&mut self, idx: usize, split: Split) {
        let parts = [split.pre, split.mid, split.post];
        self.ent.splice(idx..idx + 1, parts.into_iter().flatten());

        #[cfg(debug_assertions)]
        self.assert_contiguous();
    }

    /// Process one diff chunk: suspect lines `[tlno, same)` of `target` are
    /// known to equal parent lines starting at `plno`. Every intersecting
    /// non-guilty group accused of `target` is split accordingly.
    pub fn blame_chunk(
        &mut self,
        tlno: u32,
        plno: u32,
        same: u32,
        target: OriginId,
        parent: OriginId,
    ) {
        let mut i = 0;
        while i < self.ent.len() {
            let e = self.ent[i];
            if !e.guilty
                && e.suspect == target
                && same > e.s_lno
                && tlno < e.s_lno + e.num_lines
            {
                let split = split_overlap(&e, tlno, plno, same, parent);
                if split.mid.is_some() {
                    self.split_blame(i, split);
                }
            }
            i += 1;
        }
    }

    /// Merge adjacent groups that agree on suspect and guilt and are
    /// contiguous on the suspect side. Scores of merged groups are
    /// invalidated.
    pub fn coalesce(&mut self) {
        let mut i = 0;
        while i + 1 < self.ent.len() {
            let next = self.ent[i + 1];
            let e = &mut self.ent[i];
            if e.suspect == next.suspect
                && e.guilty == next.guilty
                && e.s_lno + e.num_lines == next.s_lno
            {
                e.num_lines += next.num_lines;
                e.score = 0;
                self.ent.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// The highest suspect-side end over non-guilty groups accused of
    /// `target`, or `None` if nothing remains to be done for it.
    pub fn find_last_in_target(&self, target: OriginId) -> Option<u32> {
        self.ent
            .iter()
            .filter(|e| !e.guilty && e.suspect == target)
            .map(|e| e.s_lno + e.num_lines)
            .max()
    }

    /// The ordering sanity check run after every split. A violation is an
    /// internal bug; dump the table and abort.
    #[cfg(debug_assertions)]
    pub fn assert_contiguous(&self) {
        let mut lno = self.ent.first().map_or(0, |e| e.lno);
        let corrupt = self.ent.iter().any(|e| {
            let bad = lno != e.lno || e.num_lines < 1;
            lno = e.lno + e.num_lines;
            bad
        });
        if corrupt {
            let mut lno = self.ent.first().map_or(0, |e| e.lno);
            for e in &self.ent {
                eprintln!("L {:8} l {:8} n {:8}", lno, e.lno, e.num_lines);
                lno = e.lno + e.num_lines;
            }
            panic!("blame entries are out of order");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn oid(digit: char) -> ObjectId {
        ObjectId::from_hex(digit.to_string().repeat(40).as_bytes()).expect("valid hex in tests")
    }

    fn board(lines: &[&str]) -> (Scoreboard, OriginId, OriginId) {
        let mut origins = Origins::default();
        let target = origins.intern(oid('2'), "file.txt".into(), oid('b'));
        let parent = origins.intern(oid('1'), "file.txt".into(), oid('a'));

        let buf = lines.concat().into_bytes();
        let file = FileIndex::new(buf);
        let num_lines = file.num_lines();

        let sb = Scoreboard {
            final_commit: oid('2'),
            path: "file.txt".into(),
            file,
            ent: vec![Entry {
                lno: 0,
                num_lines,
                suspect: target,
                guilty: false,
                s_lno: 0,
                score: 0,
            }],
            origins,
        };
        (sb, target, parent)
    }

    fn tiling(sb: &Scoreboard) -> Vec<(u32, u32)> {
        sb.ent.iter().map(|e| (e.lno, e.num_lines)).collect()
    }

    #[test]
    fn split_overlap_produces_all_three_parts() {
        let (sb, target, parent) = board(&["a\n", "b\n", "c\n", "d\n", "e\n"]);
        let e = sb.ent[0];

        let split = split_overlap(&e, 1, 7, 3, parent);
        let pre = split.pre.unwrap();
        let mid = split.mid.unwrap();
        let post = split.post.unwrap();

        assert_eq!((pre.lno, pre.num_lines, pre.s_lno), (0, 1, 0));
        assert_eq!(pre.suspect, target);
        assert_eq!((mid.lno, mid.num_lines, mid.s_lno), (1, 2, 7));
        assert_eq!(mid.suspect, parent);
        assert_eq!((post.lno, post.num_lines, post.s_lno), (3, 2, 3));
        assert_eq!(post.suspect, target);

        // Split exactness: the parts sum to the input.
        assert_eq!(pre.num_lines + mid.num_lines + post.num_lines, e.num_lines);
    }

    #[test]
    fn split_overlap_region_covering_everything() {
        let (sb, _, parent) = board(&["a\n", "b\n"]);
        let split = split_overlap(&sb.ent[0], 0, 4, 2, parent);

        assert!(split.pre.is_none());
        assert!(split.post.is_none());
        let mid = split.mid.unwrap();
        assert_eq!((mid.lno, mid.num_lines, mid.s_lno), (0, 2, 4));
    }

    #[test]
    fn split_overlap_region_starting_before_entry() {
        let (sb, _, parent) = board(&["a\n", "b\n", "c\n"]);
        // Region [0, 2) of a suspect whose entry starts at s_lno 0 but the
        // parent equivalence begins one line earlier in the parent.
        let mut e = sb.ent[0];
        e.s_lno = 1;
        let split = split_overlap(&e, 0, 5, 2, parent);

        assert!(split.pre.is_none());
        let mid = split.mid.unwrap();
        // Parent line of the first mid line is plno + (s_lno - tlno).
        assert_eq!(mid.s_lno, 6);
        let post = split.post.unwrap();
        assert_eq!((post.lno, post.num_lines), (1, 2));
    }

    #[test]
    fn blame_chunk_splits_and_preserves_tiling() {
        let (mut sb, target, parent) = board(&["a\n", "b\n", "c\n", "d\n", "e\n"]);
        sb.blame_chunk(1, 0, 3, target, parent);

        assert_eq!(tiling(&sb), vec![(0, 1), (1, 2), (3, 2)]);
        assert_eq!(sb.ent[1].suspect, parent);
        assert_eq!(sb.ent[0].suspect, target);
        assert_eq!(sb.ent[2].suspect, target);
    }

    #[test]
    fn blame_chunk_outside_entry_is_a_no_op() {
        let (mut sb, target, parent) = board(&["a\n", "b\n"]);
        let before = sb.ent.clone();
        sb.blame_chunk(2, 0, 2, target, parent);
        assert_eq!(sb.ent, before);
    }

    #[test]
    fn coalesce_merges_compatible_neighbors() {
        let (mut sb, target, parent) = board(&["a\n", "b\n", "c\n", "d\n"]);
        sb.blame_chunk(0, 0, 2, target, parent);
        sb.blame_chunk(2, 2, 4, target, parent);
        assert_eq!(tiling(&sb), vec![(0, 2), (2, 2)]);

        sb.coalesce();
        assert_eq!(tiling(&sb), vec![(0, 4)]);
        assert_eq!(sb.ent[0].suspect, parent);
        assert_eq!(sb.ent[0].score, 0);
    }

    #[test]
    fn coalesce_is_idempotent() {
        let (mut sb, target, parent) = board(&["a\n", "b\n", "c\n", "d\n"]);
        sb.blame_chunk(1, 1, 3, target, parent);
        sb.coalesce();
        let once = sb.ent.clone();
        sb.coalesce();
        assert_eq!(sb.ent, once);
    }

    #[test]
    fn coalesce_keeps_discontiguous_suspect_lines_apart() {
        let (mut sb, target, parent) = board(&["a\n", "b\n", "c\n"]);
        // Lines 0 and 2 both come from the parent but from non-adjacent
        // parent lines; they must not merge even once line 1 is also split.
        sb.blame_chunk(0, 5, 1, target, parent);
        sb.blame_chunk(2, 9, 3, target, parent);
        sb.coalesce();
        assert_eq!(tiling(&sb), vec![(0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn find_last_in_target_ignores_guilty_entries() {
        let (mut sb, target, parent) = board(&["a\n", "b\n", "c\n", "d\n"]);
        sb.blame_chunk(0, 0, 2, target, parent);

        assert_eq!(sb.find_last_in_target(target), Some(4));
        assert_eq!(sb.find_last_in_target(parent), Some(2));

        for e in &mut sb.ent {
            if e.suspect == target {
                e.guilty = true;
            }
        }
        assert_eq!(sb.find_last_in_target(target), None);
    }

    #[test]
    fn score_counts_alphanumerics_and_is_stable() {
        let (sb, ..) = board(&["ab cd!\n", "x1\n"]);
        let mut e = sb.ent[0];

        let first = ent_score(&sb.file, &mut e);
        assert_eq!(first, 1 + 6);
        assert_eq!(ent_score(&sb.file, &mut e), first);
    }

    #[test]
    fn better_split_wins_and_first_wins_ties() {
        let (sb, _, parent) = board(&["word\n", "word\n"]);
        let e = sb.ent[0];

        let one_line = split_overlap(&e, 0, 0, 1, parent);
        let both_lines = split_overlap(&e, 0, 0, 2, parent);

        let mut best = Split::default();
        split_if_better(&sb.file, &mut best, one_line);
        split_if_better(&sb.file, &mut best, both_lines);
        assert_eq!(best.mid.unwrap().num_lines, 2);

        // A later candidate with the same score does not displace the first.
        let mut best = Split::default();
        let first = split_overlap(&e, 0, 0, 1, parent);
        let second = split_overlap(&e, 1, 1, 2, parent);
        split_if_better(&sb.file, &mut best, first);
        split_if_better(&sb.file, &mut best, second);
        assert_eq!(best.mid.unwrap().s_lno, 0);
    }
}
