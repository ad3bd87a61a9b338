use std::ops::Range;

use gix::diff::blob::{
    diff, intern::InternedInput, sources::byte_lines_with_terminator, Algorithm, Sink,
};

/// One non-equal region between two blobs.
///
/// Everything in the postimage strictly below `same` is identical to the
/// preimage lines leading up to the region. After the region, the next
/// unexamined preimage line is `p_next` and the next postimage line is
/// `t_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub same: u32,
    pub p_next: u32,
    pub t_next: u32,
}

/// Collects diff output into a chunk list.
///
/// With a nonzero `context`, two changes whose equal gap is at most twice the
/// context width would share a hunk in unified-diff output; they are merged
/// into one chunk here, keeping the first change's `same` boundary and the
/// last change's end. The merged chunk then spans the interior equal run,
/// which keeps short certain-looking gaps from being claimed.
pub(crate) struct ChunkCollector {
    chunks: Vec<Chunk>,
    context: u32,
}

impl ChunkCollector {
    fn new(context: u32) -> Self {
        Self {
            chunks: Vec::new(),
            context,
        }
    }
}

impl Sink for ChunkCollector {
    type Out = Vec<Chunk>;

    fn process_change(&mut self, before: Range<u32>, after: Range<u32>) {
        if self.context > 0 {
            if let Some(last) = self.chunks.last_mut() {
                if after.start - last.t_next <= 2 * self.context {
                    last.p_next = before.end;
                    last.t_next = after.end;
                    return;
                }
            }
        }
        self.chunks.push(Chunk {
            same: after.start,
            p_next: before.end,
            t_next: after.end,
        });
    }

    fn finish(self) -> Self::Out {
        self.chunks
    }
}

/// Textually diff two blobs and return the normalized chunk list.
pub(crate) fn diff_blobs(pre: &[u8], post: &[u8], context: u32) -> Vec<Chunk> {
    let input = InternedInput::new(
        byte_lines_with_terminator(pre),
        byte_lines_with_terminator(post),
    );
    diff(Algorithm::Histogram, &input, ChunkCollector::new(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_blobs_yield_no_chunks() {
        assert_eq!(diff_blobs(b"a\nb\n", b"a\nb\n", 0), vec![]);
    }

    #[test]
    fn replaced_line() {
        let chunks = diff_blobs(b"a\nb\nc\n", b"a\nx\nc\n", 0);
        assert_eq!(
            chunks,
            vec![Chunk {
                same: 1,
                p_next: 2,
                t_next: 2,
            }]
        );
    }

    #[test]
    fn appended_lines() {
        let chunks = diff_blobs(b"a\nb\n", b"a\nb\nc\nd\n", 0);
        assert_eq!(
            chunks,
            vec![Chunk {
                same: 2,
                p_next: 2,
                t_next: 4,
            }]
        );
    }

    #[test]
    fn deleted_leading_line() {
        let chunks = diff_blobs(b"a\nb\nc\n", b"b\nc\n", 0);
        assert_eq!(
            chunks,
            vec![Chunk {
                same: 0,
                p_next: 1,
                t_next: 0,
            }]
        );
    }

    #[test]
    fn inserted_middle_line() {
        let chunks = diff_blobs(b"a\nc\n", b"a\nb\nc\n", 0);
        assert_eq!(
            chunks,
            vec![Chunk {
                same: 1,
                p_next: 1,
                t_next: 2,
            }]
        );
    }

    #[test]
    fn without_context_nearby_changes_stay_apart() {
        let chunks = diff_blobs(b"a\nb\nc\nd\ne\n", b"a\nX\nc\nY\ne\n", 0);
        assert_eq!(
            chunks,
            vec![
                Chunk {
                    same: 1,
                    p_next: 2,
                    t_next: 2,
                },
                Chunk {
                    same: 3,
                    p_next: 4,
                    t_next: 4,
                },
            ]
        );
    }

    #[test]
    fn context_merges_changes_sharing_a_hunk() {
        let chunks = diff_blobs(b"a\nb\nc\nd\ne\n", b"a\nX\nc\nY\ne\n", 1);
        assert_eq!(
            chunks,
            vec![Chunk {
                same: 1,
                p_next: 4,
                t_next: 4,
            }]
        );
    }

    #[test]
    fn context_keeps_distant_changes_apart() {
        let chunks = diff_blobs(
            b"a\nb\nc\nd\ne\nf\ng\n",
            b"a\nX\nc\nd\ne\nf\nY\n",
            1,
        );
        assert_eq!(
            chunks,
            vec![
                Chunk {
                    same: 1,
                    p_next: 2,
                    t_next: 2,
                },
                Chunk {
                    same: 6,
                    p_next: 7,
                    t_next: 7,
                },
            ]
        );
    }
}
