//! Rendering of a finished [`Blame`] in the formats the program knows:
//! the default annotated listing, the `annotate` compatibility mode, and the
//! machine-readable porcelain.

use std::collections::{HashMap, HashSet};
use std::io;

use flagset::{flags, FlagSet};
use gix::{
    bstr::{BStr, BString, ByteSlice},
    ObjectId, Repository,
};
use time::macros::format_description;

use crate::engine::{Blame, BlameEntry};
use crate::error::Error;
use crate::Result;

flags! {
    /// What to show, and how.
    pub enum Show: u32 {
        /// The output mode of `git-annotate`.
        AnnotateCompat,
        /// Unabbreviated commit ids.
        LongObjectName,
        /// Raw timestamps instead of formatted dates.
        RawTimestamp,
        /// The machine-readable format.
        Porcelain,
        /// The filename the group was blamed on.
        Name,
        /// The group's line number in the blamed commit's file version.
        Number,
        /// The group's significance score.
        Score,
    }
}

/// Commit metadata needed for display.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub author: BString,
    pub author_mail: BString,
    pub author_time: i64,
    pub author_tz: BString,
    pub committer: BString,
    pub committer_mail: BString,
    pub committer_time: i64,
    pub committer_tz: BString,
    pub summary: BString,
}

/// Column widths for the annotated listing, computed in one scan so that no
/// process-wide state is needed.
#[derive(Debug, Default, Clone)]
pub struct Alignment {
    longest_file: usize,
    longest_author: usize,
    max_orig_digits: usize,
    max_digits: usize,
    max_score_digits: usize,
}

fn zone(time: &gix::date::Time) -> BString {
    let sign = match time.sign {
        gix::date::time::Sign::Plus => '+',
        gix::date::time::Sign::Minus => '-',
    };
    let offset = time.offset.abs();
    format!("{sign}{:02}{:02}", offset / 3600, (offset % 3600) / 60).into()
}

fn commit_info(repo: &Repository, id: ObjectId) -> Result<CommitInfo> {
    let commit = repo
        .find_object(id)?
        .try_into_commit()
        .map_err(|e| Error::Commit(Box::new(e)))?;
    let author = commit.author().map_err(|e| Error::Commit(Box::new(e)))?;
    let committer = commit
        .committer()
        .map_err(|e| Error::Commit(Box::new(e)))?;
    let summary = BString::from(
        commit
            .message()
            .map_err(|e| Error::Commit(Box::new(e)))?
            .summary()
            .as_ref(),
    );

    Ok(CommitInfo {
        author: author.name.to_owned(),
        author_mail: format!("<{}>", author.email).into(),
        author_time: author.time.seconds,
        author_tz: zone(&author.time),
        committer: committer.name.to_owned(),
        committer_mail: format!("<{}>", committer.email).into(),
        committer_time: committer.time.seconds,
        committer_tz: zone(&committer.time),
        summary,
    })
}

/// Format an epoch timestamp in the zone it was recorded in, `±HHMM` style,
/// or raw when asked to.
pub fn format_time(seconds: i64, tz: &BStr, raw: bool) -> Result<String> {
    if raw {
        return Ok(format!("{seconds} {tz}"));
    }

    let minutes = tz
        .to_str()
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .map(|tz| {
            let magnitude = tz.abs();
            let minutes = (magnitude / 100) * 60 + magnitude % 100;
            if tz < 0 {
                -minutes
            } else {
                minutes
            }
        })
        .unwrap_or_default();

    let local = time::OffsetDateTime::from_unix_timestamp(seconds + i64::from(minutes) * 60)
        .map_err(|e| Error::Date(Box::new(e)))?;
    let formatted = local
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .map_err(|e| Error::Date(Box::new(e)))?;
    Ok(format!("{formatted} {tz}"))
}

fn lineno_width(lines: u32) -> usize {
    let mut width = 1;
    let mut i = 10u64;
    while i <= u64::from(lines) + 1 {
        width += 1;
        i *= 10;
    }
    width
}

/// Scan the final attribution once to size the output columns, turning on
/// filename display if any group was blamed across a rename or copy.
pub fn find_alignment(
    repo: &Repository,
    blame: &Blame,
    opts: &mut FlagSet<Show>,
) -> Result<Alignment> {
    let mut align = Alignment::default();
    let mut longest_src_lines = 0;
    let mut longest_dst_lines = 0;
    let mut largest_score = 0;
    let mut seen = HashSet::new();

    for e in blame.entries() {
        if seen.insert(e.commit) {
            let info = commit_info(repo, e.commit)?;
            if e.path != blame.path {
                *opts |= Show::Name;
            }
            align.longest_file = align.longest_file.max(e.path.len());
            align.longest_author = align.longest_author.max(info.author.len());
        }
        longest_src_lines = longest_src_lines.max(e.s_lno + e.num_lines);
        longest_dst_lines = longest_dst_lines.max(e.lno + e.num_lines);
        largest_score = largest_score.max(e.score);
    }

    align.max_orig_digits = lineno_width(longest_src_lines);
    align.max_digits = lineno_width(longest_dst_lines);
    align.max_score_digits = lineno_width(largest_score);
    Ok(align)
}

/// Emit the whole attribution to `out`, one line per blamed line.
pub fn output(
    repo: &Repository,
    blame: &Blame,
    opts: FlagSet<Show>,
    align: &Alignment,
    out: &mut impl io::Write,
) -> Result<()> {
    let mut cache: HashMap<ObjectId, CommitInfo> = HashMap::new();

    if opts.contains(Show::Porcelain) {
        // A commit blamed under several paths must repeat its filename.
        let mut first_path: HashMap<ObjectId, &BStr> = HashMap::new();
        let mut multi_path: HashSet<ObjectId> = HashSet::new();
        for e in blame.entries() {
            match first_path.get(&e.commit) {
                Some(path) if *path != e.path.as_bstr() => {
                    multi_path.insert(e.commit);
                }
                Some(_) => {}
                None => {
                    first_path.insert(e.commit, e.path.as_bstr());
                }
            }
        }

        let mut shown = HashSet::new();
        for e in blame.entries() {
            let info = cached(&mut cache, repo, e.commit)?;
            emit_porcelain(blame, e, info, &mut shown, &multi_path, out)?;
        }
    } else {
        for e in blame.entries() {
            let info = cached(&mut cache, repo, e.commit)?;
            emit_other(blame, e, info, opts, align, out)?;
        }
    }
    Ok(())
}

fn cached<'a>(
    cache: &'a mut HashMap<ObjectId, CommitInfo>,
    repo: &Repository,
    id: ObjectId,
) -> Result<&'a CommitInfo> {
    if !cache.contains_key(&id) {
        let info = commit_info(repo, id)?;
        cache.insert(id, info);
    }
    Ok(&cache[&id])
}

fn emit_porcelain(
    blame: &Blame,
    e: &BlameEntry,
    info: &CommitInfo,
    shown: &mut HashSet<ObjectId>,
    multi_path: &HashSet<ObjectId>,
    out: &mut impl io::Write,
) -> Result<()> {
    writeln!(
        out,
        "{} {} {} {}",
        e.commit,
        e.s_lno + 1,
        e.lno + 1,
        e.num_lines
    )?;
    if shown.insert(e.commit) {
        writeln!(out, "author {}", info.author)?;
        writeln!(out, "author-mail {}", info.author_mail)?;
        writeln!(out, "author-time {}", info.author_time)?;
        writeln!(out, "author-tz {}", info.author_tz)?;
        writeln!(out, "committer {}", info.committer)?;
        writeln!(out, "committer-mail {}", info.committer_mail)?;
        writeln!(out, "committer-time {}", info.committer_time)?;
        writeln!(out, "committer-tz {}", info.committer_tz)?;
        writeln!(out, "filename {}", e.path)?;
        writeln!(out, "summary {}", info.summary)?;
    } else if multi_path.contains(&e.commit) {
        writeln!(out, "filename {}", e.path)?;
    }

    for cnt in 0..e.num_lines {
        if cnt > 0 {
            writeln!(out, "{} {} {}", e.commit, e.s_lno + 1 + cnt, e.lno + 1 + cnt)?;
        }
        out.write_all(b"\t")?;
        out.write_all(blame.file.line(e.lno + cnt))?;
    }
    Ok(())
}

fn emit_other(
    blame: &Blame,
    e: &BlameEntry,
    info: &CommitInfo,
    opts: FlagSet<Show>,
    align: &Alignment,
    out: &mut impl io::Write,
) -> Result<()> {
    let hex = if opts.contains(Show::LongObjectName) {
        e.commit.to_string()
    } else {
        e.commit.to_hex_with_len(8).to_string()
    };
    let raw = opts.contains(Show::RawTimestamp);
    let author = info.author.to_str_lossy();
    let date = format_time(info.author_time, info.author_tz.as_bstr(), raw)?;

    for cnt in 0..e.num_lines {
        write!(out, "{hex}")?;
        if opts.contains(Show::AnnotateCompat) {
            write!(out, "\t({:>10}\t{:>10}\t{})", author, date, e.lno + 1 + cnt)?;
        } else {
            if opts.contains(Show::Score) {
                write!(out, " {:>width$}", e.score, width = align.max_score_digits)?;
            }
            if opts.contains(Show::Name) {
                let path = e.path.to_str_lossy();
                write!(
                    out,
                    " {:<width$.width$}",
                    path,
                    width = align.longest_file
                )?;
            }
            if opts.contains(Show::Number) {
                write!(
                    out,
                    " {:>width$}",
                    e.s_lno + 1 + cnt,
                    width = align.max_orig_digits
                )?;
            }
            write!(
                out,
                " ({:<author_width$.author_width$} {:>10} {:>line_width$}) ",
                author,
                date,
                e.lno + 1 + cnt,
                author_width = align.longest_author,
                line_width = align.max_digits
            )?;
        }
        out.write_all(blame.file.line(e.lno + cnt))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, 1; "zero")]
    #[test_case(8, 1; "below one digit boundary")]
    #[test_case(9, 2; "boundary counts the next line")]
    #[test_case(42, 2; "two digits")]
    #[test_case(99, 3; "conservative at the boundary")]
    #[test_case(12345, 5; "five digits")]
    fn lineno_widths(lines: u32, expect: usize) {
        assert_eq!(lineno_width(lines), expect);
    }

    #[test]
    fn raw_time_is_epoch_and_zone() {
        let s = format_time(1_112_911_993, b"-0700".as_bstr(), true).unwrap();
        assert_eq!(s, "1112911993 -0700");
    }

    #[test]
    fn formatted_time_is_shifted_into_the_zone() {
        // 2005-04-07 22:13:13 UTC, recorded at -0700.
        let s = format_time(1_112_911_993, b"-0700".as_bstr(), false).unwrap();
        assert_eq!(s, "2005-04-07 15:13:13 -0700");
    }

    #[test]
    fn formatted_time_with_positive_zone() {
        let s = format_time(0, b"+0130".as_bstr(), false).unwrap();
        assert_eq!(s, "1970-01-01 01:30:00 +0130");
    }
}
