use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use gix::{revision::plumbing::Spec, ObjectId, Repository};

use flagset::FlagSet;
use onus::output::{self, Show};
use onus::{Detect, Grafts, Options};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use the same output mode as git-annotate
    #[arg(short = 'c')]
    compatibility: bool,

    /// Show long commit SHA1
    #[arg(short = 'l')]
    long: bool,

    /// Show raw timestamp
    #[arg(short = 't')]
    time: bool,

    /// Show original filename
    #[arg(short = 'f', long = "show-name")]
    show_name: bool,

    /// Show original linenumber
    #[arg(short = 'n', long = "show-number")]
    show_number: bool,

    /// Show in a format designed for machine consumption
    #[arg(short = 'p', long = "porcelain")]
    porcelain: bool,

    /// Show each group's significance score
    #[arg(long = "score-debug")]
    score_debug: bool,

    /// Process only line range n,m, counting from 1
    #[arg(short = 'L', value_name = "n,m")]
    line_range: Option<String>,

    /// Read ancestry overrides from revs-file instead of the real parents
    #[arg(short = 'S', value_name = "revs-file")]
    revs_file: Option<PathBuf>,

    /// Find line movements within the file, above an optional score
    #[arg(short = 'M', value_name = "score", num_args = 0..=1, default_missing_value = "0")]
    detect_move: Option<u32>,

    /// Find copied lines across files; give twice to search all files
    #[arg(
        short = 'C',
        value_name = "score",
        num_args = 0..=1,
        default_missing_value = "0",
        action = ArgAction::Append
    )]
    detect_copy: Vec<u32>,

    /// Don't dig past commits committed before this epoch second
    #[arg(long = "since", value_name = "epoch")]
    since: Option<i64>,

    /// Revisions to dig from, and the path unless it follows `--`
    #[arg(value_name = "rev|path")]
    args: Vec<String>,

    /// The path to annotate, after `--`
    #[arg(last = true, value_name = "path")]
    trailing: Vec<String>,
}

const USAGE: &str = "usage: pickaxe [options] [rev...] [--] path";

fn has_path_in_work_tree(path: &str) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Sort the positional words into revision arguments and the one path.
///
/// With `--` everything before it is a revision and exactly one path follows
/// (a trailing revision is allowed if no other was given). Without it the
/// accepted forms are `<path>`, `<path> <rev>` and `<rev> <path>`, told apart
/// by which of the two words exists in the working tree.
fn resolve_revs_and_path(cli: &Cli) -> anyhow::Result<(Vec<String>, String)> {
    if !cli.trailing.is_empty() {
        return match cli.trailing.as_slice() {
            [path] => Ok((cli.args.clone(), path.clone())),
            [path, rev] if cli.args.is_empty() => Ok((vec![rev.clone()], path.clone())),
            _ => bail!("{USAGE}"),
        };
    }

    match cli.args.as_slice() {
        [path] => {
            if !has_path_in_work_tree(path) {
                bail!("cannot stat path {path}");
            }
            Ok((Vec::new(), path.clone()))
        }
        [first, second] => {
            let (path, rev) = if has_path_in_work_tree(first) {
                (first, second)
            } else {
                (second, first)
            };
            if !has_path_in_work_tree(path) {
                bail!("cannot stat path {path}");
            }
            Ok((vec![rev.clone()], path.clone()))
        }
        _ => bail!("{USAGE}"),
    }
}

fn peel_to_commit(repo: &Repository, id: ObjectId, name: &str) -> anyhow::Result<ObjectId> {
    let object = repo
        .find_object(id)?
        .peel_to_kind(gix::object::Kind::Commit)
        .with_context(|| format!("non-commit {name}?"))?;
    Ok(object.id)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (revs, path) = resolve_revs_and_path(&cli)?;

    let repo = gix::discover(".")?;

    let mut tips: Vec<(ObjectId, String)> = Vec::new();
    let mut ends: Vec<ObjectId> = Vec::new();
    for rev in &revs {
        match repo.rev_parse(rev.as_str())?.detach() {
            Spec::Include(id) => tips.push((id, rev.clone())),
            Spec::Exclude(id) => ends.push(id),
            Spec::Range { from, to } => {
                tips.push((to, rev.clone()));
                ends.push(from);
            }
            _ => bail!("unsupported revision specification: {rev}"),
        }
    }
    if let [(_, one), (_, two), ..] = tips.as_slice() {
        bail!("more than one commit to dig from: {one} and {two}");
    }
    let start = match tips.pop() {
        Some((id, name)) => peel_to_commit(&repo, id, &name)?,
        None => {
            let id = repo
                .rev_parse_single("HEAD")
                .context("no such ref: HEAD")?
                .detach();
            peel_to_commit(&repo, id, "HEAD")?
        }
    };

    let mut detect = FlagSet::<Detect>::default();
    let mut move_score = onus::DEFAULT_MOVE_SCORE;
    let mut copy_score = onus::DEFAULT_COPY_SCORE;
    if let Some(score) = cli.detect_move {
        detect |= Detect::Move;
        if score > 0 {
            move_score = score;
        }
    }
    if let Some(last) = cli.detect_copy.last() {
        detect |= Detect::Copy | Detect::Move;
        if cli.detect_copy.len() > 1 {
            detect |= Detect::CopyHarder;
        }
        if *last > 0 {
            copy_score = *last;
        }
    }

    let range = match &cli.line_range {
        None => None,
        Some(spec) => Some(parse_line_range(spec)?),
    };
    let grafts = match &cli.revs_file {
        Some(file) => Grafts::from_path(file)?,
        None => Grafts::default(),
    };

    let options = Options {
        detect,
        move_score,
        copy_score,
        range,
        since: cli.since,
        grafts,
    };
    let blame = onus::blame_file(&repo, start, &ends, Path::new(&path), &options)?;

    let mut show = FlagSet::<Show>::default();
    if cli.compatibility {
        show |= Show::AnnotateCompat;
    }
    if cli.long {
        show |= Show::LongObjectName;
    }
    if cli.time {
        show |= Show::RawTimestamp;
    }
    if cli.porcelain {
        show |= Show::Porcelain;
    }
    if cli.show_name {
        show |= Show::Name;
    }
    if cli.show_number {
        show |= Show::Number;
    }
    if cli.score_debug {
        show |= Show::Score;
    }

    let align = if show.contains(Show::Porcelain) {
        output::Alignment::default()
    } else {
        output::find_alignment(&repo, &blame, &mut show)?
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::output(&repo, &blame, show, &align, &mut out)?;

    Ok(())
}

fn parse_line_range(spec: &str) -> anyhow::Result<(u32, u32)> {
    let parsed = match spec.split_once(',') {
        Some((bottom, top)) => bottom
            .trim()
            .parse()
            .and_then(|b| top.trim().parse().map(|t| (b, t))),
        None => spec.trim().parse().map(|b| (b, 0)),
    };
    parsed.with_context(|| format!("malformed line range {spec:?}"))
}
