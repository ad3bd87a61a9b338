//! Line-level provenance for files in a Git repository.
//!
//! This crate answers, for every line of a file at a given commit, which
//! historical commit most recently introduced it. It does not use Git (or
//! libgit2 or ...) under the hood but rather [gitoxide], whose object
//! database, tree diffing and revision parsing it builds on.
//!
//! Attribution starts from the full file accused of the starting commit and
//! repeatedly diffs suspects against their parents, peeling off line ranges a
//! parent can explain, until every line sticks to the commit that created it.
//! Renamed predecessors are followed automatically; searching for lines moved
//! within a file or copied from other files is optional, see
//! [`Detect`]. The main interface is [`blame_file`]; rendering of the result
//! lives in [`output`].
//!
//! [gitoxide]: https://github.com/Byron/gitoxide

mod chunks;
mod engine;
mod error;
mod grafts;
mod lines;
mod origin;
pub mod output;
mod renames;
mod scoreboard;

pub use engine::{
    blame_file, Blame, BlameEntry, BlamedLine, Detect, Options, DEFAULT_COPY_SCORE,
    DEFAULT_MOVE_SCORE, MAX_PARENTS,
};
pub use error::{Error, Result};
pub use grafts::Grafts;

pub use flagset::FlagSet;
