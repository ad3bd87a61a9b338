use gix::bstr::BString;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error produced if a blame cannot be obtained.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no such path {path} in {commit}")]
    PathMissing { path: BString, commit: gix::ObjectId },
    #[error("file {path} has only {lines} lines")]
    RangePastEndOfFile { path: BString, lines: u32 },
    #[error("malformed graft line {0:?}")]
    MalformedGraft(BString),
    #[error("reading graft file {path:?} failed: {source}")]
    GraftFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("error finding object: {0}")]
    FindObject(#[from] gix::odb::find::existing::Error),
    #[error("error peeling object: {0}")]
    Peel(#[from] gix::object::peel::to_kind::Error),
    #[error("error walking the history: {0}")]
    Walk(#[from] gix::revision::walk::Error),
    #[error("error traversing the history")]
    Traverse(#[source] BoxError),
    #[error("error reading commit metadata")]
    Commit(#[source] BoxError),
    #[error("error diffing trees")]
    TreeDiff(#[source] BoxError),
    #[error("error formatting date")]
    Date(#[source] BoxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
