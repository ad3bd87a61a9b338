use std::collections::HashMap;
use std::path::Path;

use gix::{bstr::ByteSlice, ObjectId};
use smallvec::SmallVec;

use crate::error::Error;
use crate::Result;

/// Ancestry overrides read from a graft file.
///
/// The format is one line per commit: `commit_hex parent_hex parent_hex …`.
/// A grafted commit's recorded parents replace its real ones during
/// attribution.
#[derive(Debug, Default)]
pub struct Grafts {
    parents: HashMap<ObjectId, SmallVec<[ObjectId; 2]>>,
}

impl Grafts {
    pub fn from_path(path: &Path) -> Result<Self> {
        let buf = std::fs::read(path).map_err(|source| Error::GraftFile {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&buf)
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        let mut parents = HashMap::new();
        for line in buf.lines() {
            if line.is_empty() {
                continue;
            }
            let mut ids = line
                .fields()
                .map(ObjectId::from_hex)
                .collect::<std::result::Result<SmallVec<[ObjectId; 2]>, _>>()
                .map_err(|_| Error::MalformedGraft(line.into()))?;
            if ids.is_empty() {
                return Err(Error::MalformedGraft(line.into()));
            }
            let commit = ids.remove(0);
            parents.insert(commit, ids);
        }
        Ok(Self { parents })
    }

    pub(crate) fn parents_of(&self, commit: ObjectId) -> Option<&[ObjectId]> {
        self.parents.get(&commit).map(|p| p.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn oid(digit: char) -> ObjectId {
        ObjectId::from_hex(digit.to_string().repeat(40).as_bytes()).expect("valid hex in tests")
    }

    #[test]
    fn parses_commit_and_parents() {
        let one = "1".repeat(40);
        let two = "2".repeat(40);
        let three = "3".repeat(40);
        let grafts =
            Grafts::parse(format!("{one} {two} {three}\n{two}\n").as_bytes()).unwrap();

        assert_eq!(grafts.parents_of(oid('1')), Some(&[oid('2'), oid('3')][..]));
        assert_eq!(grafts.parents_of(oid('2')), Some(&[][..]));
        assert_eq!(grafts.parents_of(oid('3')), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Grafts::parse(b"not hex at all\n"),
            Err(Error::MalformedGraft(_))
        ));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let grafts = Grafts::parse(b"\n\n").unwrap();
        assert_eq!(grafts.parents_of(oid('1')), None);
    }
}
