use std::collections::HashMap;

use gix::{
    bstr::{BStr, BString},
    ObjectId, Repository,
};

use crate::Result;

/// One blob in a commit: the triple a group of lines can be blamed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Origin {
    pub commit: ObjectId,
    pub path: BString,
    pub blob: ObjectId,
}

/// Handle to an interned [`Origin`]. Identity comparison of two handles is
/// identity comparison of the origins themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OriginId(u32);

/// Interns origins so that at most one instance exists per `(commit, path)`
/// for the duration of a run.
#[derive(Debug, Default)]
pub(crate) struct Origins {
    all: Vec<Origin>,
    by_key: HashMap<(ObjectId, BString), OriginId>,
}

impl Origins {
    pub fn get(&self, id: OriginId) -> &Origin {
        &self.all[id.0 as usize]
    }

    /// Look up or create the origin for `path` in `commit`.
    ///
    /// Returns `None` if the path does not exist in the commit's tree or does
    /// not point at a blob; the caller treats that as the commit having no
    /// comparable version of the file.
    pub fn find_origin(
        &mut self,
        repo: &Repository,
        commit: ObjectId,
        path: &BStr,
    ) -> Result<Option<OriginId>> {
        if let Some(id) = self.by_key.get(&(commit, path.to_owned())) {
            return Ok(Some(*id));
        }

        let tree = repo.find_object(commit)?.peel_to_tree()?;
        let mut buf = Vec::new();
        let entry = match tree.lookup_entry_by_path(gix::path::from_bstr(path), &mut buf)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if !entry.mode().is_blob() {
            return Ok(None);
        }

        Ok(Some(self.intern(commit, path.to_owned(), entry.object_id())))
    }

    pub(crate) fn intern(&mut self, commit: ObjectId, path: BString, blob: ObjectId) -> OriginId {
        let id = OriginId(self.all.len() as u32);
        self.all.push(Origin {
            commit,
            path: path.clone(),
            blob,
        });
        self.by_key.insert((commit, path), id);
        id
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
    fn interning_is_stable() {
        let mut origins = Origins::default();
        let a = origins.intern(oid('1'), "file.txt".into(), oid('a'));
        let b = origins.intern(oid('2'), "file.txt".into(), oid('a'));

        assert_ne!(a, b);
        assert_eq!(origins.get(a).commit, oid('1'));
        assert_eq!(origins.get(b).commit, oid('2'));
        assert_eq!(origins.get(a).blob, origins.get(b).blob);
    }
}
