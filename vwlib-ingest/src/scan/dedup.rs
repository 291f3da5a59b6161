//! Duplicate folder detection
//!
//! Two folders carrying the same catalog code would race to insert the
//! same primary key, so exactly one folder per id goes forward. Candidates
//! are sorted by absolute path first, making the pick deterministic across
//! filesystem enumeration orders; the last one wins.

use super::walker::WorkFolder;
use std::collections::BTreeMap;
use vwlib_common::rcode::WorkId;

/// Result of deduplicating discovered folders
#[derive(Debug, Default)]
pub struct Deduped {
    /// Exactly one folder per distinct id
    pub unique: Vec<WorkFolder>,
    /// For ids seen more than once: the folders that were passed over
    pub duplicates: Vec<(WorkId, Vec<WorkFolder>)>,
}

/// Group folders by id and pick one winner per id
pub fn dedup_folders(mut folders: Vec<WorkFolder>) -> Deduped {
    folders.sort_by(|a, b| a.absolute.cmp(&b.absolute));

    let mut groups: BTreeMap<WorkId, Vec<WorkFolder>> = BTreeMap::new();
    for folder in folders {
        groups.entry(folder.id).or_default().push(folder);
    }

    let mut result = Deduped::default();
    for (id, mut group) in groups {
        // sorted by path above; keep the last
        let Some(winner) = group.pop() else {
            continue;
        };
        if !group.is_empty() {
            result.duplicates.push((id, group));
        }
        result.unique.push(winner);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn folder(code: &str, path: &str) -> WorkFolder {
        WorkFolder {
            id: WorkId::parse(code).unwrap(),
            root_name: "main".to_string(),
            absolute: PathBuf::from(path),
            relative: PathBuf::from(path).file_name().map(PathBuf::from).unwrap(),
        }
    }

    #[test]
    fn shared_id_keeps_exactly_one_folder() {
        // 3 folders share RJ111111, 2 more have unique ids
        let folders = vec![
            folder("RJ111111", "/lib/b/RJ111111"),
            folder("RJ222222", "/lib/RJ222222"),
            folder("RJ111111", "/lib/a/RJ111111"),
            folder("RJ111111", "/lib/c/RJ111111"),
            folder("RJ333333", "/lib/RJ333333"),
        ];

        let deduped = dedup_folders(folders);

        assert_eq!(deduped.unique.len(), 3, "M unique ids + 1 shared id");
        assert_eq!(deduped.duplicates.len(), 1);
        let (id, losers) = &deduped.duplicates[0];
        assert_eq!(id.code(), "RJ111111");
        assert_eq!(losers.len(), 2);
    }

    #[test]
    fn winner_is_deterministic_regardless_of_input_order() {
        let a = vec![
            folder("RJ111111", "/lib/a/RJ111111"),
            folder("RJ111111", "/lib/b/RJ111111"),
        ];
        let b = vec![
            folder("RJ111111", "/lib/b/RJ111111"),
            folder("RJ111111", "/lib/a/RJ111111"),
        ];

        let winner_a = dedup_folders(a).unique[0].absolute.clone();
        let winner_b = dedup_folders(b).unique[0].absolute.clone();
        assert_eq!(winner_a, winner_b);
        assert_eq!(winner_a, PathBuf::from("/lib/b/RJ111111"));
    }

    #[test]
    fn no_duplicates_passes_everything_through() {
        let folders = vec![
            folder("RJ111111", "/lib/RJ111111"),
            folder("RJ222222", "/lib/RJ222222"),
        ];
        let deduped = dedup_folders(folders);
        assert_eq!(deduped.unique.len(), 2);
        assert!(deduped.duplicates.is_empty());
    }
}
