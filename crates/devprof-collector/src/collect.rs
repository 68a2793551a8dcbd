//! Loading encoded device records gathered from many hosts.

use devprof_common::{CodecError, DeviceRecord, decode};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid device record: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("rank {rank} appears in both {first} and {second}")]
    DuplicateRank {
        rank: u32,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Decode every file and return the records ordered by rank
///
/// Fails on the first unreadable or invalid file, or when two files carry the same rank.
pub fn load_records<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<DeviceRecord>, CollectError> {
    let mut by_rank: BTreeMap<u32, (PathBuf, DeviceRecord)> = BTreeMap::new();

    for path in paths {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CollectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let record = decode(&bytes).map_err(|source| CollectError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            rank = record.rank,
            device = %record.device_name,
            "decoded record"
        );

        if let Some((first, _)) = by_rank.get(&record.rank) {
            return Err(CollectError::DuplicateRank {
                rank: record.rank,
                first: first.clone(),
                second: path.to_path_buf(),
            });
        }
        by_rank.insert(record.rank, (path.to_path_buf(), record));
    }

    Ok(by_rank.into_values().map(|(_, record)| record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devprof_common::encode;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, record: &DeviceRecord) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, encode(record)).unwrap();
        path
    }

    fn record(rank: u32, name: &str) -> DeviceRecord {
        let mut record = DeviceRecord::new(rank);
        record.device_name = name.into();
        record
    }

    #[test]
    fn sorts_by_rank() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write(&dir, "c", &record(2, "gamma")),
            write(&dir, "a", &record(0, "alpha")),
            write(&dir, "b", &record(1, "beta")),
        ];
        let records = load_records(&paths).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.device_name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn rejects_duplicate_ranks() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write(&dir, "a", &record(1, "alpha")),
            write(&dir, "b", &record(1, "beta")),
        ];
        match load_records(&paths) {
            Err(CollectError::DuplicateRank { rank, first, second }) => {
                assert_eq!(rank, 1);
                assert_eq!(first, paths[0]);
                assert_eq!(second, paths[1]);
            }
            other => panic!("expected duplicate rank, got {other:?}"),
        }
    }

    #[test]
    fn reports_the_offending_file() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good", &record(0, "alpha"));
        let bad = dir.path().join("bad");
        std::fs::write(&bad, b"not a record").unwrap();

        let err = load_records(&[good, bad.clone()]).unwrap_err();
        assert!(matches!(err, CollectError::Decode { ref path, .. } if *path == bad));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load_records(&[dir.path().join("absent")]).unwrap_err();
        assert!(matches!(err, CollectError::Read { .. }));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let none: [PathBuf; 0] = [];
        assert!(load_records(&none).unwrap().is_empty());
    }
}
