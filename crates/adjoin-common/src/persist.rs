//! JSON records in the state directory.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

fn invalid_data(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, io::Error> {
    let raw = std::fs::read(path)?;
    serde_json::from_slice(&raw).map_err(invalid_data)
}

/// `Ok(None)` when the file does not exist; any other failure is an error.
pub fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, io::Error> {
    match read_json(path) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Sibling path the record is staged in before the rename.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Replace `path` with `contents` via a synced staging file and a rename,
/// so readers on a shared volume never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    let written = File::create(&staging).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| std::fs::rename(&staging, path)) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}

/// Write `value` as pretty JSON with [`write_atomic`].
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), io::Error> {
    let mut json = serde_json::to_vec_pretty(value).map_err(invalid_data)?;
    json.push(b'\n');
    write_atomic(path, &json)
}

/// Remove a file, treating "already gone" as success. Returns whether it
/// existed.
pub fn remove_if_exists(path: &Path) -> Result<bool, io::Error> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        realm: String,
        hostname: String,
    }

    fn record() -> Record {
        Record {
            realm: "EXAMPLE.COM".to_string(),
            hostname: "files01".to_string(),
        }
    }

    #[test]
    fn corrupt_record_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("initialized.json");
        std::fs::write(&path, "{\"realm\": ").unwrap();

        let err = read_json::<Record>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(
            read_json_if_exists::<Record>(&path).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn absent_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Record> = read_json_if_exists(&dir.path().join("refresh.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn write_creates_parent_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("initialized.json");
        write_json_pretty(&path, &record()).unwrap();

        assert_eq!(read_json::<Record>(&path).unwrap(), record());
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("initialized.json")]);
    }

    #[test]
    fn write_onto_directory_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();

        assert!(write_json_pretty(&target, &record()).is_err());
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn atomic_write_replaces_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smb.conf");
        write_atomic(&path, b"[global]\n    workgroup = OLD\n").unwrap();
        write_atomic(&path, b"[global]\n    workgroup = EXAMPLE\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[global]\n    workgroup = EXAMPLE\n"
        );
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn remove_reports_whether_file_existed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("initialized.json");
        write_json_pretty(&path, &record()).unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }
}
