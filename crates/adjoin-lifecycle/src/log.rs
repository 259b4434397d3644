use std::io::Write;
use std::path::Path;

use chrono::Utc;

use adjoin_common::paths;

/// Append one line per refresh run: `<rfc3339> | refresh | ok|failed | detail`.
pub fn append_refresh(state_dir: &Path, ok: bool, detail: &str) -> Result<(), std::io::Error> {
    let path = paths::refresh_log_path(state_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;

    let line = format!(
        "{} | refresh | {} | {}\n",
        Utc::now().to_rfc3339(),
        if ok { "ok" } else { "failed" },
        detail.replace('\n', " ")
    );
    file.write_all(line.as_bytes())?;
    Ok(())
}

pub fn read_log(state_dir: &Path) -> Result<String, std::io::Error> {
    let path = paths::refresh_log_path(state_dir);
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_log(dir.path()).unwrap(), "");

        append_refresh(dir.path(), true, "4 principals").unwrap();
        append_refresh(dir.path(), false, "keytab lacks\ncifs/files01").unwrap();

        let log = read_log(dir.path()).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| refresh | ok | 4 principals"));
        assert!(lines[1].ends_with("| refresh | failed | keytab lacks cifs/files01"));
    }
}
