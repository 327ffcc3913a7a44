// parity-core/src/infrastructure/fs.rs

use crate::infrastructure::error::InfrastructureError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Writes `content` through a temporary file in the same directory, then
/// renames it over `path`. Readers see the old file or the new one, never half of it.
pub fn atomic_write<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
) -> Result<(), InfrastructureError> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(content.as_ref())?;
    temp_file
        .persist(path)
        .map_err(|e| InfrastructureError::Io(e.error))?;
    Ok(())
}

/// Appends newline-terminated lines, creating the file if needed.
pub fn append_lines<P, I, S>(path: P, lines: I) -> Result<(), InfrastructureError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut buf = String::new();
    for line in lines {
        buf.push_str(line.as_ref());
        buf.push('\n');
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    // One write per batch so concurrent appenders do not interleave within a batch.
    file.write_all(buf.as_bytes())?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parent_and_overwrites() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("out/run_summary.json");

        atomic_write(&file_path, "Initial")?;
        atomic_write(&file_path, "Updated")?;

        assert_eq!(fs::read_to_string(file_path)?, "Updated");
        Ok(())
    }

    #[test]
    fn test_append_lines_accumulates() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("history.jsonl");

        append_lines(&file_path, ["a", "b"])?;
        append_lines(&file_path, vec!["c".to_string()])?;

        assert_eq!(fs::read_to_string(file_path)?, "a\nb\nc\n");
        Ok(())
    }
}
