//!
//! src/sink.rs
//!
//! Writes command results as pretty json, either to stdout or to a file
//! replaced atomically through a temp file in the same directory
//!

use std::{fs, io::{self, BufWriter, Write}, path::{Path, PathBuf}};

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};

use crate::errors::SptoolsError;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileSink {
    overwrite: bool
}

fn to_writer_pretty<W: Write>(writer: W, json: &Value) -> Result<(), SptoolsError> {
    let mut ser = Serializer::with_formatter(writer, PrettyFormatter::with_indent(b"    "));
    json.serialize(&mut ser)?;
    Ok(())
}

impl JsonFileSink {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// Fails early for a target that may not be replaced
    pub fn check(&self, path: &Path) -> Result<(), SptoolsError> {
        if !self.overwrite && path.exists() {
            return Err(SptoolsError::FileExists(path.to_path_buf()));
        }
        Ok(())
    }

    pub fn write_json(&self, path: &Path, json: &Value) -> Result<PathBuf, SptoolsError> {
        self.check(path)?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from(".")
        };
        fs::create_dir_all(&parent).map_err(|e| SptoolsError::Io(io::Error::new(
            e.kind(), format!("create dir {}: {e}", parent.display())
        )))?;

        let temp = tempfile::NamedTempFile::new_in(&parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            to_writer_pretty(&mut writer, json)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        if self.overwrite {
            temp.persist(path).map_err(|e| SptoolsError::Io(e.error))?;
        } else {
            temp.persist_noclobber(path).map_err(|e| match e.error.kind() {
                io::ErrorKind::AlreadyExists => SptoolsError::FileExists(path.to_path_buf()),
                _ => SptoolsError::Io(e.error)
            })?;
        }

        tracing::info!(path = %path.display(), "sink.written");
        Ok(path.to_path_buf())
    }
}

pub fn print_json(json: &Value) -> Result<(), SptoolsError> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    to_writer_pretty(&mut lock, json)?;
    writeln!(lock)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_four_space_indented_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        JsonFileSink::new(false).write_json(&path, &json!({"a": [1]})).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\n    \"a\": [\n        1\n    ]\n}\n");
    }

    #[test]
    fn existing_file_is_kept_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "original").unwrap();

        let sink = JsonFileSink::new(false);
        assert!(matches!(sink.check(&path), Err(SptoolsError::FileExists(_))));
        let err = sink.write_json(&path, &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, SptoolsError::FileExists(p) if p == path));
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn overwrite_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "original").unwrap();

        JsonFileSink::new(true).write_json(&path, &json!(null)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "null\n");
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.json");

        let written = JsonFileSink::default().write_json(&path, &json!([])).unwrap();
        assert_eq!(written, path);
        assert!(path.is_file());
    }
}
