use crate::domain::{DssatError, DssatResult, TextEncoding};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

/// Writes a generated text file (experiment or batch file) in UTF-8 with
/// canonical line endings.
pub fn write_text_artifact(path: &Path, content: &str) -> DssatResult<()> {
    ensure_parent_dir(path)?;
    fs::write(path, normalize_text_artifact(content)).map_err(|source| {
        DssatError::io_system(
            "IO.ARTIFACT_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
        .with_path(path)
    })
}

pub fn read_text(path: &Path, encoding: TextEncoding) -> DssatResult<String> {
    let bytes = fs::read(path).map_err(|source| {
        DssatError::io_system(
            "IO.TEXT_READ",
            format!("failed to read '{}': {}", path.display(), source),
        )
        .with_path(path)
    })?;
    encoding.decode(&bytes).map_err(|error| error.with_path(path))
}

/// Replaces `path` with `content` so readers observe either the previous
/// file or the complete new one.
pub fn write_text_atomic(path: &Path, content: &str, encoding: TextEncoding) -> DssatResult<()> {
    let bytes = encoding.encode(content).map_err(|error| error.with_path(path))?;
    let parent = ensure_parent_dir(path)?;
    let io_error = |stage: &str, source: std::io::Error| {
        DssatError::io_system(
            "IO.ATOMIC_WRITE",
            format!("failed to {} '{}': {}", stage, path.display(), source),
        )
        .with_path(path)
    };

    let mut staged = NamedTempFile::new_in(parent).map_err(|source| io_error("stage", source))?;
    staged
        .write_all(&bytes)
        .map_err(|source| io_error("write staged copy of", source))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|source| io_error("sync staged copy of", source))?;
    staged
        .persist(path)
        .map_err(|error| io_error("replace", error.error))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> DssatResult<&Path> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(Path::new(".")),
    };
    fs::create_dir_all(parent).map_err(|source| {
        DssatError::io_system(
            "IO.OUTPUT_DIRECTORY",
            format!("failed to create directory '{}': {}", parent.display(), source),
        )
        .with_path(parent)
    })?;
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::{normalize_text_artifact, read_text, write_text_artifact, write_text_atomic};
    use crate::domain::TextEncoding;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn normalize_text_artifact_uses_canonical_line_endings() {
        let normalized = normalize_text_artifact("alpha\r\nbeta\rgamma");
        assert_eq!(normalized, "alpha\nbeta\ngamma\n");
    }

    #[test]
    fn repeated_text_writes_produce_identical_bytes() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("nested/IBWA8301.MZX");
        let input = "line 1\r\nline 2\rline 3";

        write_text_artifact(&path, input).expect("first write should succeed");
        let first = fs::read(&path).expect("artifact should be readable");
        write_text_artifact(&path, input).expect("second write should succeed");
        let second = fs::read(&path).expect("artifact should be readable");

        assert_eq!(first, second);
        assert_eq!(second, b"line 1\nline 2\nline 3\n");
    }

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_staging_files() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("RICER047.CUL");
        fs::write(&path, b"old\n").expect("seed file");

        write_text_atomic(&path, "UA0001 沈稻1号\n", TextEncoding::Gbk).expect("atomic write");

        let entries = fs::read_dir(temp.path()).expect("list dir").count();
        assert_eq!(entries, 1);
        let text = read_text(&path, TextEncoding::Gbk).expect("read back");
        assert_eq!(text, "UA0001 沈稻1号\n");
    }

    #[test]
    fn unencodable_content_leaves_the_file_untouched() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("RICER047.CUL");
        fs::write(&path, b"old\n").expect("seed file");

        let error = write_text_atomic(&path, "emoji \u{1F33E}\n", TextEncoding::Gbk)
            .expect_err("gbk cannot encode emoji");
        assert_eq!(error.placeholder(), "IO.TEXT_ENCODE");
        assert_eq!(fs::read(&path).expect("still readable"), b"old\n");
    }
}
