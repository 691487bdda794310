use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Readers never observe a half-written file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically write `data` and apply unix permission bits.
pub fn atomic_write_mode(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    atomic_write(path, data)?;
    set_mode(path, mode)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Append text to a file, creating it if it doesn't exist.
pub fn append_text(path: &Path, text: &str) -> Result<()> {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    f.write_all(text.as_bytes())?;
    Ok(())
}

/// True if `path` exists and has a line exactly equal to `line`.
pub fn contains_line(path: &Path, line: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let existing = std::fs::read_to_string(path)?;
    Ok(existing.lines().any(|l| l == line))
}

/// Append `line` to `path` unless an identical line is already present.
///
/// Exact line match only. A separator newline is added first if the file
/// doesn't already end with one. Returns true if the line was appended.
pub fn ensure_line(path: &Path, line: &str) -> Result<bool> {
    let existing = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };
    if existing.lines().any(|l| l == line) {
        return Ok(false);
    }
    let sep = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(f, "{sep}{line}")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/frappe");
        atomic_write(&path, b"data").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "data");
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_mode_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sudoers");
        atomic_write_mode(&path, b"x\n", 0o440).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o440);
    }

    #[test]
    fn ensure_line_appends_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("authorized_keys");
        let key = "ssh-ed25519 AAAAC3Nza dev@laptop";
        assert!(ensure_line(&path, key).unwrap());
        assert!(!ensure_line(&path, key).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| *l == key).count(), 1);
    }

    #[test]
    fn ensure_line_separates_from_unterminated_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("authorized_keys");
        std::fs::write(&path, "ssh-rsa AAAA old").unwrap();
        ensure_line(&path, "ssh-ed25519 BBBB new").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "ssh-rsa AAAA old\nssh-ed25519 BBBB new\n");
    }

    #[test]
    fn contains_line_is_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        assert!(!contains_line(&path, "a").unwrap());
        std::fs::write(&path, "abc\n").unwrap();
        assert!(!contains_line(&path, "a").unwrap());
        assert!(contains_line(&path, "abc").unwrap());
    }
}
