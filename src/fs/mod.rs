use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

use util::PathEncodingError;

/// Defines fns for creating common paths in the output and sandbox directories
mod paths;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Output directory \"{0}\" is not a directory")]
    NotDirectory(String),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
    #[error("Path \"{0}\" must be absolute")]
    NotAbsolute(String),
}

/// All destructive file operations go through this struct.
///
/// Every destructive operation checks that the path in question is a child of the
/// single whitelisted prefix (an output directory); otherwise it is not performed.
/// Commands run by a job can of course write wherever they like.
#[derive(Debug, Clone)]
pub struct Fs {
    /// The directory we are allowed to modify
    output_prefix: PathBuf,
}

impl Fs {
    /// Create a new `Fs` allowed to modify `output_prefix`, which must be absolute.
    pub fn new(output_prefix: &Path) -> Result<Self> {
        if !output_prefix.is_absolute() {
            return Err(Error::NotAbsolute(to_string(output_prefix)?).into());
        }
        Ok(Self {
            output_prefix: normalize(output_prefix),
        })
    }

    pub fn output_prefix(&self) -> &Path {
        &self.output_prefix
    }

    /// Check whether output dir exists, and create it if not.
    pub fn ensure_output_dir_exists(&self) -> Result<()> {
        if !self.output_prefix.exists() {
            log::info!("Output directory {:?} doesn't exist. Creating.", self.output_prefix);
            fs::create_dir_all(&self.output_prefix).context("creating output directory")?;
        } else if !self.output_prefix.is_dir() {
            return Err(Error::NotDirectory(to_string(&self.output_prefix)?).into());
        }
        Ok(())
    }

    /// Check if path exists on disk.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Create a directory (uses `std::fs::create_dir_all`, so an entire tree of dirs can be created).
    pub fn create_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))?;
        Ok(())
    }

    /// Create (or truncate) a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        Ok(f)
    }

    /// Write entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::write(path, text).with_context(|| format!("writing file {:?}", path))?;
        Ok(())
    }

    /// Append a single line to a file, creating it if needed.
    pub fn append_line<T: AsRef<Path>>(&self, path: T, line: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {:?} for appending", path))?;
        writeln!(f, "{}", line).with_context(|| format!("appending to {:?}", path))?;
        Ok(())
    }

    /// Delete a file if it exists. Returns whether anything was deleted.
    pub fn delete_file_if_exists<T: AsRef<Path>>(&self, path: T) -> Result<bool> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        if !self.exists(path) {
            return Ok(false);
        }
        fs::remove_file(path).with_context(|| format!("deleting file {:?}", path))?;
        Ok(true)
    }

    /// Recursively delete a directory.
    pub fn delete_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_dir_all(path).with_context(|| format!("deleting dir {:?}", path))?;
        Ok(())
    }

    fn is_whitelisted(&self, path: &Path) -> bool {
        normalize(path).starts_with(&self.output_prefix)
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if !self.is_whitelisted(path) {
            Err(Error::NotWhitelisted(to_string(path)?).into())
        } else {
            Ok(())
        }
    }
}

/// Resolve `.` and `..` without touching the disk, so `$OUT/../x` is seen as `x`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::with_capacity(path.as_os_str().len());
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn to_string(path: &Path) -> Result<String, PathEncodingError> {
    Ok(path.to_str().ok_or(PathEncodingError)?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_relative_prefix_rejected() {
        assert!(Fs::new(Path::new("relative/out")).is_err());
    }

    #[test]
    fn test_whitelist() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("out");
        let fs = Fs::new(&out)?;
        fs.ensure_output_dir_exists()?;
        assert!(out.is_dir());

        let inside = out.join("file.txt");
        fs.write_file(&inside, "text")?;
        assert!(inside.exists());

        let outside = dir.path().join("elsewhere.txt");
        assert!(fs.write_file(&outside, "text").is_err());
        assert!(!outside.exists());

        assert!(fs.delete_file_if_exists(&inside)?);
        assert!(!fs.delete_file_if_exists(&inside)?);
        Ok(())
    }

    #[test]
    fn test_parent_dir_escapes_whitelist() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("out");
        let fs = Fs::new(&out)?;
        fs.ensure_output_dir_exists()?;

        let escaped = out.join("..").join("escaped.txt");
        assert!(fs.write_file(&escaped, "text").is_err());
        assert!(!dir.path().join("escaped.txt").exists());
        assert!(fs.delete_dir(out.join("..")).is_err());
        assert!(dir.path().exists());

        let roundabout = out.join("a").join("..").join("b.txt");
        fs.write_file(&roundabout, "text")?;
        assert!(out.join("b.txt").exists());
        Ok(())
    }

    #[test]
    fn test_append_line() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path())?;
        let path = dir.path().join("codes");
        fs.append_line(&path, "0")?;
        fs.append_line(&path, "3")?;
        assert_eq!(std::fs::read_to_string(&path)?, "0\n3\n");
        Ok(())
    }
}
