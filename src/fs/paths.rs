use std::path::{Path, PathBuf};

use super::Fs;

/// Marks an execution directory as a sandbox created by us.
pub const SANDBOX_SENTINEL: &str = ".sciath_sandbox";

/// Utility fns for making common types of paths.
impl Fs {
    /// $OUTPUT/filename
    pub fn output_file<'a>(&self, filename: &str, buf: &'a mut PathBuf) -> &'a Path {
        parts2(&self.output_prefix, filename, buf)
    }

    /// $EXEC/.sciath_sandbox
    pub fn sentinel<'a>(&self, exec_path: &Path, buf: &'a mut PathBuf) -> &'a Path {
        parts2(exec_path, SANDBOX_SENTINEL, buf)
    }
}

fn parts2<'a, T: AsRef<Path>, U: AsRef<Path>>(a: T, b: U, buf: &'a mut PathBuf) -> &'a Path {
    buf.clear();
    buf.push(a);
    buf.push(b);
    buf.as_path()
}
