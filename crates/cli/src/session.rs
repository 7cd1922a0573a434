//! Run-scoped state passed explicitly into every tool

use std::path::{Path, PathBuf};

/// State a tool run needs from its environment.
///
/// Passed by reference into `run_tool`; nothing here is process-global.
#[derive(Debug, Clone)]
pub struct Session {
    /// Base directory bare file names resolve against.
    pub working_directory: PathBuf,
    /// Emit per-tool progress output.
    pub show_progress: bool,
}

impl Session {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            show_progress: true,
        }
    }

    /// Resolve a user-supplied path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() || p.components().count() > 1 {
            p.to_path_buf()
        } else {
            self.working_directory.join(p)
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
