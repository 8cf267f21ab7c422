//! Job workspace: where relative chart locations are resolved from

use std::path::{Path, PathBuf};

/// Root working directory of the job running a reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace rooted at the process's current directory
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a chart location against the workspace root
    ///
    /// Absolute locations are returned unchanged.
    pub fn resolve(&self, location: impl AsRef<Path>) -> PathBuf {
        let location = location.as_ref();
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            self.root.join(location)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        let ws = Workspace::new("/ws");
        assert_eq!(ws.resolve("app"), PathBuf::from("/ws/app"));
        assert_eq!(ws.resolve("charts/app"), PathBuf::from("/ws/charts/app"));
    }

    #[test]
    fn test_resolve_absolute_passes_through() {
        let ws = Workspace::new("/ws");
        assert_eq!(ws.resolve("/opt/charts/app"), PathBuf::from("/opt/charts/app"));
    }
}
