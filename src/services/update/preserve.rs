//! Preserve/restore: the copy-out-then-copy-back mechanism protecting user
//! data across a binary replacement.

use std::io;
use std::path::{Path, PathBuf};

use crate::services::fsops;

/// Subdirectory of the server root holding the versioned binaries; wiped and
/// re-laid-down during an update
pub const INSTALL_DIR: &str = "server";

/// Marker file whose presence distinguishes a usable install from a download
/// that merely succeeded at the transport level
pub const MARKER_JAR: &str = "HytaleServer.jar";

/// User-data directories at the server root that must survive an update
pub const DATA_DIRS: &[&str] = &["mods", "universe", "logs"];

/// What user data must survive a binary replacement. Recomputed fresh per
/// update since the file layout can change between versions. All paths are
/// relative to the server root.
#[derive(Debug, Clone)]
pub struct PreservedPaths {
    /// Config files found anywhere under the installation subtree
    pub config_files: Vec<PathBuf>,
    /// Data directories present at the server root (mods/universe/logs)
    pub data_dirs: Vec<PathBuf>,
}

impl PreservedPaths {
    /// Scan a server root for everything that must be preserved.
    pub async fn scan(root: &Path) -> io::Result<Self> {
        let install = root.join(INSTALL_DIR);

        let mut config_files = Vec::new();
        if install.is_dir() {
            for rel in fsops::find_config_files(&install).await? {
                config_files.push(Path::new(INSTALL_DIR).join(rel));
            }
        }

        let mut data_dirs = Vec::new();
        for dir in DATA_DIRS {
            if root.join(dir).is_dir() {
                data_dirs.push(PathBuf::from(dir));
            }
        }

        Ok(Self {
            config_files,
            data_dirs,
        })
    }

    fn all(&self) -> impl Iterator<Item = &PathBuf> {
        self.config_files.iter().chain(self.data_dirs.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.config_files.is_empty() && self.data_dirs.is_empty()
    }

    /// Copy everything preserved out of `root` into `dest`, mirroring the
    /// relative layout so restore is a straight copy back.
    pub async fn preserve_to(&self, root: &Path, dest: &Path) -> io::Result<()> {
        for rel in self.all() {
            fsops::copy_path(&root.join(rel), &dest.join(rel)).await?;
        }
        Ok(())
    }

    /// Copy everything preserved from `src` back into `root`, overwriting
    /// whatever the fresh download placed there. User data always wins over
    /// defaults shipped with the new version.
    pub async fn restore_from(&self, src: &Path, root: &Path) -> io::Result<()> {
        for rel in self.all() {
            fsops::copy_path(&src.join(rel), &root.join(rel)).await?;
        }
        Ok(())
    }
}
