//! # Virtual File System
//!
//! Maps guest storage paths onto a host directory tree.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   nand/{safe,system,user}
//!   sdmc/
//!   system/
//! ```
//!
//! ## Philosophy
//!
//! - **The root is a wall**: every mapped path is normalized lexically and
//!   rejected if it leaves the storage root
//! - **Directories appear on demand**: asking for a partition creates it
//! - **The RomFS is just a stream**: the file system holds it, it does not
//!   parse it

pub mod path;

pub use path::{ContentPath, VfsError};

use log::debug;
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

/// Directory name of the storage root inside the emulator data directory
pub const BASE_DIR_NAME: &str = "HleFs";
pub const NAND_DIR: &str = "nand";
pub const SD_CARD_DIR: &str = "sdmc";
pub const SYSTEM_DIR: &str = "system";

/// Readable, seekable RomFS image
pub trait RomFsStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> RomFsStream for T {}

/// Guest storage rooted at one host directory
pub struct VirtualFileSystem {
    root: PathBuf,
    romfs: Option<Box<dyn RomFsStream>>,
}

impl VirtualFileSystem {
    /// Creates a file system rooted at `root`
    ///
    /// Nothing is created on disk until a partition is requested.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: path::normalize(root.as_ref()),
            romfs: None,
        }
    }

    /// Creates a file system rooted at `<data_dir>/HleFs`
    pub fn in_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(BASE_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a guest file name onto `base`
    ///
    /// `name` must start with `/` or `//`. Returns `None` when it does not or
    /// when the result leaves the storage root.
    pub fn full_path(&self, base: impl AsRef<Path>, name: &str) -> Option<PathBuf> {
        let relative = path::strip_guest_root(name)?;
        let full = path::normalize(&base.as_ref().join(relative));
        full.starts_with(&self.root).then_some(full)
    }

    pub fn sd_card_path(&self) -> Result<PathBuf, VfsError> {
        self.partition_path(SD_CARD_DIR)
    }

    pub fn nand_path(&self) -> Result<PathBuf, VfsError> {
        self.partition_path(NAND_DIR)
    }

    pub fn system_path(&self) -> Result<PathBuf, VfsError> {
        self.partition_path(SYSTEM_DIR)
    }

    /// Resolves a partition or content alias and creates its directory
    pub fn partition_path(&self, partition: &str) -> Result<PathBuf, VfsError> {
        let relative = match ContentPath::from_alias(partition) {
            Some(content) => content.relative_dir(),
            None => PathBuf::from(partition),
        };
        let full = path::normalize(&self.root.join(relative));
        if !full.starts_with(&self.root) {
            return Err(VfsError::OutsideRoot(partition.to_string()));
        }
        if !full.is_dir() {
            fs::create_dir_all(&full).map_err(|err| VfsError::Io(err.to_string()))?;
            debug!("created partition directory {}", full.display());
        }
        Ok(full)
    }

    /// Maps `part:/name` to a host path
    pub fn switch_path_to_system_path(&self, guest_path: &str) -> Result<PathBuf, VfsError> {
        let (partition, name) = path::split_guest_path(guest_path)?;
        let base = self.partition_path(partition)?;
        self.full_path(base, name)
            .ok_or_else(|| VfsError::InvalidPath(guest_path.to_string()))
    }

    /// Maps a host path under the root back to `part:/name`
    ///
    /// A directory directly under the root maps to `part:/`.
    pub fn system_path_to_switch_path(&self, host_path: impl AsRef<Path>) -> Option<String> {
        let relative = path::normalize(host_path.as_ref())
            .strip_prefix(&self.root)
            .ok()?
            .to_path_buf();
        let mut components = relative.iter().map(|part| part.to_string_lossy());
        let partition = components.next()?;
        let name = components.collect::<Vec<_>>().join("/");
        Some(format!("{}:/{}", partition, name))
    }

    /// Opens a RomFS image from the host filesystem
    pub fn load_romfs(&mut self, path: impl AsRef<Path>) -> Result<(), VfsError> {
        let file = File::open(path.as_ref()).map_err(|err| VfsError::Io(err.to_string()))?;
        debug!("loaded RomFS from {}", path.as_ref().display());
        self.set_romfs(Box::new(file));
        Ok(())
    }

    /// Replaces the RomFS stream, dropping the previous one
    pub fn set_romfs(&mut self, stream: Box<dyn RomFsStream>) {
        self.romfs = Some(stream);
    }

    pub fn has_romfs(&self) -> bool {
        self.romfs.is_some()
    }

    pub fn romfs_mut(&mut self) -> Option<&mut (dyn RomFsStream + 'static)> {
        self.romfs.as_deref_mut()
    }
}
