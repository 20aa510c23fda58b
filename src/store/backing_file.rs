use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use super::error::{StoreError, StoreResult};

/// How a backing file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a file that must not exist yet. Any existing entry at the path,
    /// symlinks included, is refused.
    CreateNew,
    /// Create the file or truncate an existing one. Symlinks are refused.
    Truncate,
    /// Reopen an existing file, keeping its contents (recovery).
    Existing,
}

impl OpenMode {
    fn creates(self) -> bool {
        !matches!(self, OpenMode::Existing)
    }
}

/// Open swap file addressed in whole pages
#[derive(Debug)]
pub(crate) struct BackingFile {
    file: File,
    path: PathBuf,
}

impl BackingFile {
    /// Open or create the file at `path`
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> StoreResult<Self> {
        let path = path.as_ref();

        // When creating a swap file it really shouldn't exist yet. A symbolic
        // link at the path is most likely an attack.
        if mode.creates()
            && let Ok(meta) = fs::symlink_metadata(path)
        {
            if meta.file_type().is_symlink() {
                error!(path = %path.display(), "swap file already exists (symlink attack?)");
                return Err(StoreError::SymlinkRejected(path.display().to_string()));
            }
            if mode == OpenMode::CreateNew {
                return Err(StoreError::AlreadyExists(path.display().to_string()));
            }
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        match mode {
            OpenMode::CreateNew => options.create_new(true),
            OpenMode::Truncate => options.create(true).truncate(true),
            OpenMode::Existing => &mut options,
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options
                .mode(0o600)
                .custom_flags(nix::fcntl::OFlag::O_NOFOLLOW.bits());
        }

        let file = options.open(path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.display().to_string()),
            _ => StoreError::Io(e),
        })?;
        debug!(path = %path.display(), ?mode, "opened swap file");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    /// Size of the file in bytes
    pub fn len(&self) -> StoreResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Preferred I/O block size of the device holding the file, when the
    /// platform reports one
    pub fn device_block_size(&self) -> Option<u64> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            self.file.metadata().ok().map(|meta| meta.blksize())
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    /// Read exactly `buffer.len()` bytes at `offset`
    pub fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> StoreResult<()> {
        if let Err(e) = self.file.seek(SeekFrom::Start(offset)) {
            error!(offset, error = %e, "seek error in swap file read");
            return Err(e.into());
        }

        let mut filled = 0;
        while filled < buffer.len() {
            match self.file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(offset, error = %e, "read error in swap file");
                    return Err(e.into());
                }
            }
        }

        if filled < buffer.len() {
            error!(offset, expected = buffer.len(), actual = filled, "read error in swap file");
            return Err(StoreError::ShortRead {
                offset,
                expected: buffer.len(),
                actual: filled,
            });
        }
        Ok(())
    }

    /// Write all of `buffer` at `offset`.
    ///
    /// Errors are returned unlogged; the caller decides whether a failure is
    /// worth reporting again.
    pub fn write_at(&mut self, offset: u64, buffer: &[u8]) -> StoreResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        Ok(())
    }

    /// Flush file contents to durable storage
    pub fn sync_all(&mut self) -> StoreResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Close the descriptor, surfacing any error the OS reports on close
    pub fn close(self) -> StoreResult<()> {
        #[cfg(unix)]
        {
            use std::os::unix::io::IntoRawFd;
            nix::unistd::close(self.file.into_raw_fd()).map_err(io::Error::from)?;
        }
        #[cfg(not(unix))]
        drop(self.file);
        Ok(())
    }

    /// Remove the file at `path`
    pub fn remove<P: AsRef<Path>>(path: P) -> StoreResult<()> {
        fs::remove_file(path)?;
        Ok(())
    }
}
