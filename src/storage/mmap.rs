//! # Read-Only Memory-Mapped Files
//!
//! `MappedFile` maps an immutable index file into the process address space
//! for its full length. Reads return `&[u8]` slices that point straight into
//! the mapping, so lookups never copy node bytes.
//!
//! ## Lifetime
//!
//! The mapping and the file handle are owned by `MappedFile`. Every slice
//! handed out borrows `&self`, and `close(self)` consumes the value:
//!
//! ```text
//! bytes(&self) -> &[u8]     // Immutable borrow of self
//! close(self)               // Move, no borrow may outlive it
//! ```
//!
//! The borrow checker therefore rejects any use of a slice after the mapping
//! is released. Closing twice is unrepresentable, and dropping a `MappedFile`
//! without calling `close` releases the same resources.
//!
//! ## Concurrency
//!
//! The mapping is read-only and nothing in this crate writes through it, so
//! `MappedFile` is `Send + Sync` and any number of threads may read from it
//! at once. Files are replaced, never modified in place.
//!
//! ## Error Handling
//!
//! All fallible operations return `eyre::Result` with the file path attached.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use eyre::{ensure, Result, WrapErr};
use memmap2::Mmap;

use super::advice::{apply_scoped, AdviceState};
use super::{AdviceGuard, ReadAdvice};

#[derive(Debug)]
pub struct MappedFile {
    file: File,
    mmap: Mmap,
    path: PathBuf,
    size: u64,
    mod_time: SystemTime,
    advice: AdviceState,
}

impl MappedFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open index file '{}'", path.display()))?;

        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?;

        let size = metadata.len();

        ensure!(size > 0, "cannot map empty index file '{}'", path.display());

        let mod_time = metadata
            .modified()
            .wrap_err_with(|| format!("failed to read modification time of '{}'", path.display()))?;

        // SAFETY: Mmap::map is unsafe because the file could be truncated or
        // modified by another process while mapped. Index files are immutable
        // once published: updates produce a new file that is renamed into
        // place, which leaves this inode and its mapping untouched.
        let mmap = unsafe {
            Mmap::map(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            path: path.to_path_buf(),
            size,
            mod_time,
            advice: AdviceState::new(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| eyre::eyre!("range {}+{} overflows", offset, len))?;

        self.mmap.get(offset..end).ok_or_else(|| {
            eyre::eyre!(
                "range {}..{} out of bounds for '{}' (size={})",
                offset,
                end,
                self.path.display(),
                self.size
            )
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mod_time(&self) -> SystemTime {
        self.mod_time
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn advise(&self, advice: ReadAdvice) -> Result<()> {
        #[cfg(unix)]
        self.mmap
            .advise(advice.into())
            .wrap_err_with(|| format!("madvise({:?}) failed for '{}'", advice, self.path.display()))?;

        #[cfg(not(unix))]
        let _ = advice;

        Ok(())
    }

    pub fn scoped_advice(&self, advice: ReadAdvice) -> Result<AdviceGuard<'_>> {
        apply_scoped(self, advice)
    }

    pub fn current_advice(&self) -> ReadAdvice {
        self.advice.current()
    }

    pub(crate) fn advice_state(&self) -> &AdviceState {
        &self.advice
    }

    pub(crate) fn restore_advice(&self, advice: ReadAdvice) -> Result<()> {
        self.advise(advice)?;
        self.advice.replace(advice);
        Ok(())
    }

    /// Unmaps the file and closes its descriptor. Both are released even when
    /// one of them reports an error; the first error is returned.
    pub fn close(self) -> Result<()> {
        let Self {
            file, mmap, path, ..
        } = self;

        let unmapped = unmap(mmap, &path);
        let closed = close_file(file, &path);

        log::debug!("closed index file '{}'", path.display());
        unmapped.and(closed)
    }
}

#[cfg(unix)]
fn unmap(mmap: Mmap, path: &Path) -> Result<()> {
    let (ptr, len) = (mmap.as_ptr(), mmap.len());
    std::mem::forget(mmap);

    // SAFETY: `ptr` and `len` describe the whole mapping created by
    // `Mmap::map` at file offset 0, so `ptr` is page-aligned. The `Mmap` was
    // forgotten above, so the region is unmapped exactly once and no borrow
    // of it survives `close(self)`.
    unsafe { unmap_region(ptr, len, path) }
}

/// # Safety
///
/// `ptr..ptr + len` must not be accessed after this call.
#[cfg(unix)]
unsafe fn unmap_region(ptr: *const u8, len: usize, path: &Path) -> Result<()> {
    let rc = libc::munmap(ptr as *mut libc::c_void, len);
    ensure!(
        rc == 0,
        "munmap failed for '{}': {}",
        path.display(),
        std::io::Error::last_os_error()
    );
    Ok(())
}

#[cfg(not(unix))]
fn unmap(mmap: Mmap, _path: &Path) -> Result<()> {
    drop(mmap);
    Ok(())
}

#[cfg(unix)]
fn close_file(file: File, path: &Path) -> Result<()> {
    use std::os::unix::io::IntoRawFd;

    close_fd(file.into_raw_fd(), path)
}

#[cfg(not(unix))]
fn close_file(file: File, _path: &Path) -> Result<()> {
    drop(file);
    Ok(())
}

/// Closes `fd`. The descriptor is released even when `close(2)` fails.
#[cfg(unix)]
fn close_fd(fd: std::os::unix::io::RawFd, path: &Path) -> Result<()> {
    // SAFETY: the caller hands over ownership of `fd`; it is not used again.
    let rc = unsafe { libc::close(fd) };
    ensure!(
        rc == 0,
        "failed to close index file '{}': {}",
        path.display(),
        std::io::Error::last_os_error()
    );
    Ok(())
}
