//! Shared segments addressed by an integer key
//!
//! Two keyed backends exist. [`SegmentBackend::SysV`] uses `shmget`/`shmat`
//! on the key directly, which is what the order router attaches to. The
//! file backend maps `<dir>/shm_<key:08x>`; with `dir` on a tmpfs such as
//! `/dev/shm` every process mapping the same key shares the pages, and tests
//! use it under a temporary directory.

use crate::error::TransportError;
#[cfg(unix)]
use crate::sysv::{self, Attachment};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default directory for keyed file segments
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Backing file for `key` under `dir`
#[must_use]
pub fn segment_path(dir: &Path, key: u32) -> PathBuf {
    dir.join(format!("shm_{key:08x}"))
}

/// Where keyed segments live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentBackend {
    /// System V shared memory keyed by the `u32` key
    SysV,
    /// Files under a directory
    File(PathBuf),
}

impl SegmentBackend {
    pub fn create(&self, key: u32, len: usize) -> Result<ShmSegment, TransportError> {
        match self {
            Self::SysV => ShmSegment::create_sysv(key, len),
            Self::File(dir) => ShmSegment::create(dir, key, len),
        }
    }

    pub fn open(&self, key: u32, len: usize) -> Result<ShmSegment, TransportError> {
        match self {
            Self::SysV => ShmSegment::open_sysv(key, len),
            Self::File(dir) => ShmSegment::open(dir, key, len),
        }
    }
}

enum Backing {
    Map {
        /// Held for its unmap on drop
        _map: MmapMut,
        path: Option<PathBuf>,
    },
    #[cfg(unix)]
    SysV { attachment: Attachment, key: u32 },
}

/// A mapped region plus its cached base pointer
pub struct ShmSegment {
    base: *mut u8,
    len: usize,
    backing: Backing,
}

// SAFETY: the mapping lives as long as the segment; all concurrent access
// through `base` goes through atomics or through slots the caller owns.
unsafe impl Send for ShmSegment {}
// SAFETY: see above
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create (or recreate) the file segment for `key`, sized to `len` and zeroed
    pub fn create(dir: &Path, key: u32, len: usize) -> Result<Self, TransportError> {
        let path = segment_path(dir, key);
        let create_err = |source| TransportError::Create {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(create_err)?;
        file.set_len(len as u64).map_err(create_err)?;

        // SAFETY: the file is sized above; other processes may map it too,
        // which is the point of the segment.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(TransportError::Map)?;
        map.fill(0);
        info!(path = %path.display(), len, "created shm segment");
        Ok(Self::mapped(map, Some(path)))
    }

    /// Attach to an existing file segment; fails if it is smaller than `len`
    pub fn open(dir: &Path, key: u32, len: usize) -> Result<Self, TransportError> {
        let path = segment_path(dir, key);
        let open_err = |source| TransportError::Open {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(open_err)?;
        let actual = file.metadata().map_err(open_err)?.len();
        if actual < len as u64 {
            return Err(TransportError::TooSmall {
                path,
                actual,
                expected: len as u64,
            });
        }

        // SAFETY: length checked against the file size above
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(TransportError::Map)?;
        debug!(path = %path.display(), len, "attached shm segment");
        Ok(Self::mapped(map, Some(path)))
    }

    /// Get or create the System V segment for `key` and zero it
    ///
    /// The size is rounded up to whole pages. An existing segment smaller
    /// than that is refused by the kernel.
    #[cfg(unix)]
    pub fn create_sysv(key: u32, len: usize) -> Result<Self, TransportError> {
        let len = sysv::page_align(len);
        let attachment = Attachment::get(key, len, libc::IPC_CREAT | 0o666)?;
        let base = attachment.addr();
        // SAFETY: shmat mapped at least `len` bytes at `base`
        unsafe { std::ptr::write_bytes(base, 0, len) };
        info!(key, shmid = attachment.id(), len, "created sysv segment");
        Ok(Self {
            base,
            len,
            backing: Backing::SysV { attachment, key },
        })
    }

    /// Attach to an existing System V segment of at least `len` bytes
    #[cfg(unix)]
    pub fn open_sysv(key: u32, len: usize) -> Result<Self, TransportError> {
        let attachment = Attachment::get(key, len, 0o666)?;
        let base = attachment.addr();
        debug!(key, shmid = attachment.id(), len, "attached sysv segment");
        Ok(Self {
            base,
            len,
            backing: Backing::SysV { attachment, key },
        })
    }

    #[cfg(not(unix))]
    pub fn create_sysv(_key: u32, _len: usize) -> Result<Self, TransportError> {
        Err(TransportError::Unsupported)
    }

    #[cfg(not(unix))]
    pub fn open_sysv(_key: u32, _len: usize) -> Result<Self, TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Process-private zeroed segment
    pub fn anonymous(len: usize) -> Result<Self, TransportError> {
        let map = MmapMut::map_anon(len).map_err(TransportError::Map)?;
        Ok(Self::mapped(map, None))
    }

    fn mapped(mut map: MmapMut, path: Option<PathBuf>) -> Self {
        Self {
            base: map.as_mut_ptr(),
            len: map.len(),
            backing: Backing::Map { _map: map, path },
        }
    }

    /// Destroy the keyed segment
    ///
    /// A System V segment is marked for removal and disappears once every
    /// process has detached; a file segment is unlinked. Anonymous segments
    /// have nothing to remove.
    pub fn remove(&self) -> Result<(), TransportError> {
        match &self.backing {
            Backing::Map { path: Some(path), .. } => {
                std::fs::remove_file(path).map_err(|source| TransportError::Remove {
                    path: path.clone(),
                    source,
                })
            }
            Backing::Map { path: None, .. } => Ok(()),
            #[cfg(unix)]
            Backing::SysV { attachment, .. } => attachment.remove(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base of the mapping; page aligned
    #[must_use]
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Backing file, `None` for anonymous and System V segments
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Map { path, .. } => path.as_deref(),
            #[cfg(unix)]
            Backing::SysV { .. } => None,
        }
    }

    /// System V key, `None` for mapped segments
    #[must_use]
    pub fn sysv_key(&self) -> Option<u32> {
        match &self.backing {
            Backing::Map { .. } => None,
            #[cfg(unix)]
            Backing::SysV { key, .. } => Some(*key),
        }
    }
}

impl std::fmt::Debug for ShmSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmSegment")
            .field("len", &self.len)
            .field("path", &self.path())
            .field("sysv_key", &self.sysv_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_open_share_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let a = ShmSegment::create(dir.path(), 0x1234, 4096)?;
        let b = ShmSegment::open(dir.path(), 0x1234, 4096)?;

        // SAFETY: both segments are 4096 bytes long
        unsafe {
            a.base().add(100).write(0xab);
            assert_eq!(b.base().add(100).read(), 0xab);
        }
        assert_eq!(a.path(), Some(segment_path(dir.path(), 0x1234).as_path()));
        Ok(())
    }

    #[test]
    fn test_open_missing_segment_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let err = ShmSegment::open(dir.path(), 7, 64);
        assert!(matches!(err, Err(TransportError::Open { .. })));
        Ok(())
    }

    #[test]
    fn test_open_rejects_short_segment() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let _small = ShmSegment::create(dir.path(), 9, 64)?;
        let err = ShmSegment::open(dir.path(), 9, 128);
        assert!(matches!(
            err,
            Err(TransportError::TooSmall {
                actual: 64,
                expected: 128,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_create_zeroes_existing_contents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        {
            let seg = ShmSegment::create(dir.path(), 3, 256)?;
            // SAFETY: within the 256-byte mapping
            unsafe { seg.base().add(10).write(1) };
        }
        let seg = ShmSegment::create(dir.path(), 3, 256)?;
        // SAFETY: within the 256-byte mapping
        assert_eq!(unsafe { seg.base().add(10).read() }, 0);
        Ok(())
    }

    /// Unique per process so parallel test binaries never share a key
    #[cfg(unix)]
    fn sysv_key(offset: u32) -> u32 {
        0x5e10_0000 | ((std::process::id() & 0xfff) << 4) | offset
    }

    #[cfg(unix)]
    #[test]
    fn test_sysv_create_then_open_share_pages() -> Result<(), Box<dyn std::error::Error>> {
        let key = sysv_key(1);
        let a = ShmSegment::create_sysv(key, 100)?;
        let result = (|| -> Result<(), Box<dyn std::error::Error>> {
            assert_eq!(a.len(), sysv::page_align(100));
            assert_eq!(a.sysv_key(), Some(key));
            assert_eq!(a.path(), None);

            let b = SegmentBackend::SysV.open(key, 100)?;
            // SAFETY: both attachments cover at least 100 bytes
            unsafe {
                a.base().add(64).write(0x5a);
                assert_eq!(b.base().add(64).read(), 0x5a);
            }
            Ok(())
        })();
        a.remove()?;
        result
    }

    #[cfg(unix)]
    #[test]
    fn test_sysv_open_missing_segment_fails() {
        let err = ShmSegment::open_sysv(sysv_key(2), 64);
        assert!(matches!(err, Err(TransportError::SysV { op: "shmget", .. })));
    }

    #[test]
    fn test_file_backend_dispatches_to_dir() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let backend = SegmentBackend::File(dir.path().to_path_buf());
        let seg = backend.create(0x42, 64)?;
        assert_eq!(seg.path(), Some(segment_path(dir.path(), 0x42).as_path()));
        assert!(backend.open(0x42, 64).is_ok());

        seg.remove()?;
        assert!(matches!(backend.open(0x42, 64), Err(TransportError::Open { .. })));
        Ok(())
    }
}
