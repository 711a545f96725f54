//! System V shared memory, the order router's native segment type

use crate::error::TransportError;
use std::io;
use std::ptr;

/// `shmat` attachment; detached on drop
pub(crate) struct Attachment {
    id: libc::c_int,
    addr: *mut u8,
    key: u32,
}

impl Attachment {
    /// `shmget(key, len, flags)` followed by `shmat`
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn get(key: u32, len: usize, flags: libc::c_int) -> Result<Self, TransportError> {
        let sys_err = |op| TransportError::SysV {
            op,
            key,
            source: io::Error::last_os_error(),
        };
        // SAFETY: plain syscall, no pointers passed
        let id = unsafe { libc::shmget(key as libc::key_t, len, flags) };
        if id < 0 {
            return Err(sys_err("shmget"));
        }
        // SAFETY: `id` came from shmget; a null address lets the kernel pick
        let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(sys_err("shmat"));
        }
        Ok(Self {
            id,
            addr: addr.cast(),
            key,
        })
    }

    pub(crate) fn addr(&self) -> *mut u8 {
        self.addr
    }

    pub(crate) fn id(&self) -> i32 {
        self.id
    }

    /// Mark the segment for destruction once every process has detached
    pub(crate) fn remove(&self) -> Result<(), TransportError> {
        // SAFETY: IPC_RMID takes no buffer
        if unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) } < 0 {
            return Err(TransportError::SysV {
                op: "shmctl(IPC_RMID)",
                key: self.key,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        // SAFETY: `addr` was returned by shmat and is detached only here
        if unsafe { libc::shmdt(self.addr.cast::<libc::c_void>()) } < 0 {
            tracing::warn!(key = self.key, error = %io::Error::last_os_error(), "shmdt failed");
        }
    }
}

/// Round up to whole pages, as the router sizes its segments
#[allow(clippy::cast_sign_loss)]
pub(crate) fn page_align(len: usize) -> usize {
    // SAFETY: sysconf has no preconditions
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page = if page > 0 { page as usize } else { 4096 };
    len.div_ceil(page) * page
}
