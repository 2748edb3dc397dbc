//! `FdWait` - eventfd-backed wait object (Linux).
//!
//! `signal()` bumps the eventfd counter; `wait()` polls the fd and drains
//! the counter on wakeup. Several signals before a wait collapse into one
//! wakeup (eventfd counter semantics). The fd can also be registered with
//! an application's own epoll loop.

use std::os::unix::io::{AsRawFd, RawFd};

use nix::errno::Errno;

use fabric_core::error::{FabricError, FabricResult};
use fabric_core::wait::{PollSet, WaitObject};

use crate::pollset::UtilPollSet;

pub struct FdWait {
    fd: RawFd,
    pollset: UtilPollSet,
}

impl FdWait {
    /// Create a new eventfd. The wait object owns it and closes it on Drop.
    pub fn create() -> FabricResult<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(FabricError::Os(Errno::last()));
        }
        Ok(Self { fd, pollset: UtilPollSet::new() })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Reset the eventfd counter.
    fn drain(&self) {
        let mut val: u64 = 0;
        // EAGAIN means another waiter drained it first
        unsafe {
            libc::read(
                self.fd,
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }
}

impl WaitObject for FdWait {
    fn wait(&self, timeout_ms: i32) -> FabricResult<()> {
        if self.pollset.has_ready() {
            return Ok(());
        }

        let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
        let timeout = if timeout_ms < 0 { -1 } else { timeout_ms };
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout) };
        if ret < 0 {
            let err = Errno::last();
            // Interrupted: let the caller re-check its queue
            if err == Errno::EINTR {
                return Ok(());
            }
            return Err(FabricError::Os(err));
        }
        if ret == 0 {
            return Err(FabricError::Again);
        }
        self.drain();
        Ok(())
    }

    fn signal(&self) {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd,
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = Errno::last();
            // EAGAIN: counter saturated, a wakeup is already pending
            if err != Errno::EAGAIN {
                tracing::warn!(target: "fabric::wait", fd = self.fd, %err, "eventfd signal failed");
            }
        }
    }

    fn pollset(&self) -> &dyn PollSet {
        &self.pollset
    }
}

impl AsRawFd for FdWait {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for FdWait {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}
