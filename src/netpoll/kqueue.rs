//! macOS/BSD kqueue backend.

use crate::engine::CoroId;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;

/// Readiness poller mapping fds to the coroutine parked on them.
pub struct Poller {
    kqueue_fd: RawFd,
    waiting: HashMap<RawFd, CoroId>,
}

impl Poller {
    pub fn new() -> io::Result<Poller> {
        let kqueue_fd = unsafe { libc::kqueue() };
        if kqueue_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Poller {
            kqueue_fd,
            waiting: HashMap::new(),
        })
    }

    /// Watch `fd` for read readiness on behalf of `coro`.
    pub fn watch_read(&mut self, fd: RawFd, coro: CoroId) -> io::Result<()> {
        let event = libc::kevent {
            ident: fd as libc::uintptr_t,
            filter: libc::EVFILT_READ,
            flags: libc::EV_ADD | libc::EV_ONESHOT,
            fflags: 0,
            data: 0,
            udata: std::ptr::null_mut(),
        };
        let ret = unsafe {
            libc::kevent(
                self.kqueue_fd,
                &event,
                1,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        self.waiting.insert(fd, coro);
        Ok(())
    }

    /// Stop watching `fd`.
    pub fn unwatch(&mut self, fd: RawFd) {
        let event = libc::kevent {
            ident: fd as libc::uintptr_t,
            filter: libc::EVFILT_READ,
            flags: libc::EV_DELETE,
            fflags: 0,
            data: 0,
            udata: std::ptr::null_mut(),
        };
        unsafe {
            libc::kevent(
                self.kqueue_fd,
                &event,
                1,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            );
        }
        self.waiting.remove(&fd);
    }

    /// Wait up to `timeout_ms` (negative blocks indefinitely) and return the
    /// coroutines whose fd became readable. Empty on timeout or EINTR.
    pub fn wait(&mut self, timeout_ms: i32) -> Vec<CoroId> {
        let timeout = libc::timespec {
            tv_sec: (timeout_ms / 1000) as libc::time_t,
            tv_nsec: ((timeout_ms % 1000) * 1_000_000) as libc::c_long,
        };
        let timeout_ptr = if timeout_ms < 0 {
            std::ptr::null()
        } else {
            &timeout as *const libc::timespec
        };

        let mut events: [libc::kevent; 64] = unsafe { std::mem::zeroed() };
        let n = unsafe {
            libc::kevent(
                self.kqueue_fd,
                std::ptr::null(),
                0,
                events.as_mut_ptr(),
                events.len() as i32,
                timeout_ptr,
            )
        };
        if n < 0 {
            return Vec::new();
        }

        let mut ready = Vec::new();
        for event in events.iter().take(n as usize) {
            let fd = event.ident as RawFd;
            if let Some(&coro) = self.waiting.get(&fd) {
                ready.push(coro);
            }
        }
        ready
    }

    /// True while any fd is being waited on.
    pub fn has_waiters(&self) -> bool {
        !self.waiting.is_empty()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kqueue_fd);
        }
    }
}
