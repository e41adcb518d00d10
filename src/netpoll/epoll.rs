//! Linux epoll backend.

use crate::engine::CoroId;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;

/// Readiness poller mapping fds to the coroutine parked on them.
pub struct Poller {
    epoll_fd: RawFd,
    waiting: HashMap<RawFd, CoroId>,
}

impl Poller {
    pub fn new() -> io::Result<Poller> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Poller {
            epoll_fd,
            waiting: HashMap::new(),
        })
    }

    /// Watch `fd` for read readiness on behalf of `coro`.
    pub fn watch_read(&mut self, fd: RawFd, coro: CoroId) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        self.waiting.insert(fd, coro);
        Ok(())
    }

    /// Stop watching `fd`.
    pub fn unwatch(&mut self, fd: RawFd) {
        unsafe {
            libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
        self.waiting.remove(&fd);
    }

    /// Wait up to `timeout_ms` (negative blocks indefinitely) and return the
    /// coroutines whose fd became readable. Empty on timeout or EINTR.
    pub fn wait(&mut self, timeout_ms: i32) -> Vec<CoroId> {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 64];
        let n = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                events.as_mut_ptr(),
                events.len() as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            return Vec::new();
        }

        let mut ready = Vec::new();
        for event in events.iter().take(n as usize) {
            let fd = event.u64 as RawFd;
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
            libc::close(self.epoll_fd);
        }
    }
}
