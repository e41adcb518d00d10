//! Readiness polling for coroutines parked on file descriptors.
//!
//! A [`Poller`] maps raw fds to the [`CoroId`] waiting on them. Feeding it
//! into [`unblocker`] yields the canonical unblocker hook: when the engine
//! runs out of alive coroutines it waits on the poller and moves every
//! coroutine whose fd became readable back to the alive list.
//!
//! Backends: epoll on Linux, kqueue on macOS/BSD.

use crate::engine::{CoroId, Engine};
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub use epoll::Poller;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
pub use kqueue::Poller;

/// Build an unblocker hook around `poller`.
///
/// The hook blocks in [`Poller::wait`] until at least one parked coroutine
/// can be unblocked, retrying on spurious wakeups. It returns without
/// unblocking anything only when the poller has no waiters, which lets
/// [`Engine::start`] terminate.
pub fn unblocker(poller: Rc<RefCell<Poller>>) -> impl FnMut(&mut Engine) {
    move |engine: &mut Engine| {
        loop {
            let ready: Vec<CoroId> = {
                let mut p = poller.borrow_mut();
                if !p.has_waiters() {
                    return;
                }
                p.wait(-1)
            };
            if !ready.is_empty() {
                for id in ready {
                    engine.unblock(id);
                }
                return;
            }
            // EINTR or spurious wakeup
        }
    }
}
