//! A coroutine parked on a pipe, woken by the poller-backed unblocker.

use greenrt::Engine;
use greenrt::netpoll::{self, Poller};
use std::cell::RefCell;
use std::rc::Rc;

fn main() {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        panic!("pipe failed: {}", std::io::Error::last_os_error());
    }
    let (rfd, wfd) = (fds[0], fds[1]);

    let poller = Rc::new(RefCell::new(Poller::new().expect("poller")));
    let hook_poller = poller.clone();

    let mut engine = Engine::with_unblocker(netpoll::unblocker(hook_poller));
    engine
        .start(move |eng| {
            let reader_poller = poller.clone();
            eng.spawn(move |eng| {
                let me = eng.current().expect("inside a coroutine");
                reader_poller.borrow_mut().watch_read(rfd, me).expect("watch");
                println!("[reader] waiting for the pipe");
                eng.block(None);
                reader_poller.borrow_mut().unwatch(rfd);

                let mut buf = [0u8; 32];
                let n = unsafe { libc::read(rfd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
                let msg = String::from_utf8_lossy(&buf[..n.max(0) as usize]);
                println!("[reader] got {msg:?}");
            });

            eng.yield_now(); // let the reader park first

            let msg = b"ping";
            unsafe { libc::write(wfd, msg.as_ptr() as *const libc::c_void, msg.len()) };
            println!("[writer] wrote to the pipe");
        })
        .expect("engine already running");

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}
