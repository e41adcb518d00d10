//! Poller-driven unblocking over a pipe.

#![cfg(unix)]

use greenrt::Engine;
use greenrt::netpoll::{self, Poller};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn poller_unblocks_fd_reader() {
    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let (rfd, wfd) = (fds[0], fds[1]);

    let poller = Rc::new(RefCell::new(Poller::new().unwrap()));
    let mut engine = Engine::with_unblocker(netpoll::unblocker(poller.clone()));

    let log: Rc<RefCell<Vec<&str>>> = Rc::new(RefCell::new(Vec::new()));
    let main_log = log.clone();
    engine
        .start(move |eng| {
            let reader_log = main_log.clone();
            let reader_poller = poller.clone();
            eng.spawn(move |eng| {
                let me = eng.current().unwrap();
                reader_poller.borrow_mut().watch_read(rfd, me).unwrap();
                reader_log.borrow_mut().push("parked");
                eng.block(None);
                reader_poller.borrow_mut().unwatch(rfd);

                let mut buf = [0u8; 8];
                let n = unsafe { libc::read(rfd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
                assert_eq!(n, 5);
                assert_eq!(&buf[..5], b"hello");
                reader_log.borrow_mut().push("read");
            });

            eng.yield_now(); // reader registers and parks

            let msg = b"hello";
            let n = unsafe { libc::write(wfd, msg.as_ptr() as *const libc::c_void, msg.len()) };
            assert_eq!(n, 5);
            main_log.borrow_mut().push("wrote");
        })
        .unwrap();

    assert_eq!(*log.borrow(), vec!["parked", "wrote", "read"]);

    unsafe {
        libc::close(rfd);
        libc::close(wfd);
    }
}
