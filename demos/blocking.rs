//! Producer/consumer over a shared queue using block/unblock.
//!
//! The consumer parks itself when the queue is empty; the producer wakes it
//! after pushing. No unblocker hook is needed because the producer lives in
//! the same engine.

use greenrt::{CoroId, Engine};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

fn main() {
    let queue: Rc<RefCell<VecDeque<u32>>> = Rc::new(RefCell::new(VecDeque::new()));
    let consumer_id: Rc<Cell<Option<CoroId>>> = Rc::new(Cell::new(None));

    let mut engine = Engine::new();
    engine
        .start(move |eng| {
            let q = queue.clone();
            let me = consumer_id.clone();
            eng.spawn(move |eng| {
                me.set(eng.current());
                let mut received = 0;
                while received < 5 {
                    let item = q.borrow_mut().pop_front();
                    match item {
                        Some(item) => {
                            println!("[consumer] got {item}");
                            received += 1;
                        }
                        None => {
                            println!("[consumer] queue empty, parking");
                            eng.block(None);
                        }
                    }
                }
                println!("[consumer] done");
            });

            let q = queue.clone();
            let consumer = consumer_id.clone();
            eng.spawn(move |eng| {
                for item in 0..5u32 {
                    q.borrow_mut().push_back(item);
                    println!("[producer] pushed {item}");
                    if let Some(id) = consumer.get() {
                        eng.unblock(id);
                    }
                    eng.yield_now();
                }
                println!("[producer] done");
            });
        })
        .expect("engine already running");
}
