//! End-to-end scheduling behaviour of the engine.

use greenrt::{CoroId, Engine, Error};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<u32>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn interleaved_yields_run_in_list_order() {
    // B spawned first, then A via start, so alive = [A, B] and A runs first.
    let emitted = log();
    let mut engine = Engine::new();

    let b_log = emitted.clone();
    engine.spawn(move |eng| {
        b_log.borrow_mut().push(2);
        eng.yield_now();
        b_log.borrow_mut().push(4);
    });

    let a_log = emitted.clone();
    engine
        .start(move |eng| {
            a_log.borrow_mut().push(1);
            eng.yield_now();
            a_log.borrow_mut().push(3);
        })
        .unwrap();

    assert_eq!(*emitted.borrow(), vec![1, 2, 3, 4]);
}

#[test]
fn every_body_runs_exactly_once() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut engine = Engine::new();

    for tag in ["first", "second"] {
        let order = order.clone();
        engine.spawn(move |_| order.borrow_mut().push(tag));
    }

    let main_order = order.clone();
    engine
        .start(move |_| main_order.borrow_mut().push("main"))
        .unwrap();

    // Most recently spawned runs first; `main` is spawned last by start.
    assert_eq!(*order.borrow(), vec!["main", "second", "first"]);
}

#[test]
fn yield_with_sole_coroutine_is_noop() {
    let emitted = log();
    let out = emitted.clone();
    Engine::new()
        .start(move |eng| {
            let local = 40;
            eng.yield_now();
            out.borrow_mut().push(local + 2);
        })
        .unwrap();
    assert_eq!(*emitted.borrow(), vec![42]);
}

#[test]
fn block_resumes_at_call_site_with_locals_intact() {
    let emitted = log();
    let parked: Rc<Cell<Option<CoroId>>> = Rc::new(Cell::new(None));
    let hook_calls = Rc::new(Cell::new(0u32));

    let hook_parked = parked.clone();
    let hook_count = hook_calls.clone();
    let mut engine = Engine::with_unblocker(move |eng| {
        hook_count.set(hook_count.get() + 1);
        if let Some(id) = hook_parked.take() {
            eng.unblock(id);
        }
    });

    let out = emitted.clone();
    engine
        .start(move |eng| {
            let out = out.clone();
            let parked = parked.clone();
            eng.spawn(move |eng| {
                let local = 7;
                out.borrow_mut().push(1);
                parked.set(eng.current());
                eng.block(None);
                // back exactly here, locals untouched
                out.borrow_mut().push(local * 10);
            });
        })
        .unwrap();

    assert_eq!(*emitted.borrow(), vec![1, 70]);
    // once to unblock the worker, once more before shutdown
    assert_eq!(hook_calls.get(), 2);
}

#[test]
fn unblocker_runs_once_when_nothing_blocks() {
    let hook_calls = Rc::new(Cell::new(0u32));
    let count = hook_calls.clone();
    Engine::with_unblocker(move |_| count.set(count.get() + 1))
        .start(|_| {})
        .unwrap();
    assert_eq!(hook_calls.get(), 1);
}

#[test]
fn finished_coroutine_is_never_selected_again() {
    let emitted = log();
    let out = emitted.clone();
    Engine::new()
        .start(move |eng| {
            let child_out = out.clone();
            let child = eng.spawn(move |_| child_out.borrow_mut().push(9));
            eng.yield_now(); // child runs to completion
            assert!(!eng.is_runnable(child));
            assert!(!eng.is_blocked(child));
            eng.sched(Some(child)); // vacated handle: no-op
            out.borrow_mut().push(10);
        })
        .unwrap();
    assert_eq!(*emitted.borrow(), vec![9, 10]);
}

#[test]
fn sched_hands_off_to_the_named_target() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut engine = Engine::new();

    let main_order = order.clone();
    engine
        .start(move |eng| {
            let mut ids = Vec::new();
            for tag in ["a", "b", "c"] {
                let order = main_order.clone();
                ids.push(eng.spawn(move |_| order.borrow_mut().push(tag)));
            }
            main_order.borrow_mut().push("main");
            // jump straight to b, skipping c at the list head
            eng.sched(Some(ids[1]));
        })
        .unwrap();

    assert_eq!(*order.borrow(), vec!["main", "b", "c", "a"]);
}

#[test]
fn blocking_another_coroutine_does_not_switch() {
    let ran = Rc::new(Cell::new(false));
    let worker_ran = ran.clone();
    Engine::new()
        .start(move |eng| {
            let worker_ran = worker_ran.clone();
            let worker = eng.spawn(move |_| worker_ran.set(true));
            eng.block(Some(worker));
            assert!(eng.is_blocked(worker));
            eng.yield_now(); // nothing else alive: no-op
        })
        .unwrap();
    // never unblocked: swept at shutdown without running
    assert!(!ran.get());
}

#[test]
fn nested_start_is_rejected() {
    Engine::new()
        .start(|eng| {
            assert!(matches!(eng.start(|_| {}), Err(Error::AlreadyRunning)));
        })
        .unwrap();
}

#[test]
fn engine_can_be_started_again_after_finishing() {
    let emitted = log();
    let mut engine = Engine::new();
    for round in [1u32, 2] {
        let out = emitted.clone();
        engine
            .start(move |eng| {
                let out2 = out.clone();
                eng.spawn(move |_| out2.borrow_mut().push(round * 10));
                out.borrow_mut().push(round);
            })
            .unwrap();
    }
    assert_eq!(*emitted.borrow(), vec![1, 10, 2, 20]);
}
