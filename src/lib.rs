//! Single-thread cooperative coroutine engine.
//!
//! Many concurrent sessions, one OS thread: coroutines are scheduled
//! entirely in user space, each on its own dedicated stack, and hand control
//! to each other only at explicit `yield_now`/`sched`/`block` call sites.
//! There is no preemption and no locking; at most one coroutine runs at any
//! instant.
//!
//! # Example
//!
//! ```no_run
//! use greenrt::Engine;
//!
//! let mut engine = Engine::new();
//! engine
//!     .start(|eng| {
//!         eng.spawn(|eng| {
//!             println!("worker: first half");
//!             eng.yield_now();
//!             println!("worker: second half");
//!         });
//!         println!("main: letting the worker run");
//!         eng.yield_now();
//!         println!("main: back again");
//!     })
//!     .unwrap();
//! ```
//!
//! `start` returns once no coroutine can ever run again. Coroutines that
//! park themselves with [`Engine::block`] are woken by [`Engine::unblock`],
//! either from another coroutine or from the engine's unblocker hook, which
//! is the integration point for external readiness sources such as
//! [`netpoll::Poller`].

mod arch;
mod engine;
mod error;

/// Integrate fd readiness with the scheduler
pub mod netpoll;

/// Interfaces toward the cache layer
pub mod storage;

pub use engine::{CoroId, DEFAULT_STACK_SIZE, Engine, Unblocker};
pub use error::Error;
