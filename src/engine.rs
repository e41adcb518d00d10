//! Cooperative scheduler: coroutine arena, alive/blocked lists, switching.
//!
//! One [`Engine`] owns every coroutine it ever created. Coroutines are
//! addressed by [`CoroId`] handles into a slot arena; the alive and blocked
//! sets are intrusive doubly-linked lists threaded through the slots.
//! Control transfer is strictly cooperative: a coroutine runs until it calls
//! [`Engine::yield_now`], [`Engine::sched`] or [`Engine::block`], or until
//! its body returns.

use crate::arch::{self, Regs};
use crate::error::Error;
use log::{debug, trace};
use std::cell::Cell;

/// Default size of each coroutine's dedicated stack (64 KiB).
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Stable handle to a coroutine owned by an [`Engine`].
///
/// A handle stays valid until the coroutine's body returns. Using it after
/// that is memory-safe but meaningless: the scheduling operations treat a
/// vacated handle as a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoroId(usize);

/// Hook invoked on the idle frame whenever no coroutine is runnable.
///
/// Moving coroutines from blocked to alive via [`Engine::unblock`] is the
/// only way for it to keep the run loop going; it may block on external I/O
/// before returning.
pub type Unblocker = Box<dyn FnMut(&mut Engine)>;

/// Which scheduler list a coroutine currently sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CoroState {
    Alive,
    Blocked,
}

/// Body of a coroutine that has not started yet, kept type-erased so a
/// never-run coroutine can free it on teardown.
struct PendingBody {
    arg: u64,
    drop_fn: unsafe fn(u64),
}

unsafe fn drop_body<F>(arg: u64) {
    drop(unsafe { Box::from_raw(arg as *mut F) });
}

/// Per-coroutine record: resume point, dedicated stack, list links.
struct Context {
    regs: Regs,
    /// Owned stack the coroutine executes on. Never moves: the buffer lives
    /// on the heap even when the `Context` itself is relocated.
    _stack: Vec<u8>,
    state: CoroState,
    prev: Option<CoroId>,
    next: Option<CoroId>,
    pending: Option<PendingBody>,
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(p) = self.pending.take() {
            unsafe { (p.drop_fn)(p.arg) };
        }
    }
}

thread_local! {
    /// Engine currently inside `start` on this thread. Exists only so the
    /// entry trampoline can reach the engine; set and restored by `start`.
    static ACTIVE: Cell<*mut Engine> = const { Cell::new(std::ptr::null_mut()) };
}

fn active_engine() -> *mut Engine {
    ACTIVE.with(|c| c.get())
}

/// Entry point of every coroutine.
///
/// The boxed body pointer arrives through a callee-saved register planted by
/// [`Regs::initial`]; it must be read before anything else runs.
extern "C" fn coro_entry<F>()
where
    F: FnOnce(&mut Engine) + 'static,
{
    let arg = arch::entry_arg();
    let engine = active_engine();
    debug_assert!(!engine.is_null(), "coroutine entered without an active engine");
    unsafe {
        if let Some(cur) = (*engine).current {
            if let Some(ctx) = (*engine).slot_mut(cur) {
                ctx.pending = None;
            }
        }
        let body = Box::from_raw(arg as *mut F);
        body(&mut *engine);
        (*engine).finish_current();
    }
}

/// Single-thread cooperative coroutine scheduler.
///
/// Not `Send`/`Sync`: one engine belongs to one thread, and all coroutines
/// it runs share that thread. See the crate docs for an overview.
pub struct Engine {
    slots: Vec<Option<Context>>,
    free: Vec<usize>,
    /// Head of the runnable list. Most recently spawned first.
    alive: Option<CoroId>,
    /// Head of the parked list.
    blocked: Option<CoroId>,
    current: Option<CoroId>,
    /// Resume point of the run-loop frame inside `start`.
    idle: Regs,
    /// Finished coroutine awaiting its drop. We are never running on its
    /// stack by the time the idle frame clears it.
    graveyard: Option<Context>,
    unblocker: Option<Unblocker>,
    running: bool,
    stack_size: usize,
}

impl Engine {
    pub fn new() -> Engine {
        Engine {
            slots: Vec::new(),
            free: Vec::new(),
            alive: None,
            blocked: None,
            current: None,
            idle: Regs::default(),
            graveyard: None,
            unblocker: None,
            running: false,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Engine with an unblocker hook installed up front.
    pub fn with_unblocker(hook: impl FnMut(&mut Engine) + 'static) -> Engine {
        let mut engine = Engine::new();
        engine.set_unblocker(hook);
        engine
    }

    /// Install or replace the unblocker hook.
    pub fn set_unblocker(&mut self, hook: impl FnMut(&mut Engine) + 'static) {
        self.unblocker = Some(Box::new(hook));
    }

    /// Stack size for coroutines spawned after this call.
    pub fn set_stack_size(&mut self, bytes: usize) {
        assert!(bytes >= 4 * 1024, "coroutine stack must be at least 4 KiB");
        self.stack_size = bytes;
    }

    /// Handle of the coroutine currently executing, `None` on the idle frame.
    pub fn current(&self) -> Option<CoroId> {
        self.current
    }

    /// True while `id` names a live coroutine on the alive list.
    pub fn is_runnable(&self, id: CoroId) -> bool {
        self.slot(id).map(|c| c.state) == Some(CoroState::Alive)
    }

    /// True while `id` names a live coroutine on the blocked list.
    pub fn is_blocked(&self, id: CoroId) -> bool {
        self.slot(id).map(|c| c.state) == Some(CoroState::Blocked)
    }

    /// Register a new coroutine and link it at the front of the alive list.
    ///
    /// The body does not run until the scheduler selects it. Spawning works
    /// both before [`start`](Engine::start) and from inside a running
    /// coroutine.
    pub fn spawn<F>(&mut self, body: F) -> CoroId
    where
        F: FnOnce(&mut Engine) + 'static,
    {
        let mut stack = vec![0u8; self.stack_size];
        // Stacks grow downward; align the top to 16 bytes for the ABI.
        let top = (stack.as_mut_ptr() as usize + stack.len()) & !0xF;
        let arg = Box::into_raw(Box::new(body)) as u64;
        let ctx = Context {
            regs: Regs::initial(top, coro_entry::<F> as usize, arg),
            _stack: stack,
            state: CoroState::Alive,
            prev: None,
            next: None,
            pending: Some(PendingBody {
                arg,
                drop_fn: drop_body::<F>,
            }),
        };
        let id = self.insert(ctx);
        self.push_front(CoroState::Alive, id);
        debug!("spawned coroutine {:?}", id);
        id
    }

    /// Run the coroutine program to completion.
    ///
    /// Spawns `main`, then loops on the idle frame: hand control to the head
    /// of the alive list; when the list drains, invoke the unblocker hook
    /// and try again. Returns once the alive list is still empty after a
    /// hook invocation; at that point no coroutine can ever run again, and
    /// every remaining context (parked ones included) is swept.
    ///
    /// Stacks of swept parked coroutines are freed, but destructors of
    /// values still owned by their suspended frames do not run.
    ///
    /// Fails with [`Error::AlreadyRunning`] when called from inside a
    /// coroutine of this engine.
    pub fn start<F>(&mut self, main: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Engine) + 'static,
    {
        if self.running {
            return Err(Error::AlreadyRunning);
        }
        self.running = true;
        self.current = None;
        self.idle = Regs::default();
        self.spawn(main);
        let prev = ACTIVE.with(|c| c.replace(self as *mut Engine));
        debug!("engine running");
        loop {
            self.reap();
            match self.alive {
                Some(next) => self.switch_to(next),
                None => {
                    if let Some(mut hook) = self.unblocker.take() {
                        trace!("alive list empty, invoking unblocker");
                        hook(self);
                        if self.unblocker.is_none() {
                            self.unblocker = Some(hook);
                        }
                    }
                    if self.alive.is_none() {
                        break;
                    }
                }
            }
        }
        self.reap();
        self.sweep();
        ACTIVE.with(|c| c.set(prev));
        self.running = false;
        debug!("engine stopped");
        Ok(())
    }

    /// Hand control to the alive-list successor of the current coroutine.
    ///
    /// No-op when nothing else is runnable, and outside [`start`]: switching
    /// is only possible while the run loop owns the idle frame.
    /// Selection wraps around the list and skips the caller; there is no
    /// fairness guarantee beyond that.
    ///
    /// [`start`]: Engine::start
    pub fn yield_now(&mut self) {
        if !self.running {
            return;
        }
        if let Some(next) = self.successor_of_current() {
            self.switch_to(next);
        }
    }

    /// Hand control to `target`, resuming it where it last suspended.
    ///
    /// `None` or the current coroutine's own handle degrade to
    /// [`yield_now`](Engine::yield_now). A vacated handle is ignored, as is
    /// any call outside [`start`](Engine::start). The call returns when some
    /// later switch resumes the caller.
    pub fn sched(&mut self, target: Option<CoroId>) {
        if !self.running {
            return;
        }
        let Some(target) = target else {
            return self.yield_now();
        };
        if Some(target) == self.current {
            return self.yield_now();
        }
        if self.slot(target).is_none() {
            trace!("sched on vacated handle {:?}", target);
            return;
        }
        self.switch_to(target);
    }

    /// Park a coroutine on the blocked list.
    ///
    /// `None` (or the current handle) parks the caller and immediately hands
    /// control elsewhere; the call returns only after [`unblock`] and a
    /// later scheduling decision resume it. A non-current target is merely
    /// relocated, without a switch.
    ///
    /// [`unblock`]: Engine::unblock
    pub fn block(&mut self, target: Option<CoroId>) {
        match target {
            Some(id) if Some(id) != self.current => {
                if self.slot(id).map(|c| c.state) == Some(CoroState::Alive) {
                    self.unlink(id);
                    self.push_front(CoroState::Blocked, id);
                    debug!("coroutine {:?} blocked", id);
                }
            }
            _ => {
                let Some(cur) = self.current else { return };
                // Pick where to go before the links change under us.
                let next = self.successor_of_current();
                self.unlink(cur);
                self.push_front(CoroState::Blocked, cur);
                debug!("coroutine {:?} parked", cur);
                match next {
                    Some(next) => self.switch_to(next),
                    None => self.switch_to_idle(),
                }
            }
        }
    }

    /// Move a blocked coroutine back to the alive list.
    ///
    /// Does not switch control; the coroutine becomes eligible for future
    /// selection. No-op when `id` is already alive or vacated.
    pub fn unblock(&mut self, id: CoroId) {
        if self.slot(id).map(|c| c.state) != Some(CoroState::Blocked) {
            return;
        }
        self.unlink(id);
        self.push_front(CoroState::Alive, id);
        debug!("coroutine {:?} unblocked", id);
    }

    /// Alive-list entry following `current`, wrapping and skipping the
    /// caller. From the idle frame this is simply the list head.
    fn successor_of_current(&self) -> Option<CoroId> {
        let cur = match self.current {
            Some(cur) => cur,
            None => return self.alive,
        };
        let next = self.slot(cur)?.next.or(self.alive);
        next.filter(|&n| n != cur)
    }

    /// Save the running frame and resume `target`. Returns when a later
    /// switch resumes the saved frame.
    fn switch_to(&mut self, target: CoroId) {
        trace!("switch {:?} -> {:?}", self.current, target);
        let save: *mut Regs = match self.current {
            Some(cur) => &mut self.slot_mut(cur).expect("current coroutine vacated").regs,
            None => &mut self.idle,
        };
        let load: *const Regs = &self.slot(target).expect("switch to vacated handle").regs;
        self.current = Some(target);
        // Raw pointers: the switch needs both resume points at once, which
        // the borrow checker cannot express. The save is written before
        // control leaves this frame.
        unsafe { arch::switch(save, load) };
    }

    /// Save the running coroutine and resume the run loop inside `start`.
    fn switch_to_idle(&mut self) {
        let cur = self
            .current
            .take()
            .expect("switch_to_idle outside a coroutine");
        trace!("switch {:?} -> idle", cur);
        let save: *mut Regs = &mut self.slot_mut(cur).expect("current coroutine vacated").regs;
        let load: *const Regs = &self.idle;
        unsafe { arch::switch(save, load) };
    }

    /// Retire the current coroutine after its body returned. Never returns:
    /// the finished frame must not be fallen back through.
    fn finish_current(&mut self) -> ! {
        let id = self
            .current
            .take()
            .expect("finish without a current coroutine");
        self.unlink(id);
        let ctx = self.slots[id.0].take().expect("finished coroutine vacated");
        self.free.push(id.0);
        debug!("coroutine {:?} finished", id);
        // Still executing on ctx's stack: park the carcass for the idle
        // frame to drop once control is off it.
        self.graveyard = Some(ctx);
        let save: *mut Regs = &mut self.graveyard.as_mut().expect("graveyard just filled").regs;
        let load: *const Regs = &self.idle;
        unsafe { arch::switch(save, load) };
        unreachable!("finished coroutine was resumed");
    }

    /// Drop the stack of the most recently finished coroutine.
    fn reap(&mut self) {
        self.graveyard = None;
    }

    /// Free every context still reachable from either list.
    fn sweep(&mut self) {
        while let Some(id) = self.alive {
            self.unlink(id);
            self.release(id);
        }
        let mut parked = 0usize;
        while let Some(id) = self.blocked {
            self.unlink(id);
            self.release(id);
            parked += 1;
        }
        if parked > 0 {
            debug!("swept {parked} coroutines still parked at shutdown");
        }
        self.current = None;
    }

    fn release(&mut self, id: CoroId) {
        if self.slots[id.0].take().is_some() {
            self.free.push(id.0);
        }
    }

    fn insert(&mut self, ctx: Context) -> CoroId {
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(ctx);
                CoroId(i)
            }
            None => {
                self.slots.push(Some(ctx));
                CoroId(self.slots.len() - 1)
            }
        }
    }

    fn slot(&self, id: CoroId) -> Option<&Context> {
        self.slots.get(id.0)?.as_ref()
    }

    fn slot_mut(&mut self, id: CoroId) -> Option<&mut Context> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    fn list_head_mut(&mut self, state: CoroState) -> &mut Option<CoroId> {
        match state {
            CoroState::Alive => &mut self.alive,
            CoroState::Blocked => &mut self.blocked,
        }
    }

    fn push_front(&mut self, state: CoroState, id: CoroId) {
        let head = *self.list_head_mut(state);
        {
            let ctx = self.slot_mut(id).expect("push_front on vacated handle");
            ctx.state = state;
            ctx.prev = None;
            ctx.next = head;
        }
        if let Some(h) = head {
            self.slot_mut(h).expect("list head vacated").prev = Some(id);
        }
        *self.list_head_mut(state) = Some(id);
    }

    fn unlink(&mut self, id: CoroId) {
        let (state, prev, next) = {
            let ctx = self.slot_mut(id).expect("unlink on vacated handle");
            let links = (ctx.state, ctx.prev, ctx.next);
            ctx.prev = None;
            ctx.next = None;
            links
        };
        match prev {
            Some(p) => self.slot_mut(p).expect("list neighbour vacated").next = next,
            None => *self.list_head_mut(state) = next,
        }
        if let Some(n) = next {
            self.slot_mut(n).expect("list neighbour vacated").prev = prev;
        }
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn list_ids(engine: &Engine, mut head: Option<CoroId>) -> Vec<CoroId> {
        let mut ids = Vec::new();
        while let Some(id) = head {
            ids.push(id);
            head = engine.slot(id).unwrap().next;
        }
        ids
    }

    #[test]
    fn spawn_links_at_front() {
        let mut engine = Engine::new();
        let a = engine.spawn(|_| {});
        let b = engine.spawn(|_| {});
        let c = engine.spawn(|_| {});
        assert_eq!(list_ids(&engine, engine.alive), vec![c, b, a]);
        assert!(engine.blocked.is_none());
    }

    #[test]
    fn block_and_unblock_relink() {
        let mut engine = Engine::new();
        let a = engine.spawn(|_| {});
        let b = engine.spawn(|_| {});
        engine.block(Some(a));
        assert_eq!(list_ids(&engine, engine.alive), vec![b]);
        assert_eq!(list_ids(&engine, engine.blocked), vec![a]);
        assert!(engine.is_blocked(a));

        engine.unblock(a);
        assert!(engine.is_runnable(a));
        assert_eq!(list_ids(&engine, engine.alive), vec![a, b]);

        // already alive: no-op
        engine.unblock(a);
        assert_eq!(list_ids(&engine, engine.alive), vec![a, b]);
    }

    #[test]
    fn unlink_middle_entry() {
        let mut engine = Engine::new();
        let a = engine.spawn(|_| {});
        let b = engine.spawn(|_| {});
        let c = engine.spawn(|_| {});
        engine.block(Some(b));
        assert_eq!(list_ids(&engine, engine.alive), vec![c, a]);
        engine.block(Some(c));
        engine.block(Some(a));
        assert_eq!(list_ids(&engine, engine.blocked), vec![a, c, b]);
        assert!(engine.alive.is_none());
    }

    #[test]
    fn scheduling_outside_start_is_a_noop() {
        let mut engine = Engine::new();
        let a = engine.spawn(|_| {});
        // No run loop yet: there is no frame to switch away from.
        engine.sched(Some(a));
        engine.yield_now();
        assert_eq!(engine.current(), None);
        assert!(engine.is_runnable(a));
        assert_eq!(list_ids(&engine, engine.alive), vec![a]);
    }

    #[test]
    fn arena_swept_after_start() {
        let mut engine = Engine::new();
        engine
            .start(|eng| {
                // parks forever; must still be freed on shutdown
                eng.spawn(|eng| eng.block(None));
            })
            .unwrap();
        assert!(engine.alive.is_none());
        assert!(engine.blocked.is_none());
        assert!(engine.slots.iter().all(|s| s.is_none()));
        assert_eq!(engine.free.len(), engine.slots.len());
    }

    #[test]
    fn pending_bodies_dropped_with_engine() {
        let token = Rc::new(());
        let mut engine = Engine::new();
        let held = Rc::clone(&token);
        engine.spawn(move |_| drop(held));
        assert_eq!(Rc::strong_count(&token), 2);
        drop(engine);
        assert_eq!(Rc::strong_count(&token), 1);
    }
}
