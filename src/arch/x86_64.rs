//! x86_64 resume point and switch.

use std::arch::asm;
use std::arch::naked_asm;

/// Saved resume point of a suspended coroutine.
///
/// On x86_64 System V, the callee-saved registers plus the stack pointer are
/// a complete resume point: everything else is caller-saved, so the compiler
/// has already spilled whatever it needs before the `switch` call.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Regs {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

impl Regs {
    /// Build the resume point for a coroutine that has never run.
    ///
    /// `stack_top` is the 16-byte aligned top of the coroutine's dedicated
    /// stack. The first switch into the returned state lands at `entry`,
    /// with `arg` readable through [`entry_arg`].
    pub fn initial(stack_top: usize, entry: usize, arg: u64) -> Self {
        // The ABI wants RSP at 16n before `call`, i.e. 16n+8 at function
        // entry. We enter via `ret`, so park the entry address at
        // stack_top-16; after `ret` pops it, RSP = stack_top-8.
        let rsp = stack_top - 16;
        unsafe {
            std::ptr::write(rsp as *mut u64, entry as u64);
        }
        Regs {
            rsp: rsp as u64,
            r15: arg,
            ..Default::default()
        }
    }
}

/// Read the value placed in a callee-saved register by [`Regs::initial`].
///
/// Only meaningful as the very first thing a coroutine entry function does,
/// before any call could clobber the register.
pub fn entry_arg() -> u64 {
    let arg: u64;
    unsafe {
        asm!(
            "mov {}, r15",
            out(reg) arg,
            options(nomem, nostack, preserves_flags)
        );
    }
    arg
}

/// Suspend the current computation into `save` and resume `load`.
///
/// Returns when some later switch resumes `save`.
///
/// # Safety
/// Both pointers must be valid and distinct, and `load` must hold a resume
/// point produced by [`Regs::initial`] or by a previous switch whose stack
/// is still allocated.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(_save: *mut Regs, _load: *const Regs) {
    naked_asm!(
        // Save callee-saved registers into *save (rdi)
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // Load callee-saved registers from *load (rsi)
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        // Fresh coroutine: pops the entry address planted by Regs::initial.
        // Suspended coroutine: returns to its switch call site.
        "ret",
    );
}
