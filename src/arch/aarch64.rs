//! aarch64 resume point and switch.

use std::arch::asm;
use std::arch::naked_asm;

/// Saved resume point of a suspended coroutine.
///
/// Under AAPCS64 the callee-saved set is x19-x28 plus fp/lr/sp, and the
/// lower 64 bits of v8-v15 (d8-d15).
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Regs {
    sp: u64,
    lr: u64,
    fp: u64,
    x19: u64,
    x20: u64,
    x21: u64,
    x22: u64,
    x23: u64,
    x24: u64,
    x25: u64,
    x26: u64,
    x27: u64,
    x28: u64,
    d8: u64,
    d9: u64,
    d10: u64,
    d11: u64,
    d12: u64,
    d13: u64,
    d14: u64,
    d15: u64,
}

impl Regs {
    /// Build the resume point for a coroutine that has never run.
    ///
    /// `stack_top` is the 16-byte aligned top of the coroutine's dedicated
    /// stack. The first switch into the returned state lands at `entry`,
    /// with `arg` readable through [`entry_arg`].
    pub fn initial(stack_top: usize, entry: usize, arg: u64) -> Self {
        // `ret` jumps to lr; nothing needs to be planted on the stack.
        Regs {
            sp: stack_top as u64,
            lr: entry as u64,
            x19: arg,
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
            "mov {}, x19",
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
    // x0 = save, x1 = load
    naked_asm!(
        // Save callee-saved registers into *save
        "mov x9, sp",
        "str x9,  [x0, #0x00]", // sp
        "str lr,  [x0, #0x08]", // lr (x30)
        "str fp,  [x0, #0x10]", // fp (x29)
        "str x19, [x0, #0x18]",
        "str x20, [x0, #0x20]",
        "str x21, [x0, #0x28]",
        "str x22, [x0, #0x30]",
        "str x23, [x0, #0x38]",
        "str x24, [x0, #0x40]",
        "str x25, [x0, #0x48]",
        "str x26, [x0, #0x50]",
        "str x27, [x0, #0x58]",
        "str x28, [x0, #0x60]",
        "str d8,  [x0, #0x68]",
        "str d9,  [x0, #0x70]",
        "str d10, [x0, #0x78]",
        "str d11, [x0, #0x80]",
        "str d12, [x0, #0x88]",
        "str d13, [x0, #0x90]",
        "str d14, [x0, #0x98]",
        "str d15, [x0, #0xa0]",
        // Load callee-saved registers from *load
        "ldr x9,  [x1, #0x00]",
        "mov sp, x9",
        "ldr lr,  [x1, #0x08]",
        "ldr fp,  [x1, #0x10]",
        "ldr x19, [x1, #0x18]",
        "ldr x20, [x1, #0x20]",
        "ldr x21, [x1, #0x28]",
        "ldr x22, [x1, #0x30]",
        "ldr x23, [x1, #0x38]",
        "ldr x24, [x1, #0x40]",
        "ldr x25, [x1, #0x48]",
        "ldr x26, [x1, #0x50]",
        "ldr x27, [x1, #0x58]",
        "ldr x28, [x1, #0x60]",
        "ldr d8,  [x1, #0x68]",
        "ldr d9,  [x1, #0x70]",
        "ldr d10, [x1, #0x78]",
        "ldr d11, [x1, #0x80]",
        "ldr d12, [x1, #0x88]",
        "ldr d13, [x1, #0x90]",
        "ldr d14, [x1, #0x98]",
        "ldr d15, [x1, #0xa0]",
        "ret",
    );
}
