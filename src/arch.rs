//! Architecture-specific switch primitive.
//!
//! Everything non-portable about coroutine switching is confined to the
//! `Regs` struct and two functions per architecture: `switch` and
//! `entry_arg`. The rest of the crate treats a `Regs` value as an opaque
//! resume point.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::*;
