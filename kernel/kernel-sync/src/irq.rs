//! Interrupt-disabling critical sections.
//!
//! The allocators and the page-table code mutate their lists in multi-step,
//! non-atomic sequences. A hardware interrupt arriving mid-sequence whose
//! handler allocates or maps would observe (and corrupt) a half-updated
//! structure, so every mutating memory-manager operation runs under an
//! [`IrqGuard`] for its full duration.
//!
//! # Platform
//!
//! Uses `cli`/`sti` and `pushfd`/`pop` and therefore targets `x86`. On hosted
//! targets (unit tests) the guard is inert: there is no interrupt flag to
//! save, and the test harness provides no asynchronous preemption.
//!
//! # Safety & Privilege
//!
//! On `x86` these operations must run at a privilege level where `cli`/`sti`
//! are legal (ring 0).

/// Disables hardware interrupts (`cli`).
#[cfg(target_arch = "x86")]
#[inline]
pub fn cli_stop_interrupts() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
}

/// Enables hardware interrupts (`sti`).
#[cfg(target_arch = "x86")]
#[inline]
pub fn sti_enable_interrupts() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
}

/// Returns the current `EFLAGS` value (via `pushfd`/`pop`).
///
/// Bit 9 (`IF`) indicates whether interrupts are enabled.
#[cfg(target_arch = "x86")]
#[inline]
#[must_use]
pub fn eflags() -> u32 {
    let r: u32;
    unsafe { core::arch::asm!("pushfd; pop {}", out(reg) r, options(nostack, preserves_flags)) }
    r
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the `IF` bit (bit 9 of `EFLAGS`). If
/// interrupts were enabled, it executes `cli`. On drop, it executes `sti`
/// **only** if they were previously enabled, preserving the original state.
/// Guards therefore nest correctly.
pub struct IrqGuard {
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    /// Disables interrupts if they are currently enabled and remembers the
    /// state.
    #[cfg(target_arch = "x86")]
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = (eflags() & (1 << 9)) != 0;
        if enabled {
            cli_stop_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }

    /// Hosted fallback: nothing to disable.
    #[cfg(not(target_arch = "x86"))]
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            were_enabled: false,
        }
    }
}

impl Drop for IrqGuard {
    /// Restores interrupts (`sti`) only if they were previously enabled.
    fn drop(&mut self) {
        #[cfg(target_arch = "x86")]
        if self.were_enabled {
            sti_enable_interrupts();
        }
        #[cfg(not(target_arch = "x86"))]
        let _ = self.were_enabled;
    }
}
