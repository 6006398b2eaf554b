//! Hardware translation-cache and root-register access.
//!
//! Real instructions on `x86` only; hosted builds (unit tests) get inert
//! stand-ins so the higher layers can run unmodified.

use kernel_memory_addresses::{PhysicalPage, VirtualPage};

/// Drop any cached translation for `page` on this CPU (`invlpg`).
///
/// Must be called after changing or clearing a present mapping in the
/// active address space; the CPU is free to keep serving the stale
/// translation otherwise.
///
/// # Safety
/// Requires ring 0 on `x86`.
#[cfg(target_arch = "x86")]
#[inline]
pub unsafe fn invalidate_page(page: VirtualPage) {
    unsafe {
        core::arch::asm!(
            "invlpg [{}]",
            in(reg) page.base().as_u32(),
            options(nostack, preserves_flags)
        );
    }
}

/// Hosted stand-in; there is no translation cache to flush.
#[cfg(not(target_arch = "x86"))]
#[inline]
pub unsafe fn invalidate_page(page: VirtualPage) {
    let _ = page;
}

/// Load CR3 with `root`, activating that address space and flushing all
/// non-global cached translations.
///
/// # Safety
/// The directory must map the currently executing code and the kernel's
/// data, or the instruction after the load faults. Ring 0 only.
#[cfg(target_arch = "x86")]
#[inline]
pub unsafe fn load_root(root: PhysicalPage) {
    unsafe {
        core::arch::asm!("mov cr3, {}", in(reg) root.base().as_u32(), options(nostack, preserves_flags));
    }
}

/// Hosted stand-in for [`load_root`].
#[cfg(not(target_arch = "x86"))]
#[inline]
pub unsafe fn load_root(root: PhysicalPage) {
    let _ = root;
}
