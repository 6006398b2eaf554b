//! # The kernel's fixed alias of physical memory
//!
//! Physical address `pa` is readable and writable at virtual
//! `KERNEL_BASE + pa` once the kernel address space is active. The
//! conversions here are pure offset arithmetic; they have no failure mode
//! other than an out-of-range input, which is a corrupted caller invariant
//! and panics.
//!
//! [`KernelAliasMapper`] packages the alias as the
//! [`PhysMapper`]/[`VirtMapper`] seams the allocators and the page-table
//! walk are written against. Host tests substitute an in-memory
//! implementation instead.

use kernel_info::memory::KERNEL_BASE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{PhysMapper, VirtMapper};

/// The kernel virtual alias of `pa`.
///
/// Panics if the alias would leave the 32-bit address space — i.e. `pa`
/// lies beyond the physical range the kernel tracks.
#[inline]
#[must_use]
pub const fn pa_to_kva(pa: PhysicalAddress) -> VirtualAddress {
    match pa.as_u32().checked_add(KERNEL_BASE) {
        Some(va) => VirtualAddress::new(va),
        None => panic!("physical address has no kernel alias"),
    }
}

/// The physical address behind the kernel alias `va`.
///
/// Panics if `va` lies below the kernel's virtual base — such an address
/// is never an alias and asking for its physical half is a caller bug.
#[inline]
#[must_use]
pub const fn kva_to_pa(va: VirtualAddress) -> PhysicalAddress {
    match va.as_u32().checked_sub(KERNEL_BASE) {
        Some(pa) => PhysicalAddress::new(pa),
        None => panic!("virtual address below the kernel base has no physical alias"),
    }
}

/// [`PhysMapper`]/[`VirtMapper`] for the live kernel address space.
///
/// # Safety
/// Only valid while a directory mapping the full physical alias is active;
/// [`MemoryManager::bootstrap`](crate::MemoryManager::bootstrap) builds
/// exactly that mapping.
pub struct KernelAliasMapper;

impl PhysMapper for KernelAliasMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa_to_kva(pa).as_usize() as *mut T;
        // SAFETY: caller guarantees `pa` is backed and writable through the
        // alias; the alias mapping itself is the manager's invariant.
        unsafe { &mut *va }
    }
}

impl VirtMapper for KernelAliasMapper {
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T {
        // A mapped kernel VA is directly dereferenceable; the MMU does the
        // translation.
        unsafe { &mut *(va.as_usize() as *mut T) }
    }
}
