//! # Recursive self-mapping
//!
//! One page-directory slot ([`RECURSIVE_SLOT`]) points back at the
//! directory's own frame. The hardware walk then resolves the top 4 MiB of
//! the address space ([`RECURSIVE_WINDOW_BASE`]`..`) through the directory
//! *twice*, which makes every page table of the active space — and the
//! directory itself, in the window's last page — addressable as ordinary
//! virtual memory:
//!
//! ```text
//! table of dir[pdx]   at  WINDOW_BASE + pdx * 4096
//! entry for va        at  WINDOW_BASE + pdx(va) * 4096 + ptx(va) * 4
//! the directory       at  WINDOW_BASE + RECURSIVE_SLOT * 4096  (0xFFFFF000)
//! ```
//!
//! The kernel relies on this window to edit page tables once paging is
//! active and the tables' frames are no longer covered by a direct alias.

use crate::page_entry_bits::PageEntryBits;
use crate::page_table::{PageDirectory, PdIndex, split_indices};
use kernel_info::memory::{RECURSIVE_SLOT, RECURSIVE_WINDOW_BASE};
use kernel_memory_addresses::{PAGE_SHIFT, PhysicalPage, VirtualAddress};

/// Point the reserved directory slot at the directory's own frame.
///
/// Supervisor-only and writable; the window must never be visible to user
/// mode.
pub fn install_recursive(dir: &mut PageDirectory, root: PhysicalPage) {
    let mut entry = PageEntryBits::new().with_present(true).with_writable(true);
    entry.set_physical_page(root);
    dir.set(PdIndex::new(RECURSIVE_SLOT), entry);
}

/// Window address of the page table covering `pd`.
#[inline]
#[must_use]
pub const fn table_window_va(pd: PdIndex) -> VirtualAddress {
    VirtualAddress::new(RECURSIVE_WINDOW_BASE | ((pd.as_usize() as u32) << PAGE_SHIFT))
}

/// Window address of the page-table entry that translates `va`.
#[inline]
#[must_use]
pub const fn entry_window_va(va: VirtualAddress) -> VirtualAddress {
    let (pd, pt) = split_indices(va);
    VirtualAddress::new(
        RECURSIVE_WINDOW_BASE
            | ((pd.as_usize() as u32) << PAGE_SHIFT)
            | ((pt.as_usize() as u32) * 4),
    )
}

/// Window address of the page directory itself.
#[inline]
#[must_use]
pub const fn directory_window_va() -> VirtualAddress {
    table_window_va(PdIndex::new(RECURSIVE_SLOT))
}

/// Window address of the directory entry for `va` (a slot inside the
/// directory's own window page).
#[inline]
#[must_use]
pub const fn directory_entry_window_va(va: VirtualAddress) -> VirtualAddress {
    let pd = PdIndex::from_va(va);
    VirtualAddress::new(directory_window_va().as_u32() | ((pd.as_usize() as u32) * 4))
}
