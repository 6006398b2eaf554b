//! # Address Space (two-level, directory-rooted)
//!
//! Strongly-typed helpers to build and manipulate a **single** virtual
//! address space (a [`PageDirectory`] and the page tables hanging off it).
//!
//! ## Highlights
//!
//! - [`AddressSpace::walk`] to find — and optionally create — the table
//!   entry translating a virtual address.
//! - [`AddressSpace::map`] to install one 4 KiB mapping.
//! - [`AddressSpace::unmap`] to clear one, flush its cached translation and
//!   reclaim the page table once it runs empty.
//! - [`AddressSpace::translate`] to resolve a VA to its backing PA.
//! - [`AddressSpace::dump`] to log every present mapping (diagnostics only).
//!
//! ## Design
//!
//! - Table frames come from a caller-provided [`FrameAlloc`] and are
//!   returned there on reclamation; the address space owns the *entries*,
//!   never the allocator.
//! - Table memory is reached through the [`PhysMapper`] seam: the kernel
//!   alias before paging is active, the recursive window (see
//!   [`recursive`](crate::recursive)) afterwards — the walk itself does not
//!   care which.
//!
//! ## Safety
//!
//! - Mutating the **active** space requires TLB maintenance; [`unmap`] does
//!   its own `invlpg`, bulk changes want a CR3 reload.
//! - The mapper must yield writable references to table frames.

use crate::page_entry_bits::PageEntryBits;
use crate::page_table::{PageDirectory, PageTable, PdIndex, PtIndex, TABLE_ENTRIES, join_indices, split_indices};
use crate::{FrameAlloc, MapError, PhysMapper, tlb};
use kernel_info::memory::RECURSIVE_SLOT;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage};
use log::debug;

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage, // page-directory frame
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap the directory frame `root` (e.g. freshly carved at boot).
    ///
    /// The frame must hold a valid — possibly all-empty — directory.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the directory.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage {
        self.root
    }

    /// Borrow the directory as a typed table.
    #[inline]
    fn directory_mut(&self) -> &'m mut PageDirectory {
        // SAFETY: `root` names the directory frame and the mapper yields a
        // writable view of it; nothing else rewrites entries in a directory
        // once an address space owns it.
        unsafe { self.mapper.phys_to_mut(self.root.base()) }
    }

    /// Borrow the page table stored in `page`.
    #[inline]
    fn table_mut(&self, page: PhysicalPage) -> &'m mut PageTable {
        // SAFETY: only called with frames previously installed as tables.
        unsafe { self.mapper.phys_to_mut(page.base()) }
    }

    /// The table entry translating `va`, if its page table exists.
    fn lookup(&self, va: VirtualAddress) -> Option<&'m mut PageEntryBits> {
        let (pd, pt) = split_indices(va);
        let de = self.directory_mut().entry(pd);
        if !de.present() {
            return None;
        }
        Some(self.table_mut(de.physical_page()).entry_mut(pt))
    }

    /// Find the page-table entry slot for `va`.
    ///
    /// With `create`, a missing page table is allocated from `alloc`, zeroed
    /// and installed (present + writable + user) before the slot is
    /// returned. Returns `None` if the table is missing and `create` is
    /// false, **or** if `alloc` is exhausted — callers must treat that as
    /// "mapping could not be established", not as "already mapped".
    pub fn walk<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        create: bool,
    ) -> Option<&'m mut PageEntryBits> {
        let (pd, pt) = split_indices(va);
        let dir = self.directory_mut();
        let de = dir.entry(pd);
        let table = if de.present() {
            self.table_mut(de.physical_page())
        } else {
            if !create {
                return None;
            }
            let page = alloc.alloc_4k()?;
            let table = self.table_mut(page);
            table.zero();
            dir.set(pd, PageEntryBits::new_table(page));
            table
        };
        Some(table.entry_mut(pt))
    }

    /// Translate `va` to the physical address backing it, if mapped.
    ///
    /// The result combines the frame base with `va`'s in-page offset bits.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let entry = self.lookup(va)?;
        if !entry.present() {
            return None;
        }
        Some(entry.physical_page().join(va.offset_in_page()))
    }

    /// Map the page containing `va` to the frame containing `pa`
    /// (supervisor, writable).
    ///
    /// Mapping an already-mapped address silently replaces the prior
    /// translation.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a page table had to be created and the
    /// allocator is exhausted; no entry is written in that case.
    pub fn map<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
    ) -> Result<(), MapError> {
        let va = va.page_round_down();
        let page = PhysicalPage::containing_address(pa);
        let Some(entry) = self.walk(alloc, va, true) else {
            return Err(MapError::OutOfMemory);
        };
        *entry = PageEntryBits::new_leaf(page);
        Ok(())
    }

    /// Remove the mapping of the page containing `va`, if any.
    ///
    /// Clears the entry and flushes its cached translation. If that leaves
    /// the owning page table with no present entry, the table's frame goes
    /// back to `alloc` and the directory slot is cleared. The emptiness
    /// check is a full [`TABLE_ENTRIES`]-slot scan, so unmap is O(table
    /// size), not O(1).
    pub fn unmap<A: FrameAlloc>(&self, alloc: &mut A, va: VirtualAddress) {
        let va = va.page_round_down();
        let (pd, pt) = split_indices(va);
        let dir = self.directory_mut();
        let de = dir.entry(pd);
        if !de.present() {
            return;
        }
        let table_page = de.physical_page();
        let table = self.table_mut(table_page);
        if !table.entry(pt).present() {
            return;
        }
        table.set(pt, PageEntryBits::new());
        // SAFETY: the mapping just changed; dropping the stale translation
        // is required, not optional.
        unsafe { tlb::invalidate_page(VirtualPage::from_base(va)) };
        if table.is_empty() {
            dir.set(pd, PageEntryBits::new());
            alloc.free_4k(table_page);
        }
    }

    /// Log every present mapping, one line per page, via `log::debug!`.
    ///
    /// Diagnostics only; never called on an allocation path.
    pub fn dump(&self) {
        debug!("page directory in frame {}", self.root.base());
        let dir = self.directory_mut();
        for i in 0..TABLE_ENTRIES {
            if i == RECURSIVE_SLOT {
                continue; // self-map; dumping it would re-list the directory
            }
            let pd = PdIndex::new(i);
            let de = dir.entry(pd);
            if !de.present() {
                continue;
            }
            debug!("  dir[{i:4}] -> table in frame {}", de.physical_page().base());
            let table = self.table_mut(de.physical_page());
            for j in 0..TABLE_ENTRIES {
                let pt = PtIndex::new(j);
                let e = table.entry(pt);
                if e.present() {
                    debug!("    {} -> {}", join_indices(pd, pt), e.physical_page().base());
                }
            }
        }
    }
}
