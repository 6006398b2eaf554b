//! # Virtual Memory Support
//!
//! Two-level x86 (32-bit, non-PAE) paging for the kernel.
//!
//! ## What you get
//! - An [`AddressSpace`] rooted at a page directory, with
//!   walk/map/unmap/translate and a diagnostic dump.
//! - A 4 KiB-aligned [`PageDirectory`] / [`PageTable`] pair with typed
//!   indices.
//! - x86 page-table [`entry bits`](PageEntryBits) as a typed bitfield.
//! - The [recursive self-mapping](recursive) window.
//! - Tiny allocator/mapper seams ([`FrameAlloc`], [`PhysMapper`],
//!   [`VirtMapper`]).
//!
//! ## Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22     | 21‒12    | 11‒0   |
//! | Directory | Table    | Offset |
//! ```
//!
//! The CPU uses the two top fields as **indices** into two levels of page
//! tables, each level containing 1024 (2¹⁰) entries of 4 bytes (32 bits)
//! each:
//!
//! ```text
//!  Directory  →  Table  →  Physical Frame
//!     │           │
//!     │           └───► PTE (Page Table Entry)     → maps one 4 KiB page
//!     └───────────────► PDE (Page Directory Entry) → names one page table
//! ```
//!
//! The directory is itself one 4 KiB frame, named per address space by the
//! CR3 register. The final **Offset** field selects the byte inside the
//! mapped page, giving 1024 × 1024 × 4096 = 4 GiB of addressable virtual
//! space per directory.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod address_space;
mod page_entry_bits;
pub mod page_table;
pub mod recursive;
pub mod tlb;

pub use crate::address_space::AddressSpace;
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{PageDirectory, PageTable};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Minimal frame allocator seam used to obtain **physical** 4 KiB frames
/// for page tables, and to take them back when a table runs empty.
///
/// The implementation decides where frames come from (boot carve, free
/// list, ...). Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocate one 4 KiB physical frame.
    fn alloc_4k(&mut self) -> Option<PhysicalPage>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, page: PhysicalPage);
}

/// Converts physical addresses to usable pointers in the current virtual
/// address space.
///
/// Typical patterns:
/// - **Boot**: paging off or identity-mapped low memory; returns direct
///   pointers.
/// - **Kernel**: the fixed alias at `KERNEL_BASE + pa`, or the recursive
///   window for page-table frames.
/// - **Tests**: an in-memory buffer standing in for physical RAM.
///
/// # Safety
/// - `pa` must be mapped writable in the current page tables for `&mut T`.
/// - `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable pointer in the
    /// current address space.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Converts **mapped kernel virtual** addresses to usable pointers.
///
/// On hardware this is the identity — a mapped VA *is* a pointer — but the
/// heap goes through this seam so its chunk traffic can run against an
/// emulated address space in host tests.
///
/// # Safety
/// - `va` must be mapped writable for the full extent of `T`.
pub trait VirtMapper {
    /// Convert a mapped *virtual* address to a usable mutable pointer.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn virt_to_mut<'a, T>(&self, va: VirtualAddress) -> &'a mut T;
}

/// Failure of a mapping operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    /// No free frame was available to create a page table.
    #[error("out of physical frames while creating a page table")]
    OutOfMemory,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::split_indices;

    /// A 4 KiB-aligned raw frame; our "physical RAM" backing store in tests.
    #[repr(align(4096))]
    struct Aligned4K([u8; 4096]);

    impl Aligned4K {
        fn new_zeroed() -> Self {
            Self([0u8; 4096])
        }
    }

    /// A tiny in-memory "physical RAM": frame `n` lives at physical
    /// `n * 4096`, and the mapper turns a physical address into a pointer
    /// straight into the owned buffer.
    struct TestPhys {
        frames: Vec<Aligned4K>,
    }

    impl TestPhys {
        fn with_frames(n: usize) -> Self {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(Aligned4K::new_zeroed());
            }
            Self { frames: v }
        }
    }

    impl PhysMapper for TestPhys {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let (page, off) = pa.split();
            // For page tables we expect offset == 0; catch misuse early.
            debug_assert_eq!(off.as_u32(), 0);
            let idx = page.number() as usize;
            assert!(idx < self.frames.len());
            let ptr = unsafe { self.frames.as_ptr().add(idx).cast_mut() };
            unsafe { &mut *ptr.cast::<T>() }
        }
    }

    /// A bump allocator over the test frames that also records frees, so
    /// table reclamation is observable.
    struct BumpAlloc {
        next: u32,
        end: u32,
        freed: Vec<PhysicalPage>,
    }

    impl BumpAlloc {
        fn new(start: u32, end: u32) -> Self {
            Self {
                next: start,
                end,
                freed: Vec::new(),
            }
        }
    }

    impl FrameAlloc for BumpAlloc {
        fn alloc_4k(&mut self) -> Option<PhysicalPage> {
            if self.next >= self.end {
                return None;
            }
            let page = PhysicalPage::from_number(self.next);
            self.next += 1;
            Some(page)
        }

        fn free_4k(&mut self, page: PhysicalPage) {
            self.freed.push(page);
        }
    }

    fn fresh_space<'p>(phys: &'p TestPhys, alloc: &mut BumpAlloc) -> AddressSpace<'p, TestPhys> {
        let root = alloc.alloc_4k().unwrap();
        let space = AddressSpace::from_root(phys, root);
        unsafe { phys.phys_to_mut::<PageDirectory>(root.base()) }.zero();
        space
    }

    #[test]
    fn map_then_translate_returns_pa_plus_offset() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let space = fresh_space(&phys, &mut alloc);

        let va = VirtualAddress::new(0xC012_3456);
        let pa = PhysicalAddress::new(0x0000_5000);
        space.map(&mut alloc, va, pa).expect("map");

        assert_eq!(
            space.translate(va),
            Some(PhysicalAddress::new(0x0000_5456))
        );
        // Any address in the same page resolves through the same frame.
        assert_eq!(
            space.translate(VirtualAddress::new(0xC012_3000)),
            Some(PhysicalAddress::new(0x0000_5000))
        );
    }

    #[test]
    fn map_rounds_both_addresses_down() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let space = fresh_space(&phys, &mut alloc);

        space
            .map(
                &mut alloc,
                VirtualAddress::new(0x4000_0123),
                PhysicalAddress::new(0x0000_6FFF),
            )
            .expect("map");
        assert_eq!(
            space.translate(VirtualAddress::new(0x4000_0000)),
            Some(PhysicalAddress::new(0x0000_6000))
        );
    }

    #[test]
    fn unmapped_lookup_is_none_not_an_error() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc::new(0, 8);
        let space = fresh_space(&phys, &mut alloc);

        assert_eq!(space.translate(VirtualAddress::new(0x1234_5678)), None);
        assert!(space
            .walk(&mut alloc, VirtualAddress::new(0x1234_5678), false)
            .is_none());
    }

    #[test]
    fn map_unmap_translate_none() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let space = fresh_space(&phys, &mut alloc);

        let va = VirtualAddress::new(0xC000_2000);
        space
            .map(&mut alloc, va, PhysicalAddress::new(0x0000_3000))
            .expect("map");
        space.unmap(&mut alloc, va);
        assert_eq!(space.translate(va), None);
    }

    #[test]
    fn remap_overwrites_previous_translation() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let space = fresh_space(&phys, &mut alloc);

        let va = VirtualAddress::new(0xB000_0000);
        space
            .map(&mut alloc, va, PhysicalAddress::new(0x0000_4000))
            .expect("map");
        space
            .map(&mut alloc, va, PhysicalAddress::new(0x0000_9000))
            .expect("remap");
        assert_eq!(space.translate(va), Some(PhysicalAddress::new(0x0000_9000)));
    }

    #[test]
    fn unmapping_last_entry_reclaims_the_table() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let space = fresh_space(&phys, &mut alloc);

        // Two mappings through the same page table.
        let va1 = VirtualAddress::new(0xC000_1000);
        let va2 = VirtualAddress::new(0xC000_2000);
        space
            .map(&mut alloc, va1, PhysicalAddress::new(0x0000_5000))
            .expect("map");
        space
            .map(&mut alloc, va2, PhysicalAddress::new(0x0000_6000))
            .expect("map");

        space.unmap(&mut alloc, va1);
        assert!(alloc.freed.is_empty(), "table still holds va2");

        space.unmap(&mut alloc, va2);
        assert_eq!(alloc.freed.len(), 1, "empty table goes back to the allocator");

        // The directory slot is gone too: a lookup no longer reaches a table.
        assert!(space.walk(&mut alloc, va1, false).is_none());
    }

    #[test]
    fn unmap_of_absent_mapping_is_a_noop() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc::new(0, 8);
        let space = fresh_space(&phys, &mut alloc);

        space.unmap(&mut alloc, VirtualAddress::new(0xDEAD_B000));
        assert!(alloc.freed.is_empty());
    }

    #[test]
    fn exhaustion_reports_out_of_memory_and_writes_nothing() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc::new(0, 1); // root only; nothing for tables
        let space = fresh_space(&phys, &mut alloc);

        let va = VirtualAddress::new(0xC000_3000);
        assert_eq!(
            space.map(&mut alloc, va, PhysicalAddress::new(0x0000_2000)),
            Err(MapError::OutOfMemory)
        );
        assert_eq!(space.translate(va), None);
    }

    #[test]
    fn walk_create_installs_a_user_accessible_table() {
        let phys = TestPhys::with_frames(8);
        let mut alloc = BumpAlloc::new(0, 8);
        let space = fresh_space(&phys, &mut alloc);

        let va = VirtualAddress::new(0x0040_0000);
        let entry = space.walk(&mut alloc, va, true).expect("walk");
        assert!(!entry.present(), "fresh table entry starts empty");

        let (pd, _) = split_indices(va);
        let dir = unsafe { phys.phys_to_mut::<PageDirectory>(space.root_page().base()) };
        let de = dir.entry(pd);
        assert!(de.present() && de.writable() && de.user_access());
    }
}
