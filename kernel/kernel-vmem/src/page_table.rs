//! # Page directory and page table structures
//!
//! Both levels are 4 KiB arrays of 1024 [`PageEntryBits`]; the types differ
//! only in what their entries point at (tables vs. frames), which is enough
//! to keep the two levels from being mixed up in the walk code.

use crate::page_entry_bits::PageEntryBits;
use kernel_memory_addresses::{PAGE_SHIFT, VirtualAddress};

/// Entries per page directory and per page table.
pub const TABLE_ENTRIES: usize = 1024;

/// Bit offset of the directory index within a virtual address.
pub const PD_SHIFT: u32 = 22;

/// An index into a page directory; always `< TABLE_ENTRIES`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct PdIndex(usize);

/// An index into a page table; always `< TABLE_ENTRIES`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct PtIndex(usize);

impl PdIndex {
    /// Wrap an index. Panics if `i` is out of range.
    #[must_use]
    pub const fn new(i: usize) -> Self {
        assert!(i < TABLE_ENTRIES, "page directory index out of range");
        Self(i)
    }

    /// The directory index (bits 31–22) of `va`.
    #[inline]
    #[must_use]
    pub const fn from_va(va: VirtualAddress) -> Self {
        Self((va.as_u32() >> PD_SHIFT) as usize)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl PtIndex {
    /// Wrap an index. Panics if `i` is out of range.
    #[must_use]
    pub const fn new(i: usize) -> Self {
        assert!(i < TABLE_ENTRIES, "page table index out of range");
        Self(i)
    }

    /// The table index (bits 21–12) of `va`.
    #[inline]
    #[must_use]
    pub const fn from_va(va: VirtualAddress) -> Self {
        Self(((va.as_u32() >> PAGE_SHIFT) & 0x3FF) as usize)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

/// Decompose a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (PdIndex, PtIndex) {
    (PdIndex::from_va(va), PtIndex::from_va(va))
}

/// Reconstruct the page-aligned virtual address selected by `(pd, pt)`.
///
/// Inverse of [`split_indices`] for page-aligned addresses; used by the
/// directory dump.
#[inline]
#[must_use]
pub const fn join_indices(pd: PdIndex, pt: PtIndex) -> VirtualAddress {
    VirtualAddress::new(((pd.as_usize() as u32) << PD_SHIFT) | ((pt.as_usize() as u32) << PAGE_SHIFT))
}

macro_rules! table_impl {
    ($name:ident, $index:ident) => {
        impl $name {
            /// Clear every entry (all not-present).
            pub const fn zero(&mut self) {
                self.entries = [PageEntryBits::new(); TABLE_ENTRIES];
            }

            #[inline]
            #[must_use]
            pub const fn entry(&self, i: $index) -> PageEntryBits {
                self.entries[i.as_usize()]
            }

            #[inline]
            #[must_use]
            pub const fn entry_mut(&mut self, i: $index) -> &mut PageEntryBits {
                &mut self.entries[i.as_usize()]
            }

            #[inline]
            pub const fn set(&mut self, i: $index, e: PageEntryBits) {
                self.entries[i.as_usize()] = e;
            }

            /// Whether no entry is present. A full scan over all
            /// [`TABLE_ENTRIES`] slots.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.entries.iter().all(|e| !e.present())
            }
        }
    };
}

/// The top-level structure of an address space: 1024 entries, each either
/// empty or pointing at a [`PageTable`].
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PageEntryBits; TABLE_ENTRIES],
}

/// The second-level structure: 1024 entries, each either empty or mapping a
/// physical frame.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; TABLE_ENTRIES],
}

table_impl!(PageDirectory, PdIndex);
table_impl!(PageTable, PtIndex);
