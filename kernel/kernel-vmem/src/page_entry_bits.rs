use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// A single 32-bit page-directory or page-table entry in its raw bitfield
/// form.
///
/// This structure models the common superset of fields found at both paging
/// levels (PDE, PTE). A zero value is a **not-present** entry.
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|----------|
/// | 0     | `P` (present)   | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (leaf only) |
/// | 7     | `PS`            | Large page flag (PDE only; unused here) |
/// | 8     | `G`             | Global (leaf only) |
/// | 9–11  | OS avail        | Reserved for OS use |
/// | 12–31 | frame           | Physical frame bits [31:12] |
///
/// ### Notes
/// - The frame field always omits the lower 12 bits, which are implicitly
///   zero due to alignment.
/// - `PS` would turn a directory entry into a 4 MiB leaf; this kernel maps
///   everything through 4 KiB page tables and never sets it.
#[bitfield(u32)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Set if the entry points to a valid page table or a valid frame.
    /// Clear implies a not-present entry; all other bits are then ignored
    /// by the hardware walk.
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode access; clear restricts to supervisor only.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first access through this
    /// entry; software may clear it to track usage.
    pub accessed: bool,

    /// Dirty (D, bit 6) — leaf only. Set by the CPU on first write.
    pub dirty: bool,

    /// Page Size (PS, bit 7) — directory level only. Never set here.
    pub large_page: bool,

    /// Global (G, bit 8) — leaf only. Survives address-space switches.
    pub global_translation: bool,

    /// OS-available (bits 9..=11). Hardware does not interpret these.
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame bits [31:12] (bits 12..=31).
    ///
    /// Stores the page-aligned frame address without the low 12 bits.
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntryBits {
    /// The frame this entry points at (a page table for a directory entry,
    /// a mapped frame for a table entry).
    #[inline]
    #[must_use]
    pub const fn physical_page(&self) -> PhysicalPage {
        PhysicalPage::from_number(self.frame_bits())
    }

    #[inline]
    pub const fn set_physical_page(&mut self, page: PhysicalPage) {
        self.set_frame_bits(page.number());
    }

    /// A directory entry pointing at the page table in `page`.
    ///
    /// Present + writable + user, matching the most permissive leaf the
    /// table may hold; per-page permissions live in the table entries.
    #[inline]
    #[must_use]
    pub const fn new_table(page: PhysicalPage) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
            .with_frame_bits(page.number())
    }

    /// A table entry mapping `page` for supervisor read/write access.
    #[inline]
    #[must_use]
    pub const fn new_leaf(page: PhysicalPage) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_frame_bits(page.number())
    }
}
