//! # Boot Information
//!
//! The multiboot-style information block the boot loader leaves behind.
//! Only the fields the memory manager consumes are modelled; the block is
//! read-only from the kernel's point of view.

/// Bit in [`BootInfo::flags`] indicating that the memory sizes are valid.
pub const MEMORY_VALID: u32 = 1 << 6;

/// Information the kernel needs from the boot loader.
///
/// Keep this `#[repr(C)]` with fixed-size integers: it is read straight from
/// the loader-provided block at a physical address.
#[repr(C)]
#[derive(Clone)]
pub struct BootInfo {
    /// Validity flags; see [`MEMORY_VALID`].
    pub flags: u32,

    /// Lower (conventional) memory size in KiB, counted from address 0.
    pub mem_lower_kb: u32,

    /// Upper memory size in KiB, counted from
    /// [`UPPER_MEMORY_START`](crate::memory::UPPER_MEMORY_START).
    pub mem_upper_kb: u32,
}

impl BootInfo {
    /// Whether the loader filled in the memory sizes.
    #[must_use]
    pub const fn memory_map_valid(&self) -> bool {
        self.flags & MEMORY_VALID != 0
    }
}
