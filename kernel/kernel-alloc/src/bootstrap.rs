//! One-way, page-granular allocation for the window between "kernel is
//! running" and "frame allocator exists".
//!
//! The frame-metadata table and the initial page directory have to live
//! somewhere before any general allocator is up; this bump cursor carves
//! them out of the flat physical space that follows the loaded kernel
//! image. There is no free and no reuse — once the frame allocator owns
//! the memory map, everything carved here is classified as permanently
//! reserved.

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, align_up};

/// Bump allocator over the physical memory after the kernel image.
pub struct BootstrapAllocator {
    /// Next unused page-aligned physical address.
    cursor: PhysicalAddress,
    /// Exclusive top of usable physical memory (from the boot info).
    limit: PhysicalAddress,
}

impl BootstrapAllocator {
    /// Start allocating at the first page boundary at or after
    /// `first_free` — the linker-provided end of the kernel image.
    #[must_use]
    pub const fn new(first_free: PhysicalAddress, limit: PhysicalAddress) -> Self {
        Self {
            cursor: first_free.page_round_up(),
            limit,
        }
    }

    /// Reserve `ceil(bytes / PAGE_SIZE)` pages and return their base.
    ///
    /// Running past the top of physical memory this early is fatal: no
    /// fallback allocator exists yet, so this panics rather than failing.
    pub fn alloc(&mut self, bytes: u32) -> PhysicalAddress {
        let start = self.cursor;
        let end = start
            .checked_add(align_up(bytes, PAGE_SIZE))
            .filter(|end| *end <= self.limit)
            .expect("out of physical memory during early boot");
        self.cursor = end;
        start
    }

    /// The high-water mark: everything in `[kernel image, cursor)` is
    /// spoken for and must be classified as reserved.
    #[must_use]
    pub const fn cursor(&self) -> PhysicalAddress {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carves_page_aligned_blocks() {
        let mut boot = BootstrapAllocator::new(
            PhysicalAddress::new(0x0028_0123),
            PhysicalAddress::new(0x0040_0000),
        );
        assert_eq!(boot.cursor(), 0x0028_1000);

        let table = boot.alloc(3 * 4096 + 1);
        assert_eq!(table, 0x0028_1000);
        assert_eq!(boot.cursor(), 0x0028_5000);

        let dir = boot.alloc(4096);
        assert_eq!(dir, 0x0028_5000);
        assert_eq!(boot.cursor(), 0x0028_6000);
    }

    #[test]
    #[should_panic(expected = "out of physical memory")]
    fn exhaustion_is_fatal() {
        let mut boot = BootstrapAllocator::new(
            PhysicalAddress::new(0x0028_0000),
            PhysicalAddress::new(0x0028_2000),
        );
        let _ = boot.alloc(4 * 4096);
    }
}
