//! # Memory Layout
//!
//! ```text
//! Physical:                          Virtual:
//! 0x0000_0000 ┌──────────────┐       0x0000_0000 ┌──────────────────┐
//!             │ low memory   │                   │ (unused)         │
//! 0x0010_0000 ├──────────────┤       KERNEL_BASE ├──────────────────┤
//!             │ upper memory │                   │ physical alias   │
//! PHYS_LOAD   ├──────────────┤                   │ (KERNEL_BASE+pa) │
//!             │ kernel image │        heap start ├──────────────────┤
//!             │ + boot carve │                   │ kernel heap      │
//!             └──────────────┘       WINDOW_BASE ├──────────────────┤
//!                                                │ recursive window │
//!                                    0xFFFF_FFFF └──────────────────┘
//! ```

/// Where the boot loader places the kernel image in **physical** memory.
pub const PHYS_LOAD: u32 = 0x0020_0000; // 2 MiB

/// First byte of upper memory; the boot info's upper-memory size counts
/// from here.
pub const UPPER_MEMORY_START: u32 = 0x0010_0000; // 1 MiB

/// Base of the kernel's alias of physical memory: physical address `pa` is
/// readable and writable at virtual `KERNEL_BASE + pa` once the kernel
/// address space is active.
pub const KERNEL_BASE: u32 = 0xC000_0000;

/// Most physical memory the frame allocator will track. Memory above this
/// has no kernel virtual alias and is ignored.
pub const PHYS_MEMORY_LIMIT: u32 = 0x3000_0000; // 768 MiB

/// Page-directory slot reserved for the recursive self-mapping.
pub const RECURSIVE_SLOT: usize = 1023;

/// Base of the virtual window created by the recursive slot. Every page
/// table of the active directory appears in `WINDOW_BASE..`, the directory
/// itself in the window's last page.
pub const RECURSIVE_WINDOW_BASE: u32 = 0xFFC0_0000;

const _: () = {
    assert!(PHYS_LOAD > UPPER_MEMORY_START);
    assert!(PHYS_LOAD.is_multiple_of(4096));
    assert!(KERNEL_BASE.is_multiple_of(4096));
    // The physical alias and the heap above it must stay below the window.
    assert!(KERNEL_BASE as u64 + (PHYS_MEMORY_LIMIT as u64) < RECURSIVE_WINDOW_BASE as u64);
    assert!(RECURSIVE_WINDOW_BASE == (RECURSIVE_SLOT as u32) << 22);
};
