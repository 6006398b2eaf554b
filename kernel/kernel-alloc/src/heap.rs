//! # Kernel heap allocator
//!
//! General-purpose dynamic allocation in kernel virtual space, layered on
//! the frame allocator (backing frames) and the address space (mappings).
//!
//! The heap is an address-ordered singly linked list of chunks. Every chunk
//! is a 12-byte [`ChunkHeader`] followed immediately by its payload, and the
//! byte after one chunk's payload is always the next chunk's header — no
//! gaps, except past the final chunk, which ends at the last mapped heap
//! byte. Links are **byte offsets from the heap base**, not pointers.
//!
//! Policy, in one line each:
//! - `alloc` is first-fit in address order, growing the mapped region one
//!   page at a time when the tail chunk comes up short.
//! - an exact or near-exact fit is taken whole; a split only happens when
//!   the remainder can hold a header plus at least one byte, so zero-size
//!   chunks never exist.
//! - `free` of an already-free chunk is a deliberate no-op.
//! - every `free` runs a full-list coalescing pass, O(chunk count).

use crate::frame_alloc::FrameTable;
use kernel_info::memory::RECURSIVE_WINDOW_BASE;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, align_up};
use kernel_vmem::{AddressSpace, PhysMapper, VirtMapper};
use log::debug;

/// Bytes of bookkeeping in front of every payload.
pub const CHUNK_HEADER_SIZE: u32 = size_of::<ChunkHeader>() as u32;

/// Payload sizes are rounded up to this, so every header stays naturally
/// aligned for its `u32` fields.
const CHUNK_ALIGN: u32 = align_of::<ChunkHeader>() as u32;

/// `next` value terminating the chunk list.
const NO_CHUNK: u32 = u32::MAX;

/// Control record immediately preceding each payload in heap virtual space.
#[repr(C)]
struct ChunkHeader {
    /// 0 = free, 1 = allocated.
    allocated: u32,
    /// Payload bytes following this header (the header excluded).
    size: u32,
    /// Offset of the next header from the heap base, or [`NO_CHUNK`].
    next: u32,
}

/// The kernel heap: a virtual range `[start, last]` fully backed by mapped
/// frames, tiled by the chunk list starting at offset 0.
pub struct KernelHeap {
    start: VirtualAddress,
    /// Highest mapped heap byte (inclusive, to stay representable at the
    /// top of the address space).
    last: VirtualAddress,
}

impl KernelHeap {
    /// Map one frame at `start` and install a single free chunk spanning
    /// the page minus the header.
    ///
    /// `None` when no frame is available or the mapping cannot be
    /// established; boot code treats that as fatal, later callers need not.
    pub fn init<M: PhysMapper, V: VirtMapper>(
        frames: &mut FrameTable<'_, M>,
        space: &AddressSpace<'_, M>,
        vm: &V,
        start: VirtualAddress,
    ) -> Option<Self> {
        assert!(start.is_page_aligned(), "heap base must be page aligned");
        let heap = Self {
            start,
            last: start + (PAGE_SIZE - 1),
        };
        if !map_one_heap_page(frames, space, start) {
            return None;
        }
        let head = heap.header(vm, 0);
        head.allocated = 0;
        head.size = PAGE_SIZE - CHUNK_HEADER_SIZE;
        head.next = NO_CHUNK;
        Some(heap)
    }

    /// First heap virtual address.
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    /// Last mapped heap virtual address (inclusive).
    #[must_use]
    pub const fn last(&self) -> VirtualAddress {
        self.last
    }

    /// Map one more frame immediately after the current end, extending the
    /// heap's known upper bound by one page.
    ///
    /// Fails — without side effects — on frame exhaustion, or when the next
    /// page would run into the recursive window at the top of the address
    /// space.
    fn grow<M: PhysMapper>(
        &mut self,
        frames: &mut FrameTable<'_, M>,
        space: &AddressSpace<'_, M>,
    ) -> bool {
        let Some(next_va) = self.last.checked_add(1) else {
            return false;
        };
        if next_va.as_u32() >= RECURSIVE_WINDOW_BASE {
            return false;
        }
        if !map_one_heap_page(frames, space, next_va) {
            return false;
        }
        self.last += PAGE_SIZE;
        true
    }

    /// First-fit allocation of `size` bytes; returns the payload address.
    ///
    /// `None` on exhaustion (the heap could not grow far enough) and for
    /// zero-size requests.
    pub fn alloc<M: PhysMapper, V: VirtMapper>(
        &mut self,
        frames: &mut FrameTable<'_, M>,
        space: &AddressSpace<'_, M>,
        vm: &V,
        size: u32,
    ) -> Option<VirtualAddress> {
        if size == 0 {
            return None;
        }
        let size = align_up(size, CHUNK_ALIGN);

        // Find (or make) a free chunk with enough room.
        let mut off = 0_u32;
        let off = loop {
            let (allocated, cur_size, next) = self.read(vm, off);
            if !allocated && cur_size >= size {
                break off;
            }
            if next != NO_CHUNK {
                off = next;
                continue;
            }
            // Out of chunks. Grow the mapped region by a page and let the
            // tail chunk absorb it; an *allocated* tail first gets a fresh
            // free chunk hung behind its payload.
            if !self.grow(frames, space) {
                return None;
            }
            if allocated {
                let new_off = off + CHUNK_HEADER_SIZE + cur_size;
                let new_size = (self.last - (self.start + new_off + CHUNK_HEADER_SIZE)) + 1;
                let new = self.header(vm, new_off);
                new.allocated = 0;
                new.size = new_size;
                new.next = NO_CHUNK;
                self.header(vm, off).next = new_off;
            } else {
                self.header(vm, off).size = cur_size + PAGE_SIZE;
            }
        };

        let (_, cur_size, next) = self.read(vm, off);
        if cur_size - size > CHUNK_HEADER_SIZE {
            // Enough room behind the allocation for a header and at least
            // one byte: split off a trailing free chunk.
            let split_off = off + CHUNK_HEADER_SIZE + size;
            let tail = self.header(vm, split_off);
            tail.allocated = 0;
            tail.size = cur_size - size - CHUNK_HEADER_SIZE;
            tail.next = next;
            let cur = self.header(vm, off);
            cur.size = size;
            cur.next = split_off;
        }
        // Otherwise the fit is exact or near-exact: take the chunk whole,
        // size untouched, so no zero-size neighbor ever appears.
        self.header(vm, off).allocated = 1;
        Some(self.start + off + CHUNK_HEADER_SIZE)
    }

    /// Release the allocation whose payload starts at `va`.
    ///
    /// Freeing an already-free chunk is a no-op by policy. A pointer that
    /// was never returned by [`alloc`](Self::alloc) is undefined behavior
    /// by contract.
    pub fn free<V: VirtMapper>(&self, vm: &V, va: VirtualAddress) {
        let off = (va - self.start) - CHUNK_HEADER_SIZE;
        {
            let chunk = self.header(vm, off);
            if chunk.allocated == 0 {
                return;
            }
            chunk.allocated = 0;
        }

        // Full coalescing pass over the whole list: merge every run of
        // adjacent free chunks, absorbing the second chunk's header.
        let mut off = 0_u32;
        loop {
            let (allocated, size, next) = self.read(vm, off);
            if next == NO_CHUNK {
                break;
            }
            let (next_allocated, next_size, next_next) = self.read(vm, next);
            if !allocated && !next_allocated {
                let chunk = self.header(vm, off);
                chunk.size = size + next_size + CHUNK_HEADER_SIZE;
                chunk.next = next_next;
                // Stay on this chunk; it may swallow the next one too.
            } else {
                off = next;
            }
        }
    }

    /// Log the whole chunk list via `log::debug!`. Diagnostics only.
    pub fn dump<V: VirtMapper>(&self, vm: &V) {
        debug!("kernel heap {}..={}", self.start, self.last);
        let mut off = 0_u32;
        let mut i = 0_usize;
        loop {
            let (allocated, size, next) = self.read(vm, off);
            let payload = self.start + off + CHUNK_HEADER_SIZE;
            debug!(
                "  chunk {i}: {}..={} ({size} bytes, {})",
                payload,
                payload + (size - 1),
                if allocated { "allocated" } else { "free" },
            );
            if next == NO_CHUNK {
                break;
            }
            off = next;
            i += 1;
        }
    }

    /// The header at byte offset `off` from the heap base.
    #[allow(clippy::mut_from_ref)]
    fn header<'a, V: VirtMapper>(&self, vm: &V, off: u32) -> &'a mut ChunkHeader {
        // SAFETY: every offset handed to this function comes from the chunk
        // list itself, whose headers lie within the mapped heap range.
        unsafe { vm.virt_to_mut(self.start + off) }
    }

    /// Snapshot of the header at `off`: `(allocated, size, next)`.
    fn read<V: VirtMapper>(&self, vm: &V, off: u32) -> (bool, u32, u32) {
        let h = self.header(vm, off);
        (h.allocated != 0, h.size, h.next)
    }
}

/// Allocate a frame, count the heap's mapping of it and install it at `va`.
/// Rolls the frame back on mapping failure.
fn map_one_heap_page<M: PhysMapper>(
    frames: &mut FrameTable<'_, M>,
    space: &AddressSpace<'_, M>,
    va: VirtualAddress,
) -> bool {
    let Some(page) = frames.alloc(false) else {
        return false;
    };
    if space.map(frames, va, page.base()).is_err() {
        frames.free(page);
        return false;
    }
    frames.inc_ref(page);
    true
}
