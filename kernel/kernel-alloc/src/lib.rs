//! # Kernel Memory Allocation
//!
//! The allocation side of the memory system: physical frames, the boot-time
//! carve, the kernel heap, and the [`MemoryManager`] that owns all of it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Kernel Heap (heap)                   │
//! │    • first-fit chunk list in kernel virtual space   │
//! │    • grows one mapped page at a time                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ needs mappings
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Address Space (kernel-vmem crate)            │
//! │    • two-level page-table walk, map/unmap           │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ needs frames
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Frame Allocator (frame_alloc)             │
//! │    • per-frame metadata table, index-linked         │
//! │      free list, reference counts, reservations      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ table carved by
//! ┌─────────────────▼───────────────────────────────────┐
//! │          Bootstrap Allocator (bootstrap)            │
//! │    • one-way page bump after the kernel image       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! [`MemoryManager::bootstrap`](manager::MemoryManager::bootstrap) builds
//! the stack bottom-up and is the only constructor; afterwards the manager
//! is the single entry point the rest of the kernel calls
//! (`alloc`/`free`/`translate`/`map_page`/`unmap_page`).
//!
//! ## Address seams
//!
//! All physical-memory access goes through the
//! [`PhysMapper`](kernel_vmem::PhysMapper)/[`VirtMapper`](kernel_vmem::VirtMapper)
//! traits. On hardware that is [`phys_mapper::KernelAliasMapper`] (the
//! fixed alias at `KERNEL_BASE + pa`); the unit tests substitute an
//! in-memory environment and run the identical code on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bootstrap;
pub mod frame_alloc;
pub mod heap;
mod manager;
pub mod phys_mapper;

pub use crate::manager::MemoryManager;
