//! # Kernel Configuration and Boot Information
//!
//! Compile-time facts about the kernel's memory layout ([`memory`]) and the
//! information block handed over by the boot loader ([`boot`]).

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod boot;
pub mod memory;
