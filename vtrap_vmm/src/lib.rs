#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod constant;
pub mod vmm;

pub use vtrap_common::{ept, qual, xcr0};
