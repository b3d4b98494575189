#![cfg_attr(not(test), no_std)]

pub mod ept;
pub mod qual;
pub mod xcr0;
