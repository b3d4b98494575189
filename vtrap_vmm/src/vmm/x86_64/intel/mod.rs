pub mod crs;
pub mod register;
pub mod vcpu;
pub mod vmcs;
pub mod xsetbv;

use core::arch::asm;

use ::x86_64::registers::rflags::{self, RFlags};

use self::vmcs::err::VmxError;

pub fn vmx_capture_status() -> Result<(), VmxError> {
    let flags = rflags::read();
    if flags.contains(RFlags::ZERO_FLAG) {
        Err(VmxError::FailValid)
    } else if flags.contains(RFlags::CARRY_FLAG) {
        Err(VmxError::FailInvalid)
    } else {
        Ok(())
    }
}

pub fn vmread(field: u32) -> Result<u64, VmxError> {
    let field: u64 = field.into();
    let value: u64;
    unsafe {
        asm!(
            "vmread {0}, {1}",
            in(reg) field,
            out(reg) value,
            options(att_syntax)
        )
    };
    vmx_capture_status()?;
    Ok(value)
}

pub fn vmwrite(field: u32, value: u64) -> Result<(), VmxError> {
    let field: u64 = field.into();
    unsafe {
        asm!(
            "vmwrite {1}, {0}",
            in(reg) field,
            in(reg) value,
            options(att_syntax)
        )
    };
    vmx_capture_status()
}
