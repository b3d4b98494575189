use x86::vmx::vmcs;

use crate::{
    qual::Register,
    vmm::{
        VCpu,
        x86_64::intel::{register::GuestRegisters, vmcs::err::VmxError, vmread, vmwrite},
    },
    xcr0::Xcr0,
};

/// Virtual CPU backed by the current VMCS of the logical processor.
#[derive(Debug)]
pub struct IntelVCpu {
    pub guest_registers: GuestRegisters,
    pub guest_xcr0: Xcr0,
    pub guest_cr8: u64,
}

impl IntelVCpu {
    pub fn new() -> Self {
        Self {
            guest_registers: GuestRegisters::default(),
            guest_xcr0: Xcr0::new().with_x87(true),
            guest_cr8: 0,
        }
    }
}

impl Default for IntelVCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl VCpu for IntelVCpu {
    fn vmread(&self, field: u32) -> Result<u64, VmxError> {
        vmread(field)
    }

    fn vmwrite(&mut self, field: u32, value: u64) -> Result<(), VmxError> {
        vmwrite(field, value)
    }

    fn gpr(&self, reg: Register) -> Result<u64, VmxError> {
        match self.guest_registers.get(reg) {
            Some(value) => Ok(value),
            None => vmread(vmcs::guest::RSP),
        }
    }

    fn set_gpr(&mut self, reg: Register, value: u64) -> Result<(), VmxError> {
        match self.guest_registers.get_mut(reg) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => vmwrite(vmcs::guest::RSP, value),
        }
    }

    fn cr8(&self) -> u64 {
        self.guest_cr8
    }

    fn set_cr8(&mut self, value: u64) {
        self.guest_cr8 = value;
    }

    fn set_xcr0(&mut self, value: u64) -> Result<(), VmxError> {
        self.guest_xcr0 = Xcr0::from(value);
        Ok(())
    }
}
