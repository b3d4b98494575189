use x86::vmx::vmcs;

use crate::{qual::Register, vmm::x86_64::intel::vmcs::err::VmxError};

pub mod chain;
pub mod x86_64;

#[cfg(test)]
pub(crate) mod testing;

/// The slice of a virtual CPU that exit handlers are allowed to touch.
pub trait VCpu {
    fn vmread(&self, field: u32) -> Result<u64, VmxError>;
    fn vmwrite(&mut self, field: u32, value: u64) -> Result<(), VmxError>;

    fn gpr(&self, reg: Register) -> Result<u64, VmxError>;
    fn set_gpr(&mut self, reg: Register, value: u64) -> Result<(), VmxError>;

    fn cr8(&self) -> u64;
    fn set_cr8(&mut self, value: u64);

    fn set_xcr0(&mut self, value: u64) -> Result<(), VmxError>;

    fn exit_qualification(&self) -> Result<u64, VmxError> {
        self.vmread(vmcs::ro::EXIT_QUALIFICATION)
    }

    fn advance_rip(&mut self) -> Result<(), VmxError> {
        let len = self.vmread(vmcs::ro::VMEXIT_INSTRUCTION_LEN)?;
        let rip = self.vmread(vmcs::guest::RIP)?;
        self.vmwrite(vmcs::guest::RIP, rip.wrapping_add(len))
    }
}
