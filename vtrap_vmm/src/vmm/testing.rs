use alloc::collections::BTreeMap;

use x86::vmx::vmcs;

use crate::{
    qual::Register,
    vmm::{VCpu, x86_64::intel::vmcs::err::VmxError},
};

/// In-memory virtual CPU: VMCS fields default to zero.
#[derive(Debug, Default)]
pub struct TestVCpu {
    pub fields: BTreeMap<u32, u64>,
    pub regs: [u64; 16],
    pub cr8: u64,
    pub xcr0: Option<u64>,
    pub fail_field: Option<u32>,
}

impl TestVCpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit(qual: u64, instruction_len: u64) -> Self {
        let mut vcpu = Self::new();
        vcpu.fields.insert(vmcs::ro::EXIT_QUALIFICATION, qual);
        vcpu.fields
            .insert(vmcs::ro::VMEXIT_INSTRUCTION_LEN, instruction_len);
        vcpu.fields.insert(vmcs::guest::RIP, 0x1000);
        vcpu
    }

    pub fn field(&self, field: u32) -> u64 {
        self.fields.get(&field).copied().unwrap_or(0)
    }

    pub fn rip(&self) -> u64 {
        self.field(vmcs::guest::RIP)
    }
}

impl VCpu for TestVCpu {
    fn vmread(&self, field: u32) -> Result<u64, VmxError> {
        if self.fail_field == Some(field) {
            return Err(VmxError::FailValid);
        }
        Ok(self.field(field))
    }

    fn vmwrite(&mut self, field: u32, value: u64) -> Result<(), VmxError> {
        if self.fail_field == Some(field) {
            return Err(VmxError::FailValid);
        }
        self.fields.insert(field, value);
        Ok(())
    }

    fn gpr(&self, reg: Register) -> Result<u64, VmxError> {
        Ok(self.regs[reg as usize])
    }

    fn set_gpr(&mut self, reg: Register, value: u64) -> Result<(), VmxError> {
        self.regs[reg as usize] = value;
        Ok(())
    }

    fn cr8(&self) -> u64 {
        self.cr8
    }

    fn set_cr8(&mut self, value: u64) {
        self.cr8 = value;
    }

    fn set_xcr0(&mut self, value: u64) -> Result<(), VmxError> {
        self.xcr0 = Some(value);
        Ok(())
    }
}
