use modular_bitfield::{bitfield, prelude::*};
use x86::vmx::vmcs::control::PRIMARY_PROCBASED_EXEC_CONTROLS;

use crate::vmm::{VCpu, x86_64::intel::vmcs::err::VmxError};

#[bitfield]
#[repr(u32)]
#[derive(Debug, Clone, Copy)]
pub struct PrimaryProcessorBasedVmExecutionControls {
    #[skip]
    reserved1: B2,
    pub interrupt_window: bool,
    pub tsc_offsetting: bool,
    #[skip]
    reserved2: B3,
    pub hlt: bool,
    #[skip]
    reserved3: B1,
    pub invlpg: bool,
    pub mwait: bool,
    pub rdpmc: bool,
    pub rdtsc: bool,
    #[skip]
    reserved4: B2,
    pub cr3load: bool,
    pub cr3store: bool,
    pub activate_teritary_controls: bool,
    #[skip]
    reserved5: B1,
    pub cr8load: bool,
    pub cr8store: bool,
    pub use_tpr_shadow: bool,
    pub nmi_window: bool,
    pub mov_dr: bool,
    pub unconditional_io: bool,
    pub use_io_bitmap: bool,
    #[skip]
    reserved6: B1,
    pub monitor_trap: bool,
    pub use_msr_bitmap: bool,
    pub monitor: bool,
    pub pause: bool,
    pub activate_secondary_controls: bool,
}

impl PrimaryProcessorBasedVmExecutionControls {
    pub fn read(vcpu: &dyn VCpu) -> Result<Self, VmxError> {
        vcpu.vmread(PRIMARY_PROCBASED_EXEC_CONTROLS)
            .map(|value| PrimaryProcessorBasedVmExecutionControls::from(value as u32))
    }

    pub fn write(&self, vcpu: &mut dyn VCpu) -> Result<(), VmxError> {
        vcpu.vmwrite(PRIMARY_PROCBASED_EXEC_CONTROLS, u32::from(*self) as u64)
    }

    /// Applies `f` to the current controls and writes the result back.
    pub fn update(
        vcpu: &mut dyn VCpu,
        f: impl FnOnce(&mut Self),
    ) -> Result<(), VmxError> {
        let mut controls = Self::read(vcpu)?;
        f(&mut controls);
        controls.write(vcpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vmm::testing::TestVCpu;

    #[test]
    fn update_preserves_unrelated_controls() {
        let mut vcpu = TestVCpu::new();
        vcpu.fields
            .insert(PRIMARY_PROCBASED_EXEC_CONTROLS, (1 << 7) | (1 << 31));

        PrimaryProcessorBasedVmExecutionControls::update(&mut vcpu, |c| {
            c.set_cr3load(true);
            c.set_cr8store(true);
        })
        .unwrap();

        assert_eq!(
            vcpu.field(PRIMARY_PROCBASED_EXEC_CONTROLS),
            (1 << 7) | (1 << 15) | (1 << 20) | (1 << 31)
        );

        let controls = PrimaryProcessorBasedVmExecutionControls::read(&vcpu).unwrap();
        assert!(controls.hlt());
        assert!(controls.activate_secondary_controls());
        assert!(!controls.cr3store());
    }
}
