use log::{debug, trace};

use crate::{
    constant::XCR0_INDEX,
    qual::Register,
    vmm::{VCpu, chain::HandlerChain, x86_64::intel::vmcs::err::VmxError},
    xcr0::Xcr0,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XsetbvInfo {
    /// EDX:EAX of the trapping instruction.
    pub value: u64,
    pub suppress_write: bool,
    pub suppress_advance: bool,
}

/// XSETBV exits (basic exit reason 55).
///
/// The chain starts empty. Until a handler is installed every exit is
/// reported as unhandled, which the exit router turns into #GP.
#[derive(Default)]
pub struct XsetbvHandler {
    chain: HandlerChain<XsetbvInfo>,
}

impl XsetbvHandler {
    pub fn new() -> Self {
        Self {
            chain: HandlerChain::new(),
        }
    }

    /// Starts with [`xcr0_validator`] for the XCR0 bits this processor
    /// supports, so only writes that would succeed on hardware pass through.
    #[cfg(target_arch = "x86_64")]
    pub fn with_host_validation() -> Self {
        let mut handler = Self::new();
        handler.add_handler(xcr0_validator(host_supported_xcr0()));
        handler
    }

    pub fn add_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut dyn VCpu, &mut XsetbvInfo) -> bool + 'static,
    {
        self.chain.add(handler);
    }

    pub fn handle(&mut self, vcpu: &mut dyn VCpu) -> Result<bool, VmxError> {
        let eax = vcpu.gpr(Register::Rax)? as u32;
        let edx = vcpu.gpr(Register::Rdx)? as u32;

        let mut info = XsetbvInfo {
            value: ((edx as u64) << 32) | eax as u64,
            ..Default::default()
        };

        trace!("XSETBV: value={:#x}", info.value);

        if !self.chain.dispatch(vcpu, &mut info) {
            if self.chain.is_empty() {
                debug!("unhandled XSETBV: value={:#x}, no handlers", info.value);
            } else {
                debug!(
                    "unhandled XSETBV: value={:#x}, declined by {} handlers",
                    info.value,
                    self.chain.len()
                );
            }
            return Ok(false);
        }

        if !info.suppress_write {
            vcpu.set_xcr0(info.value)?;
        }

        if !info.suppress_advance {
            vcpu.advance_rip()?;
        }

        Ok(true)
    }
}

/// Builds a handler that accepts an XSETBV only when it would not fault on
/// hardware: ECX selects XCR0 and the new value passes [`Xcr0::validate`]
/// against `supported`.
pub fn xcr0_validator(
    supported: u64,
) -> impl FnMut(&mut dyn VCpu, &mut XsetbvInfo) -> bool + 'static {
    move |vcpu: &mut dyn VCpu, info: &mut XsetbvInfo| {
        let index = match vcpu.gpr(Register::Rcx) {
            Ok(rcx) => rcx & 0xFFFF_FFFF,
            Err(err) => {
                debug!("XSETBV: failed to read RCX: {}", err);
                return false;
            }
        };

        if index != XCR0_INDEX {
            debug!("XSETBV to unsupported XCR{}", index);
            return false;
        }

        match Xcr0::validate(info.value, supported) {
            Ok(_) => true,
            Err(err) => {
                debug!("XSETBV rejected {:#x}: {}", info.value, err);
                false
            }
        }
    }
}

/// XCR0 bits the host processor supports (CPUID.(EAX=0DH,ECX=0):EDX:EAX).
#[cfg(target_arch = "x86_64")]
pub fn host_supported_xcr0() -> u64 {
    let leaf = raw_cpuid::cpuid!(0xD, 0);
    ((leaf.edx as u64) << 32) | leaf.eax as u64
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::*;
    use crate::vmm::testing::TestVCpu;

    const ALL: u64 = (1 << 20) - 1;

    fn exit(rcx: u64, value: u64) -> TestVCpu {
        let mut vcpu = TestVCpu::with_exit(0, 3);
        vcpu.regs[Register::Rcx as usize] = rcx;
        vcpu.regs[Register::Rax as usize] = 0xFFFF_FFFF_0000_0000 | (value & 0xFFFF_FFFF);
        vcpu.regs[Register::Rdx as usize] = value >> 32;
        vcpu
    }

    #[test]
    fn empty_chain_is_unhandled() {
        let mut xsetbv = XsetbvHandler::new();
        let mut vcpu = exit(0, 0b111);

        assert_eq!(xsetbv.handle(&mut vcpu), Ok(false));
        assert_eq!(vcpu.xcr0, None);
        assert_eq!(vcpu.rip(), 0x1000);
    }

    #[test]
    fn value_is_assembled_from_edx_and_eax() {
        let seen = Rc::new(Cell::new(0));
        let mut xsetbv = XsetbvHandler::new();

        let sink = seen.clone();
        xsetbv.add_handler(move |_, info| {
            sink.set(info.value);
            true
        });

        let mut vcpu = exit(0, 0x0000_0002_0000_0007);
        vcpu.regs[Register::Rdx as usize] |= 0xAAAA_AAAA_0000_0000;

        assert_eq!(xsetbv.handle(&mut vcpu), Ok(true));
        assert_eq!(seen.get(), 0x0000_0002_0000_0007);
        assert_eq!(vcpu.xcr0, Some(0x0000_0002_0000_0007));
        assert_eq!(vcpu.rip(), 0x1003);
    }

    #[test]
    fn handlers_can_rewrite_and_suppress() {
        let mut xsetbv = XsetbvHandler::new();
        xsetbv.add_handler(|_, info| {
            info.value &= !0b100;
            true
        });

        let mut vcpu = exit(0, 0b111);
        assert_eq!(xsetbv.handle(&mut vcpu), Ok(true));
        assert_eq!(vcpu.xcr0, Some(0b011));

        xsetbv.add_handler(|_, info| {
            info.suppress_write = true;
            info.suppress_advance = true;
            true
        });

        let mut vcpu = exit(0, 0b111);
        assert_eq!(xsetbv.handle(&mut vcpu), Ok(true));
        assert_eq!(vcpu.xcr0, None);
        assert_eq!(vcpu.rip(), 0x1000);
    }

    #[test]
    fn validator_accepts_architectural_values() {
        let mut xsetbv = XsetbvHandler::new();
        xsetbv.add_handler(xcr0_validator(ALL));

        let mut vcpu = exit(0, 0b1110_0111);
        assert_eq!(xsetbv.handle(&mut vcpu), Ok(true));
        assert_eq!(vcpu.xcr0, Some(0b1110_0111));
    }

    #[test]
    fn validator_rejects_faulting_writes() {
        let mut xsetbv = XsetbvHandler::new();
        xsetbv.add_handler(xcr0_validator(0b111));

        for (rcx, value) in [(1, 0b1), (0, 0b110), (0, 0b101), (0, 0b1111)] {
            let mut vcpu = exit(rcx, value);
            assert_eq!(xsetbv.handle(&mut vcpu), Ok(false), "{rcx} {value:#b}");
            assert_eq!(vcpu.xcr0, None);
            assert_eq!(vcpu.rip(), 0x1000);
        }
    }

    #[test]
    fn host_support_includes_x87_when_xsave_is_present() {
        let has_xsave = raw_cpuid::CpuId::new()
            .get_feature_info()
            .is_some_and(|info| info.has_xsave());

        if has_xsave {
            assert_ne!(host_supported_xcr0() & 1, 0);
        }
    }

    #[test]
    fn host_validation_passes_x87_and_rejects_unknown_bits() {
        let mut xsetbv = XsetbvHandler::with_host_validation();
        let supported = host_supported_xcr0();

        if supported & 1 != 0 {
            let mut vcpu = exit(0, 0b1);
            assert_eq!(xsetbv.handle(&mut vcpu), Ok(true));
            assert_eq!(vcpu.xcr0, Some(0b1));
        }

        let mut vcpu = exit(0, 0b1 | 1 << 63);
        assert_eq!(xsetbv.handle(&mut vcpu), Ok(false));
        assert_eq!(vcpu.xcr0, None);
    }

    #[test]
    fn rip_advance_failures_propagate() {
        let mut xsetbv = XsetbvHandler::new();
        xsetbv.add_handler(|_, _| true);

        let mut vcpu = exit(0, 0b1);
        vcpu.fail_field = Some(x86::vmx::vmcs::guest::RIP);

        assert_eq!(xsetbv.handle(&mut vcpu), Err(VmxError::FailValid));
        assert_eq!(vcpu.xcr0, Some(0b1));
    }
}
