use alloc::vec::Vec;
use core::fmt;

use ::x86_64::registers::control::Cr0Flags;
use log::{debug, info, trace};
use x86::vmx::vmcs::{control, guest};

use crate::{
    constant::{CR3_VALUE_MASK, DEFAULT_CR_LOGGING},
    qual::{AccessType, QualCr, Register},
    vmm::{
        VCpu,
        chain::HandlerChain,
        x86_64::intel::vmcs::{controls::PrimaryProcessorBasedVmExecutionControls, err::VmxError},
    },
};

/// Info record handed to every control-register handler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrInfo {
    /// In: the value the guest writes, or the value a read returns.
    /// Out: the value committed to the guest.
    pub value: u64,
    /// CR0/CR4 read shadow. Zero for CR3 and CR8.
    pub shadow: u64,
    /// Skip the write-back of `value` (and `shadow`).
    pub suppress_write: bool,
    /// The handler already moved RIP past the instruction.
    pub suppress_advance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRegister {
    Cr0 = 0,
    Cr3 = 1,
    Cr4 = 2,
    Cr8 = 3,
}

impl ControlRegister {
    pub const ALL: [ControlRegister; 4] = [
        ControlRegister::Cr0,
        ControlRegister::Cr3,
        ControlRegister::Cr4,
        ControlRegister::Cr8,
    ];

    pub const fn number(self) -> u8 {
        match self {
            ControlRegister::Cr0 => 0,
            ControlRegister::Cr3 => 3,
            ControlRegister::Cr4 => 4,
            ControlRegister::Cr8 => 8,
        }
    }
}

/// Selects one of the handler chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrExit {
    WrCr0 = 0,
    RdCr3 = 1,
    WrCr3 = 2,
    WrCr4 = 3,
    RdCr8 = 4,
    WrCr8 = 5,
}

impl CrExit {
    pub const ALL: [CrExit; 6] = [
        CrExit::WrCr0,
        CrExit::RdCr3,
        CrExit::WrCr3,
        CrExit::WrCr4,
        CrExit::RdCr8,
        CrExit::WrCr8,
    ];

    pub const fn register(self) -> ControlRegister {
        match self {
            CrExit::WrCr0 => ControlRegister::Cr0,
            CrExit::RdCr3 | CrExit::WrCr3 => ControlRegister::Cr3,
            CrExit::WrCr4 => ControlRegister::Cr4,
            CrExit::RdCr8 | CrExit::WrCr8 => ControlRegister::Cr8,
        }
    }

    pub const fn is_read(self) -> bool {
        matches!(self, CrExit::RdCr3 | CrExit::RdCr8)
    }

    fn decode(qual: &QualCr) -> Self {
        let access = qual.access();
        match (qual.index(), access) {
            (0, AccessType::MovTo | AccessType::Clts | AccessType::Lmsw) => CrExit::WrCr0,
            (3, AccessType::MovFrom) => CrExit::RdCr3,
            (3, AccessType::MovTo) => CrExit::WrCr3,
            (4, AccessType::MovTo) => CrExit::WrCr4,
            (8, AccessType::MovFrom) => CrExit::RdCr8,
            (8, AccessType::MovTo) => CrExit::WrCr8,
            (index @ (0 | 3 | 4 | 8), _) => {
                panic!("Unsupported CR access type {:?} for CR{}", access, index)
            }
            (index, _) => panic!("Unsupported CR index: {}", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrRecord {
    pub value: u64,
    pub shadow: u64,
    pub post_handling: bool,
    pub is_read: bool,
}

impl fmt::Display for CrRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} value={:#018x} shadow={:#018x}",
            if self.post_handling { "post" } else { "pre " },
            if self.is_read { "read " } else { "write" },
            self.value,
            self.shadow
        )
    }
}

/// CR0 bits LMSW can load. PE can be set but never cleared.
const LMSW_MASK: u64 = Cr0Flags::PROTECTED_MODE_ENABLE.bits()
    | Cr0Flags::MONITOR_COPROCESSOR.bits()
    | Cr0Flags::EMULATE_COPROCESSOR.bits()
    | Cr0Flags::TASK_SWITCHED.bits();

fn lmsw(cr0: u64, source: u64) -> u64 {
    let pe = cr0 & Cr0Flags::PROTECTED_MODE_ENABLE.bits();
    (cr0 & !LMSW_MASK) | (source & LMSW_MASK) | pe
}

fn default_handler(_vcpu: &mut dyn VCpu, _info: &mut CrInfo) -> bool {
    true
}

/// Control-register access exits (basic exit reason 28).
pub struct CrAccessHandler {
    chains: [HandlerChain<CrInfo>; 6],
    logs: [Vec<CrRecord>; 4],
    logging: bool,
}

impl CrAccessHandler {
    pub fn new() -> Self {
        let mut handler = Self {
            chains: core::array::from_fn(|_| HandlerChain::new()),
            logs: core::array::from_fn(|_| Vec::new()),
            logging: DEFAULT_CR_LOGGING,
        };

        for exit in CrExit::ALL {
            handler.add_handler(exit, default_handler);
        }

        handler
    }

    /// Installs `handler` in front of every handler already on `exit`'s chain.
    pub fn add_handler<F>(&mut self, exit: CrExit, handler: F)
    where
        F: FnMut(&mut dyn VCpu, &mut CrInfo) -> bool + 'static,
    {
        self.chains[exit as usize].add(handler);
    }

    pub fn enable_logging(&mut self) {
        self.logging = true;
    }

    pub fn disable_logging(&mut self) {
        self.logging = false;
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.logging
    }

    pub fn log(&self, reg: ControlRegister) -> &[CrRecord] {
        &self.logs[reg as usize]
    }

    pub fn dump_log(&self) {
        for reg in ControlRegister::ALL {
            let log = self.log(reg);
            if log.is_empty() {
                continue;
            }

            info!("cr{} log ({} records)", reg.number(), log.len());
            for record in log {
                info!("  {}", record);
            }
        }
    }

    pub fn enable_wrcr0_trapping(
        vcpu: &mut dyn VCpu,
        mask: u64,
        shadow: u64,
    ) -> Result<(), VmxError> {
        vcpu.vmwrite(control::CR0_GUEST_HOST_MASK, mask)?;
        vcpu.vmwrite(control::CR0_READ_SHADOW, shadow)
    }

    pub fn enable_rdcr3_trapping(vcpu: &mut dyn VCpu) -> Result<(), VmxError> {
        PrimaryProcessorBasedVmExecutionControls::update(vcpu, |c| c.set_cr3store(true))
    }

    pub fn enable_wrcr3_trapping(vcpu: &mut dyn VCpu) -> Result<(), VmxError> {
        PrimaryProcessorBasedVmExecutionControls::update(vcpu, |c| c.set_cr3load(true))
    }

    pub fn enable_wrcr4_trapping(
        vcpu: &mut dyn VCpu,
        mask: u64,
        shadow: u64,
    ) -> Result<(), VmxError> {
        vcpu.vmwrite(control::CR4_GUEST_HOST_MASK, mask)?;
        vcpu.vmwrite(control::CR4_READ_SHADOW, shadow)
    }

    pub fn enable_rdcr8_trapping(vcpu: &mut dyn VCpu) -> Result<(), VmxError> {
        PrimaryProcessorBasedVmExecutionControls::update(vcpu, |c| c.set_cr8store(true))
    }

    pub fn enable_wrcr8_trapping(vcpu: &mut dyn VCpu) -> Result<(), VmxError> {
        PrimaryProcessorBasedVmExecutionControls::update(vcpu, |c| c.set_cr8load(true))
    }

    /// Handles one control-register access exit.
    ///
    /// Returns `Ok(false)` when no handler claimed the exit; nothing has been
    /// written back in that case. Panics when the exit qualification names a
    /// register or direction this handler is never configured to trap.
    pub fn handle(&mut self, vcpu: &mut dyn VCpu) -> Result<bool, VmxError> {
        let qual = QualCr::from(vcpu.exit_qualification()?);
        let exit = CrExit::decode(&qual);
        let gpr = qual.gpr();

        trace!("CR access: {:?} ({:?}) via {:?}", exit, qual.access(), gpr);

        let mut info = Self::read_info(vcpu, exit, &qual)?;

        self.record(exit, &info, false);

        if !self.chains[exit as usize].dispatch(vcpu, &mut info) {
            debug!("unhandled CR access: {:?} value={:#x}", exit, info.value);
            return Ok(false);
        }

        if exit == CrExit::WrCr3 {
            info.value &= CR3_VALUE_MASK;
        }

        self.record(exit, &info, true);

        if !info.suppress_write {
            Self::write_back(vcpu, exit, gpr, &info)?;
        }

        if !info.suppress_advance {
            vcpu.advance_rip()?;
        }

        Ok(true)
    }

    /// Builds the info record. CLTS and LMSW are turned into the CR0 value
    /// they would produce, applied to both the guest CR0 and its read shadow.
    fn read_info(vcpu: &dyn VCpu, exit: CrExit, qual: &QualCr) -> Result<CrInfo, VmxError> {
        let gpr = qual.gpr();
        let (value, shadow) = match exit {
            CrExit::WrCr0 => {
                let shadow = vcpu.vmread(control::CR0_READ_SHADOW)?;
                match qual.access() {
                    AccessType::Clts => {
                        let ts = Cr0Flags::TASK_SWITCHED.bits();
                        (vcpu.vmread(guest::CR0)? & !ts, shadow & !ts)
                    }
                    AccessType::Lmsw => {
                        trace!("LMSW {:?} operand", qual.lmsw_operand());
                        let source = qual.lmsw_source() as u64;
                        (lmsw(vcpu.vmread(guest::CR0)?, source), lmsw(shadow, source))
                    }
                    _ => (vcpu.gpr(gpr)?, shadow),
                }
            }
            CrExit::RdCr3 => (vcpu.vmread(guest::CR3)?, 0),
            CrExit::WrCr3 => (vcpu.gpr(gpr)?, 0),
            CrExit::WrCr4 => (vcpu.gpr(gpr)?, vcpu.vmread(control::CR4_READ_SHADOW)?),
            CrExit::RdCr8 => (vcpu.cr8(), 0),
            CrExit::WrCr8 => (vcpu.gpr(gpr)?, 0),
        };

        Ok(CrInfo {
            value,
            shadow,
            suppress_write: false,
            suppress_advance: false,
        })
    }

    fn write_back(
        vcpu: &mut dyn VCpu,
        exit: CrExit,
        gpr: Register,
        info: &CrInfo,
    ) -> Result<(), VmxError> {
        match exit {
            CrExit::WrCr0 => {
                vcpu.vmwrite(guest::CR0, info.value)?;
                vcpu.vmwrite(control::CR0_READ_SHADOW, info.shadow)
            }
            CrExit::WrCr3 => vcpu.vmwrite(guest::CR3, info.value),
            CrExit::WrCr4 => {
                vcpu.vmwrite(guest::CR4, info.value)?;
                vcpu.vmwrite(control::CR4_READ_SHADOW, info.shadow)
            }
            CrExit::WrCr8 => {
                vcpu.set_cr8(info.value);
                Ok(())
            }
            CrExit::RdCr3 | CrExit::RdCr8 => vcpu.set_gpr(gpr, info.value),
        }
    }

    fn record(&mut self, exit: CrExit, info: &CrInfo, post_handling: bool) {
        if !self.logging {
            return;
        }

        self.logs[exit.register() as usize].push(CrRecord {
            value: info.value,
            shadow: info.shadow,
            post_handling,
            is_read: exit.is_read(),
        });
    }
}

impl Default for CrAccessHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CrAccessHandler {
    fn drop(&mut self) {
        if self.logging {
            self.dump_log();
        }
    }
}
