use modular_bitfield::bitfield;
use modular_bitfield::prelude::{B1, B2, B4, B16, B32};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    MovTo = 0,
    MovFrom = 1,
    Clts = 2,
    Lmsw = 3,
}

impl AccessType {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => AccessType::MovTo,
            1 => AccessType::MovFrom,
            2 => AccessType::Clts,
            _ => AccessType::Lmsw,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmswOperandType {
    Reg = 0,
    Mem = 1,
}

impl LmswOperandType {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b1 {
            0 => LmswOperandType::Reg,
            _ => LmswOperandType::Mem,
        }
    }
}

/// General purpose register in the order used by the VMX instruction encodings.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Register {
    pub const fn from_index(index: u8) -> Self {
        match index & 0xF {
            0 => Register::Rax,
            1 => Register::Rcx,
            2 => Register::Rdx,
            3 => Register::Rbx,
            4 => Register::Rsp,
            5 => Register::Rbp,
            6 => Register::Rsi,
            7 => Register::Rdi,
            8 => Register::R8,
            9 => Register::R9,
            10 => Register::R10,
            11 => Register::R11,
            12 => Register::R12,
            13 => Register::R13,
            14 => Register::R14,
            _ => Register::R15,
        }
    }
}

/// Exit qualification for control-register accesses (SDM Vol. 3C, Table 28-3).
#[bitfield]
#[repr(u64)]
#[derive(Debug, Clone, Copy)]
pub struct QualCr {
    pub index: B4,
    pub access_type: B2,
    pub lmsw_operand_type: B1,
    #[skip]
    reserved1: B1,
    pub register: B4,
    #[skip]
    reserved2: B4,
    pub lmsw_source: B16,
    #[skip]
    reserved3: B32,
}

impl QualCr {
    pub fn access(&self) -> AccessType {
        AccessType::from_bits(self.access_type())
    }

    pub fn gpr(&self) -> Register {
        Register::from_index(self.register())
    }

    pub fn lmsw_operand(&self) -> LmswOperandType {
        LmswOperandType::from_bits(self.lmsw_operand_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mov_to_cr3_from_rbx() {
        // mov cr3, rbx
        let qual = QualCr::from(0x0000_0000_0000_0303u64);

        assert_eq!(qual.index(), 3);
        assert_eq!(qual.access(), AccessType::MovTo);
        assert_eq!(qual.gpr(), Register::Rbx);
    }

    #[test]
    fn decodes_mov_from_cr8_into_r12() {
        let raw = 8u64 | (1 << 4) | (12 << 8);
        let qual = QualCr::from(raw);

        assert_eq!(qual.index(), 8);
        assert_eq!(qual.access(), AccessType::MovFrom);
        assert_eq!(qual.gpr(), Register::R12);
    }

    #[test]
    fn decodes_lmsw_source() {
        let raw = (3u64 << 4) | (1 << 6) | (0xBEEF << 16);
        let qual = QualCr::from(raw);

        assert_eq!(qual.access(), AccessType::Lmsw);
        assert_eq!(qual.lmsw_operand(), LmswOperandType::Mem);
        assert_eq!(qual.lmsw_source(), 0xBEEF);
    }

    #[test]
    fn encodings_wrap_to_field_width() {
        assert_eq!(AccessType::from_bits(0b110), AccessType::Clts);
        assert_eq!(Register::from_index(0x14), Register::Rsp);
        assert_eq!(LmswOperandType::from_bits(0b10), LmswOperandType::Reg);
    }
}
