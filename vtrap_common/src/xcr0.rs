use modular_bitfield::{bitfield, prelude::B44};
use thiserror::Error;

const AVX512_MASK: u64 = 0b1110_0000;
const AMX_MASK: u64 = 0b11 << 17;

#[bitfield]
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xcr0 {
    pub x87: bool,
    pub sse: bool,
    pub avx: bool,
    pub bndreg: bool,
    pub bndcsr: bool,
    pub opmask: bool,
    pub zmm_hi256: bool,
    pub hi16_zmm: bool,
    pub pt: bool,
    pub pkru: bool,
    pub pasid: bool,
    pub cet_u: bool,
    pub cet_s: bool,
    pub hdc: bool,
    pub intr: bool,
    pub lbr: bool,
    pub hwp: bool,
    pub xtilecfg: bool,
    pub xtiledata: bool,
    pub apx: bool,
    #[skip]
    reserved: B44,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Xcr0Error {
    #[error("x87 state must stay enabled")]
    X87Disabled,
    #[error("AVX state requires SSE state")]
    AvxWithoutSse,
    #[error("BNDREGS and BNDCSR must be set together")]
    MpxMismatch,
    #[error("AVX-512 state requires AVX state")]
    Avx512WithoutAvx,
    #[error("opmask, ZMM_Hi256 and Hi16_ZMM must be set together")]
    Avx512Partial,
    #[error("XTILECFG and XTILEDATA must be set together")]
    AmxMismatch,
    #[error("unsupported XCR0 bits {0:#x}")]
    Unsupported(u64),
}

impl Xcr0 {
    /// Checks `value` against the conditions under which XSETBV raises #GP.
    pub fn validate(value: u64, supported: u64) -> Result<Self, Xcr0Error> {
        let unsupported = value & !supported;
        if unsupported != 0 {
            return Err(Xcr0Error::Unsupported(unsupported));
        }

        let xcr0 = Xcr0::from(value);

        if !xcr0.x87() {
            return Err(Xcr0Error::X87Disabled);
        }

        if xcr0.avx() && !xcr0.sse() {
            return Err(Xcr0Error::AvxWithoutSse);
        }

        if xcr0.bndreg() != xcr0.bndcsr() {
            return Err(Xcr0Error::MpxMismatch);
        }

        if value & AVX512_MASK != 0 {
            if !xcr0.avx() {
                return Err(Xcr0Error::Avx512WithoutAvx);
            }

            if value & AVX512_MASK != AVX512_MASK {
                return Err(Xcr0Error::Avx512Partial);
            }
        }

        if value & AMX_MASK != 0 && value & AMX_MASK != AMX_MASK {
            return Err(Xcr0Error::AmxMismatch);
        }

        Ok(xcr0)
    }
}
