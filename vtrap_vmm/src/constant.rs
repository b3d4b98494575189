/// MOV to CR3 never loads bit 63; it only selects the PCID no-flush behavior.
pub const CR3_VALUE_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

pub const XCR0_INDEX: u64 = 0;

pub const DEFAULT_CR_LOGGING: bool = false;
