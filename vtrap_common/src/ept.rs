use modular_bitfield::{
    bitfield,
    prelude::{B1, B3, B11, B40},
};
use x86_64::PhysAddr;

const MEMORY_TYPE_MASK: u64 = 0x7;
const PHYS_PAGE_MASK: u64 = (1 << 40) - 1;
const PAGE_SHIFT: u64 = 12;

/// Hardware layout of an EPT paging-structure entry (SDM Vol. 3C, 29.3.2).
#[bitfield]
#[repr(u64)]
#[derive(Debug, Clone, Copy)]
struct EntryBase {
    read: bool,
    write: bool,
    exec_super: bool,
    typ: B3,
    ignore_pat: bool,
    map_memory: bool,
    accessed: bool,
    dirty: bool,
    exec_user: bool,
    #[skip]
    ignored1: B1,
    phys: B40,
    #[skip]
    ignored2: B11,
    suppress_ve: bool,
}

/// View over an EPT entry living in caller-owned memory.
///
/// Every setter is a read-modify-write of the backing word that only touches
/// its own bits. Range fields are truncated to their width instead of being
/// rejected.
pub struct EptEntry<'a> {
    raw: &'a mut u64,
}

impl<'a> EptEntry<'a> {
    pub fn new(raw: &'a mut u64) -> Self {
        Self { raw }
    }

    #[inline]
    fn base(&self) -> EntryBase {
        EntryBase::from(*self.raw)
    }

    #[inline]
    fn update(&mut self, f: impl FnOnce(&mut EntryBase)) {
        let mut base = self.base();
        f(&mut base);
        *self.raw = u64::from(base);
    }

    pub fn raw(&self) -> u64 {
        *self.raw
    }

    pub fn read_access(&self) -> bool {
        self.base().read()
    }

    pub fn set_read_access(&mut self, enabled: bool) {
        self.update(|e| e.set_read(enabled));
    }

    pub fn write_access(&self) -> bool {
        self.base().write()
    }

    pub fn set_write_access(&mut self, enabled: bool) {
        self.update(|e| e.set_write(enabled));
    }

    pub fn execute_access(&self) -> bool {
        self.base().exec_super()
    }

    pub fn set_execute_access(&mut self, enabled: bool) {
        self.update(|e| e.set_exec_super(enabled));
    }

    pub fn memory_type(&self) -> u64 {
        self.base().typ() as u64
    }

    /// Only bits 2:0 of `typ` are kept.
    pub fn set_memory_type(&mut self, typ: u64) {
        self.update(|e| e.set_typ((typ & MEMORY_TYPE_MASK) as u8));
    }

    pub fn ignore_pat(&self) -> bool {
        self.base().ignore_pat()
    }

    pub fn set_ignore_pat(&mut self, enabled: bool) {
        self.update(|e| e.set_ignore_pat(enabled));
    }

    /// Bit 7: maps a large page in a PDPTE/PDE.
    pub fn entry_type(&self) -> bool {
        self.base().map_memory()
    }

    pub fn set_entry_type(&mut self, enabled: bool) {
        self.update(|e| e.set_map_memory(enabled));
    }

    pub fn accessed(&self) -> bool {
        self.base().accessed()
    }

    pub fn set_accessed(&mut self, enabled: bool) {
        self.update(|e| e.set_accessed(enabled));
    }

    pub fn dirty(&self) -> bool {
        self.base().dirty()
    }

    pub fn set_dirty(&mut self, enabled: bool) {
        self.update(|e| e.set_dirty(enabled));
    }

    pub fn execute_access_user(&self) -> bool {
        self.base().exec_user()
    }

    pub fn set_execute_access_user(&mut self, enabled: bool) {
        self.update(|e| e.set_exec_user(enabled));
    }

    pub fn phys_addr(&self) -> u64 {
        self.base().phys() << PAGE_SHIFT
    }

    pub fn set_phys_addr(&mut self, addr: u64) {
        self.update(|e| e.set_phys((addr >> PAGE_SHIFT) & PHYS_PAGE_MASK));
    }

    pub fn address(&self) -> PhysAddr {
        PhysAddr::new_truncate(self.phys_addr())
    }

    pub fn suppress_ve(&self) -> bool {
        self.base().suppress_ve()
    }

    pub fn set_suppress_ve(&mut self, enabled: bool) {
        self.update(|e| e.set_suppress_ve(enabled));
    }

    pub fn is_present(&self) -> bool {
        let base = self.base();
        base.read() || base.write() || base.exec_super()
    }

    pub fn trap_on_access(&mut self) {
        self.update(|e| {
            e.set_read(false);
            e.set_write(false);
            e.set_exec_super(false);
        });
    }

    pub fn pass_through_access(&mut self) {
        self.update(|e| {
            e.set_read(true);
            e.set_write(true);
            e.set_exec_super(true);
        });
    }

    pub fn clear(&mut self) {
        *self.raw = 0;
    }
}
