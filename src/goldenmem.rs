//! The verification side's own memory image.
//!
//! Golden memory mirrors architectural memory as observed through committed
//! stores and atomic results. It exists to cross-check atomic
//! read-modify-write operations independently of the reference engine's
//! memory model. It is per-simulation, not per-core; the supported
//! single-core configuration needs no locking.

use anyhow::bail;

use crate::utils::{get_u64, put_u64, put_u64_masked};

pub struct GoldenMem {
    base: u64,
    mem: Vec<u8>,
}

impl GoldenMem {
    /// An all-zero image of `size` bytes starting at physical `base`.
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            mem: vec![0; size],
        }
    }

    /// Seed the image from an initial memory file at offset `addr`.
    pub fn load(&mut self, addr: u64, data: &[u8]) -> anyhow::Result<()> {
        let offset = self.offset_of(addr, data.len())?;
        self.mem[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Read the 8-byte cell containing `addr` (aligned down).
    pub fn read_u64(&self, addr: u64) -> anyhow::Result<u64> {
        let offset = self.offset_of(addr & !7, 8)?;
        Ok(get_u64(&self.mem[offset..offset + 8]))
    }

    /// Overwrite the 8-byte cell containing `addr`.
    pub fn write_u64(&mut self, addr: u64, val: u64) -> anyhow::Result<()> {
        let offset = self.offset_of(addr & !7, 8)?;
        put_u64(&mut self.mem[offset..offset + 8], val);
        Ok(())
    }

    /// Write `val` into the 8-byte cell containing `addr`, gated per byte
    /// by `mask`. Committed stores and atomic results go through here.
    pub fn write_u64_masked(&mut self, addr: u64, val: u64, mask: u8) -> anyhow::Result<()> {
        let offset = self.offset_of(addr & !7, 8)?;
        put_u64_masked(&mut self.mem[offset..offset + 8], val, mask);
        Ok(())
    }

    fn offset_of(&self, addr: u64, len: usize) -> anyhow::Result<usize> {
        if addr < self.base {
            bail!("address {addr:#x} below golden memory base {:#x}", self.base);
        }
        let offset = (addr - self.base) as usize;
        if offset + len > self.mem.len() {
            bail!(
                "address range {addr:#x}+{len:#x} beyond golden memory end {:#x}",
                self.base + self.mem.len() as u64
            );
        }
        Ok(offset)
    }
}
