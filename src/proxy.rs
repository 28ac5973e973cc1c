//! Capability interface to the golden reference engine.
//!
//! The engine never talks to a concrete emulator: everything it needs is
//! behind [`RefProxy`], so the reference binding stays swappable and the
//! commit checker can be tested against a scripted mock.

use crate::isa::RegFile;

/// The address/data/mask triple of one committed store, as seen by either
/// side of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StoreTriple {
    pub addr: u64,
    pub data: u64,
    pub mask: u8,
}

impl std::fmt::Display for StoreTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "addr {:#x}, data {:#x}, mask {:#x}",
            self.addr, self.data, self.mask
        )
    }
}

/// Narrow contract exposed by the reference execution engine.
///
/// Calls for one core are strictly sequential; implementations do not need
/// to be re-entrant. All methods take `&mut self` because even reads may
/// advance internal proxy state (e.g. a store-queue pop).
pub trait RefProxy {
    /// Copy the reference architectural register image into `regs`.
    fn read_regs(&mut self, regs: &mut RegFile);

    /// Overwrite the reference architectural register image from `regs`.
    fn write_regs(&mut self, regs: &RegFile);

    /// Execute `n` instructions on the reference engine.
    fn exec(&mut self, n: u64);

    /// Execute one instruction with an explicit exception cause, for
    /// faults whose context the reference cannot infer on its own.
    fn guided_exec(&mut self, cause: u64);

    /// Inject an interrupt. The cause carries
    /// [`crate::isa::INTR_FLAG_BIT`] to mark it as an interrupt.
    fn raise_intr(&mut self, cause: u64);

    /// Validate one committed DUT store against the reference store
    /// queue. On mismatch, returns the triple the reference expected.
    fn store_commit(&mut self, store: StoreTriple) -> Result<(), StoreTriple>;

    /// Copy `data` into reference memory starting at `addr`.
    fn load_mem(&mut self, addr: u64, data: &[u8]);

    /// Print the reference register state for postmortem diagnosis.
    fn reg_display(&mut self);
}
