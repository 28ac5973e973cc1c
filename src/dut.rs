//! Per-cycle facts latched from the DUT by the simulation harness.
//!
//! The harness fills one [`DutSnapshot`] before each call into
//! [`crate::engine::Difftest::step`]; the engine consumes it and clears the
//! lanes it has processed. Snapshot buffers are never aliased across steps.

use crate::isa::RegFile;

/// Number of parallel retirement slots per cycle.
pub const COMMIT_WIDTH: usize = 6;

/// Number of parallel committed-store slots per cycle.
pub const STORE_WIDTH: usize = 2;

/// One retirement slot.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CommitLane {
    pub valid: bool,
    pub pc: u64,
    /// Raw instruction word, recorded for postmortem display.
    pub inst: u32,
    /// Register write-enable.
    pub wen: bool,
    /// Destination register index.
    pub wdest: u8,
    /// Value written to the destination register.
    pub wdata: u64,
    /// Set for commits that must not be replayed on the reference
    /// step-by-step (device accesses); their register side effect is
    /// patched in directly instead.
    pub skip: bool,
}

/// One committed-store slot. Lanes are packed: the first invalid lane ends
/// the sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StoreLane {
    pub valid: bool,
    pub addr: u64,
    pub data: u64,
    pub mask: u8,
}

/// One load slot. The checker does not validate loads; the lane exists so
/// the harness has a place to latch them and the engine a place to clear
/// them.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LoadLane {
    pub valid: bool,
    pub paddr: u64,
    pub op: u8,
}

/// Simulation-end trap as reported by the DUT.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrapEvent {
    pub valid: bool,
    pub code: u64,
}

/// Exception/interrupt facts for this cycle. When both flags are set,
/// the interrupt wins.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExcpEvent {
    pub exception: bool,
    pub interrupt: bool,
    /// Exception or interrupt cause code.
    pub code: u64,
    /// PC of the faulting/interrupted instruction.
    pub pc: u64,
}

/// Everything the DUT reports for one simulated cycle, plus its current
/// architectural register image.
#[derive(Debug, Clone)]
pub struct DutSnapshot {
    pub commit: [CommitLane; COMMIT_WIDTH],
    pub store: [StoreLane; STORE_WIDTH],
    pub load: [LoadLane; COMMIT_WIDTH],
    pub trap: TrapEvent,
    pub excp: ExcpEvent,
    /// DUT register image as reported this cycle. The `this_pc` slot is
    /// maintained by the engine, not the harness.
    pub regs: RegFile,
}

impl Default for DutSnapshot {
    fn default() -> Self {
        Self {
            commit: [CommitLane::default(); COMMIT_WIDTH],
            store: [StoreLane::default(); STORE_WIDTH],
            load: [LoadLane::default(); COMMIT_WIDTH],
            trap: TrapEvent::default(),
            excp: ExcpEvent::default(),
            regs: [0; crate::isa::NR_REG],
        }
    }
}

impl DutSnapshot {
    /// Invalidate every lane and event so the harness can latch the next
    /// cycle into a clean snapshot.
    pub fn clear_step(&mut self) {
        self.trap.valid = false;
        for lane in self.commit.iter_mut() {
            lane.valid = false;
        }
        for lane in self.store.iter_mut() {
            lane.valid = false;
        }
        for lane in self.load.iter_mut() {
            lane.valid = false;
        }
        self.excp = ExcpEvent::default();
    }
}
