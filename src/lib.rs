//! Differential testing engine for a pipelined processor implementation.
//!
//! Each simulated cycle the harness latches the DUT's retirement, store
//! and trap facts into a [`dut::DutSnapshot`], then calls
//! [`engine::Difftest::step`]. The engine drives the golden reference
//! engine (behind the [`proxy::RefProxy`] capability trait) to the same
//! architectural point, reconciles register state, and reports the first
//! point of divergence together with a bounded trailing trace.
//!
//! Atomic read-modify-write operations are additionally replayed against
//! an independent [`goldenmem::GoldenMem`] image by the [`amo`] emulator.

pub mod amo;
pub mod dut;
pub mod engine;
pub mod goldenmem;
pub mod isa;
pub mod proxy;
pub mod trace;
mod utils;

pub use engine::{CoreState, DiffConfig, Difftest, Fault, HaltKind, RegDiff, Verdict};
pub use goldenmem::GoldenMem;
pub use proxy::{RefProxy, StoreTriple};
