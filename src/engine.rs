//! The commit-checking engine.
//!
//! One [`Difftest`] instance per simulated core. Every cycle, after the
//! harness latches the DUT's retirement facts into the snapshot, it calls
//! [`Difftest::step`], which drives the reference engine to the same
//! architectural point and reconciles register state. The first divergence
//! produces a terminal verdict; nothing is retried, so the trailing trace
//! stays relevant to the root cause.

use ansi_term::Colour::{Red, Yellow};
use tracing::{error, info};

use crate::amo::{handle_atomic, AmoOutcome, AtomicEvent};
use crate::dut::{DutSnapshot, TrapEvent, COMMIT_WIDTH, STORE_WIDTH};
use crate::goldenmem::GoldenMem;
use crate::isa::{
    needs_guided_exec, trap_code, RegFile, INST_WIDTH, INTR_FLAG_BIT, REG_NAMES, THIS_PC,
};
use crate::proxy::{RefProxy, StoreTriple};
use crate::trace::{CommitTrace, InstRecord};

/// Externally supplied tunables. Lane widths and the register count are
/// compile-time constants; everything that varies per simulation setup
/// lives here.
#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// Address of the first instruction the DUT is expected to commit.
    pub reset_vector: u64,
    /// Cycle budget for the very first commit.
    pub first_commit_limit: u64,
    /// Cycle budget between commits once the core has started.
    pub stuck_limit: u64,
    pub group_trace_depth: usize,
    pub inst_trace_depth: usize,
    /// Committed-instruction threshold for the informational IPC report.
    pub ipc_report_interval: u64,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            reset_vector: 0x1c00_0000,
            first_commit_limit: 10_000,
            stuck_limit: 5_000,
            group_trace_depth: 16,
            inst_trace_depth: 32,
            ipc_report_interval: 10_000,
        }
    }
}

/// Per-core lifecycle. Halted states are terminal: driving a halted core
/// further is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CoreState {
    AwaitingFirstCommit,
    Active,
    Halted(HaltKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HaltKind {
    MatchOk,
    Diverged,
    Timeout,
    StoreMismatch,
}

/// One differing register index after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RegDiff {
    pub index: usize,
    pub reference: u64,
    pub dut: u64,
}

/// Terminal faults, all fatal for the affected core.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Fault {
    /// No retirement ever observed within budget. Points at a
    /// configuration or bring-up bug.
    TimeoutNoFirstCommit { ticks: u64, limit: u64 },
    /// Retirement stalled past budget after the core had started.
    TimeoutStuck { ticks: u64, limit: u64 },
    /// The reference store queue rejected a committed DUT store.
    StoreMismatch {
        lane: usize,
        dut: StoreTriple,
        reference: StoreTriple,
    },
    /// Register files differ after reconciliation, at the reference
    /// engine's current program counter.
    RegisterMismatch { pc: u64, diffs: Vec<RegDiff> },
}

impl Fault {
    pub fn kind(&self) -> HaltKind {
        match self {
            Fault::TimeoutNoFirstCommit { .. } | Fault::TimeoutStuck { .. } => HaltKind::Timeout,
            Fault::StoreMismatch { .. } => HaltKind::StoreMismatch,
            Fault::RegisterMismatch { .. } => HaltKind::Diverged,
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::TimeoutNoFirstCommit { ticks, limit } => {
                write!(f, "no first commit within {limit} cycles (tick {ticks})")
            }
            Fault::TimeoutStuck { ticks, limit } => {
                write!(f, "no commit for {limit} cycles (tick {ticks})")
            }
            Fault::StoreMismatch {
                lane,
                dut,
                reference,
            } => write!(
                f,
                "store commit {lane} mismatch: dut {dut}, reference {reference}"
            ),
            Fault::RegisterMismatch { pc, diffs } => write!(
                f,
                "{} register(s) differ at pc {pc:#x}",
                diffs.len()
            ),
        }
    }
}

/// Verdict of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Halt(Fault),
}

impl Verdict {
    pub fn is_continue(&self) -> bool {
        matches!(self, Verdict::Continue)
    }
}

/// One core's commit-checking session. Owns the per-cycle DUT snapshot,
/// the trailing trace and the reference proxy; mutated exclusively by the
/// harness thread driving this core.
pub struct Difftest<P> {
    id: usize,
    cfg: DiffConfig,
    proxy: P,
    /// Latched by the harness before each step, cleared by the engine.
    pub dut: DutSnapshot,
    /// Initial memory image, bulk-copied into the reference at bring-up.
    image: Vec<u8>,
    state: CoreState,
    trace: CommitTrace,
    ref_regs: RegFile,
    /// Reference program counter at bring-up, kept as the comparison
    /// baseline.
    entry_pc: u64,
    ticks: u64,
    last_commit: u64,
    progress: bool,
    num_commit: u32,
    // throughput accounting, observational only
    clk: u64,
    total_commits: u64,
    window_commits: u64,
}

impl<P: RefProxy> Difftest<P> {
    pub fn new(id: usize, proxy: P, image: Vec<u8>, cfg: DiffConfig) -> Self {
        let trace = CommitTrace::new(cfg.group_trace_depth, cfg.inst_trace_depth);
        Self {
            id,
            cfg,
            proxy,
            dut: DutSnapshot::default(),
            image,
            state: CoreState::AwaitingFirstCommit,
            trace,
            ref_regs: [0; crate::isa::NR_REG],
            entry_pc: 0,
            ticks: 0,
            last_commit: 0,
            progress: false,
            num_commit: 0,
            clk: 0,
            total_commits: 0,
            window_commits: 0,
        }
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn total_commits(&self) -> u64 {
        self.total_commits
    }

    pub fn entry_pc(&self) -> u64 {
        self.entry_pc
    }

    /// Reference register image as of the last reconciliation.
    pub fn ref_regs(&self) -> &RegFile {
        &self.ref_regs
    }

    pub fn trace(&self) -> &CommitTrace {
        &self.trace
    }

    pub fn proxy(&self) -> &P {
        &self.proxy
    }

    pub fn proxy_mut(&mut self) -> &mut P {
        &mut self.proxy
    }

    fn has_commit(&self) -> bool {
        !matches!(self.state, CoreState::AwaitingFirstCommit)
    }

    /// Run the per-cycle check. Call exactly once per simulated cycle,
    /// after the harness has latched this cycle's snapshot. Calling again
    /// after a `Halt` verdict is undefined.
    pub fn step(&mut self) -> Verdict {
        self.progress = false;
        self.ticks += 1;
        self.dut.regs[THIS_PC] = self.dut.commit[0].pc;

        if let Some(fault) = self.check_timeout() {
            return self.halt(fault);
        }
        self.do_first_instr_commit();
        if let Err(fault) = self.do_store_check() {
            return self.halt(fault);
        }

        // no register comparison before the first commit
        if !self.has_commit() {
            return Verdict::Continue;
        }

        self.num_commit = 0;
        if self.dut.excp.interrupt {
            // interrupt has the highest priority
            self.dut.regs[THIS_PC] = self.dut.excp.pc;
            self.do_interrupt();
        } else if self.dut.excp.exception {
            self.dut.regs[THIS_PC] = self.dut.excp.pc;
            self.do_exception();
        } else {
            for i in 0..COMMIT_WIDTH {
                if self.dut.commit[i].valid {
                    self.do_instr_commit(i);
                    self.num_commit += 1;
                    self.total_commits += 1;
                    self.window_commits += 1;
                }
            }
        }

        self.clk += 1;
        if self.window_commits >= self.cfg.ipc_report_interval {
            info!(
                "core {}: {} instructions committed, ipc {:.3}",
                self.id,
                self.total_commits,
                self.total_commits as f64 / self.clk as f64
            );
            self.window_commits = 0;
        }

        if !self.progress {
            return Verdict::Continue;
        }

        self.proxy.read_regs(&mut self.ref_regs);

        if self.num_commit > 0 {
            if let Some(lane) = self.dut.commit.iter().find(|l| l.valid) {
                self.trace.record_group(lane.pc, self.num_commit as u8);
            }
        }
        for lane in self.dut.commit.iter_mut() {
            lane.valid = false;
        }

        // this_pc is tracked for display only, never compared
        let diffs: Vec<RegDiff> = (0..THIS_PC)
            .filter(|&i| self.dut.regs[i] != self.ref_regs[i])
            .map(|i| RegDiff {
                index: i,
                reference: self.ref_regs[i],
                dut: self.dut.regs[i],
            })
            .collect();
        if !diffs.is_empty() {
            self.display();
            let pc = self.ref_regs[THIS_PC];
            for d in &diffs {
                println!(
                    "{}",
                    Yellow.bold().paint(format!(
                        "{:>7} different at pc = {:#012x}, right = {:#018x}, wrong = {:#018x}",
                        REG_NAMES[d.index], pc, d.reference, d.dut
                    ))
                );
            }
            return self.halt(Fault::RegisterMismatch { pc, diffs });
        }

        Verdict::Continue
    }

    fn check_timeout(&mut self) -> Option<Fault> {
        // whether anything has committed since the simulation started
        if !self.has_commit() && self.ticks > self.last_commit + self.cfg.first_commit_limit {
            error!(
                "core {}: no instruction committed within {} cycles, check the first instruction",
                self.id, self.cfg.first_commit_limit
            );
            self.display();
            return Some(Fault::TimeoutNoFirstCommit {
                ticks: self.ticks,
                limit: self.cfg.first_commit_limit,
            });
        }

        if self.has_commit() && self.ticks > self.last_commit + self.cfg.stuck_limit {
            error!(
                "core {}: no commit for {} cycles, maybe stuck; running the reference one more step",
                self.id, self.cfg.stuck_limit
            );
            // surface a diagnosable final state before halting
            self.proxy.exec(1);
            self.display();
            return Some(Fault::TimeoutStuck {
                ticks: self.ticks,
                limit: self.cfg.stuck_limit,
            });
        }

        None
    }

    /// One-time bring-up: on the first commit at the reset vector, seed
    /// the reference with the memory image and the DUT's initial
    /// registers. Never repeats for this core.
    fn do_first_instr_commit(&mut self) {
        if self.has_commit() {
            return;
        }
        let lane = self.dut.commit[0];
        if lane.valid && lane.pc == self.cfg.reset_vector {
            info!(
                "core {}: first instruction committed at {:#x}, checking enabled",
                self.id, lane.pc
            );
            self.state = CoreState::Active;
            self.entry_pc = self.dut.regs[THIS_PC];
            self.proxy.load_mem(self.cfg.reset_vector, &self.image);
            self.proxy.write_regs(&self.dut.regs);
        }
    }

    fn do_store_check(&mut self) -> Result<(), Fault> {
        for i in 0..STORE_WIDTH {
            // lanes are packed, the first invalid lane ends the sequence
            if !self.dut.store[i].valid {
                return Ok(());
            }
            let dut = StoreTriple {
                addr: self.dut.store[i].addr,
                data: self.dut.store[i].data,
                mask: self.dut.store[i].mask,
            };
            if let Err(reference) = self.proxy.store_commit(dut) {
                self.display();
                println!("{}", Red.bold().paint(format!("Mismatch for store commit {i}:")));
                println!("  REF commits {reference}");
                println!("  DUT commits {dut}");
                return Err(Fault::StoreMismatch {
                    lane: i,
                    dut,
                    reference,
                });
            }
            self.dut.store[i].valid = false;
        }
        Ok(())
    }

    fn do_interrupt(&mut self) {
        let lane = self.dut.commit[0];
        self.trace.record_inst(InstRecord::Interrupt {
            pc: lane.pc,
            inst: lane.inst,
            cause: self.dut.excp.code,
        });
        self.proxy.raise_intr(self.dut.excp.code | INTR_FLAG_BIT);
        self.progress = true;
    }

    fn do_exception(&mut self) {
        let cause = self.dut.excp.code;
        self.trace.record_inst(InstRecord::Exception {
            pc: self.dut.excp.pc,
            inst: self.dut.commit[0].inst,
            cause,
        });
        if needs_guided_exec(cause) {
            self.proxy.guided_exec(cause);
        } else {
            self.proxy.exec(1);
        }
        self.progress = true;
    }

    fn do_instr_commit(&mut self, i: usize) {
        self.progress = true;
        self.last_commit = self.ticks;

        let lane = self.dut.commit[i];
        self.trace.record_inst(InstRecord::Normal {
            pc: lane.pc,
            inst: lane.inst,
            wen: lane.wen,
            wdest: lane.wdest,
            wdata: lane.wdata,
        });

        // A skipped access never redirects control flow (precondition of
        // the skip protocol): advance the reference PC past it and patch
        // the register side effect in directly instead of single-stepping.
        if lane.skip {
            self.proxy.read_regs(&mut self.ref_regs);
            self.ref_regs[THIS_PC] += INST_WIDTH;
            if lane.wen && lane.wdest != 0 {
                self.ref_regs[lane.wdest as usize] = lane.wdata;
            }
            self.proxy.write_regs(&self.ref_regs);
            return;
        }

        self.proxy.exec(1);
    }

    /// Replay a completed atomic against golden memory. Decode gaps are
    /// non-fatal; a golden-value mismatch dumps diagnostics and is left
    /// to the caller to escalate.
    pub fn check_atomic(
        &mut self,
        ev: &AtomicEvent,
        gmem: &mut GoldenMem,
    ) -> anyhow::Result<AmoOutcome> {
        let outcome = handle_atomic(ev, gmem)?;
        if let AmoOutcome::Mismatch { .. } = outcome {
            self.display();
        }
        Ok(outcome)
    }

    /// Latch a simulation-end trap, as the harness observes it.
    pub fn raise_trap(&mut self, code: u64) {
        self.dut.trap = TrapEvent { valid: true, code };
    }

    /// Resolve a latched trap to a terminal state: a good trap ends the
    /// run as a match, anything else as a DUT-reported failure.
    pub fn check_trap(&mut self) -> Option<u64> {
        if !self.dut.trap.valid {
            return None;
        }
        let code = self.dut.trap.code;
        self.state = CoreState::Halted(if code == trap_code::GOOD_TRAP {
            HaltKind::MatchOk
        } else {
            HaltKind::Diverged
        });
        Some(code)
    }

    fn halt(&mut self, fault: Fault) -> Verdict {
        self.state = CoreState::Halted(fault.kind());
        Verdict::Halt(fault)
    }

    /// Full diagnostic dump: trailing trace plus the reference register
    /// file. Emitted once per terminal fault.
    pub fn display(&mut self) {
        self.trace.display(self.id);
        println!("\n==============  REF Regs  ==============");
        self.proxy.reg_display();
    }
}
