//! Bounded trailing trace of retirement activity, kept for postmortem
//! diagnosis. Two independent fixed-capacity rings: one of retirement
//! groups (one entry per cycle that committed), one of individual retired
//! instructions. Append-only; old entries are overwritten on wrap. No
//! correctness logic lives here.

use ansi_term::Colour::{Red, Yellow};

/// Fixed-capacity ring with an explicit write index. Reads go through an
/// owned snapshot so display never observes a half-wrapped buffer.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Vec<Option<T>>,
    head: usize,
}

impl<T: Clone> Ring<T> {
    pub fn with_capacity(cap: usize) -> Self {
        assert!(cap > 0, "trace depth must be non-zero");
        Self {
            slots: vec![None; cap],
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, item: T) {
        let cap = self.slots.len();
        self.slots[self.head % cap] = Some(item);
        self.head = (self.head + 1) % cap;
    }

    /// Slot index of the most recently written entry.
    pub fn last_index(&self) -> Option<usize> {
        let cap = self.slots.len();
        let last = (self.head + cap - 1) % cap;
        self.slots[last].as_ref().map(|_| last)
    }

    /// Immutable copy of the current contents, slot-indexed.
    pub fn snapshot(&self) -> Vec<(usize, T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.clone().map(|v| (i, v)))
            .collect()
    }
}

/// One cycle's worth of retirement: PC of the first committed lane and how
/// many lanes committed with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GroupRecord {
    pub pc: u64,
    pub count: u8,
}

/// One retired instruction. Immutable once appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum InstRecord {
    Normal {
        pc: u64,
        inst: u32,
        wen: bool,
        wdest: u8,
        wdata: u64,
    },
    Exception {
        pc: u64,
        inst: u32,
        cause: u64,
    },
    Interrupt {
        pc: u64,
        inst: u32,
        cause: u64,
    },
}

impl std::fmt::Display for InstRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            InstRecord::Normal {
                pc,
                inst,
                wen,
                wdest,
                wdata,
            } => write!(
                f,
                "commit inst: pc {pc:#012x} inst {inst:08x} wen {} dst {wdest:02x} data {wdata:#018x}",
                wen as u8
            ),
            InstRecord::Exception { pc, inst, cause } => write!(
                f,
                "exception  : pc {pc:#012x} inst {inst:08x} cause {cause:#018x}"
            ),
            InstRecord::Interrupt { pc, inst, cause } => write!(
                f,
                "interrupt  : pc {pc:#012x} inst {inst:08x} cause {cause:#018x}"
            ),
        }
    }
}

/// The commit trace recorder: retirement groups plus individual
/// retirements.
pub struct CommitTrace {
    groups: Ring<GroupRecord>,
    insts: Ring<InstRecord>,
}

impl CommitTrace {
    pub fn new(group_depth: usize, inst_depth: usize) -> Self {
        Self {
            groups: Ring::with_capacity(group_depth),
            insts: Ring::with_capacity(inst_depth),
        }
    }

    pub fn record_group(&mut self, pc: u64, count: u8) {
        self.groups.push(GroupRecord { pc, count });
    }

    pub fn record_inst(&mut self, record: InstRecord) {
        self.insts.push(record);
    }

    pub fn groups(&self) -> &Ring<GroupRecord> {
        &self.groups
    }

    pub fn insts(&self) -> &Ring<InstRecord> {
        &self.insts
    }

    /// Render both rings, marking the most recently written slot. Used on
    /// divergence and timeout only.
    pub fn display(&self, core_id: usize) {
        println!("\n============== Commit Group Trace (Core {core_id}) ==============");
        let head = self.groups.last_index();
        for (i, group) in self.groups.snapshot() {
            let line = format!(
                "commit group [{i:x}]: pc {:#012x} cmtcnt {}",
                group.pc, group.count
            );
            if Some(i) == head {
                println!("{line} {}", Yellow.bold().paint("<-- commit head"));
            } else {
                println!("{line}");
            }
        }

        println!("\n============== Commit Instr Trace ==============");
        let head = self.insts.last_index();
        for (i, inst) in self.insts.snapshot() {
            if Some(i) == head {
                println!(
                    "{} {}",
                    Red.bold().paint(format!("[{i:x}] {inst}")),
                    Red.bold().paint("<-- ERROR")
                );
            } else {
                println!("[{i:x}] {inst}");
            }
        }
    }
}
