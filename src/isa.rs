//! Architectural constants shared by the commit checker: register file
//! layout, exception causes, trap codes.
//!
//! The checker compares the DUT against the reference engine over a flat
//! register image: 32 general-purpose registers, the control/status
//! registers, and one synthetic `this_pc` slot that mirrors the program
//! counter for display purposes only.

macro_rules! define_code {
    {
        @mod $modname:ident;
        @type $typ:ty;
        $( $(#[$meta:meta])* $cname:ident = $cval:expr; )*
    } => {
        pub mod $modname {
            $( $(#[$meta])* pub const $cname : $typ = $cval; )*
            #[allow(unused)]
            pub fn name_of(code: $typ) -> &'static str {
                match code {
                    $($cname => stringify!($cname), )*
                    _ => "no name"
                }
            }
        }
    };
}

pub(crate) use define_code;

define_code! {
    @mod reg_code;
    @type u8;
    ZERO = 0;
    RA = 1;
    TP = 2;
    SP = 3;
    A0 = 4;
    A1 = 5;
    A2 = 6;
    A3 = 7;
    A4 = 8;
    A5 = 9;
    A6 = 10;
    A7 = 11;
    T0 = 12;
    T1 = 13;
    T2 = 14;
    T3 = 15;
    T4 = 16;
    T5 = 17;
    T6 = 18;
    T7 = 19;
    T8 = 20;
    // r21 is reserved by the ABI
    FP = 22;
    S0 = 23;
    S1 = 24;
    S2 = 25;
    S3 = 26;
    S4 = 27;
    S5 = 28;
    S6 = 29;
    S7 = 30;
    S8 = 31;
}

define_code! {
    @mod exc_code;
    @type u64;
    /// Instruction page fault. Needs guided execution on the reference.
    INST_PAGE_FAULT = 12;
    /// Load page fault. Needs guided execution on the reference.
    LOAD_PAGE_FAULT = 13;
    /// Store page fault. Needs guided execution on the reference.
    STORE_PAGE_FAULT = 15;
}

define_code! {
    @mod trap_code;
    @type u64;
    GOOD_TRAP = 0;
    BAD_TRAP = 1;
}

/// Number of general-purpose registers.
pub const NR_GPR: usize = 32;

/// Total register image size: GPRs, CSRs, and the `this_pc` shadow slot.
pub const NR_REG: usize = 59;

/// Index of the synthetic `this_pc` slot. It is tracked for display and
/// skip-lane bookkeeping, and excluded from the register compare.
pub const THIS_PC: usize = NR_REG - 1;

/// Fixed instruction width in bytes. Skipped commits advance the reference
/// program counter by exactly this much.
pub const INST_WIDTH: u64 = 4;

/// Injected interrupt causes carry this bit to distinguish them from
/// exception causes on the reference side.
pub const INTR_FLAG_BIT: u64 = 1 << 63;

/// Register display names, indexed like the register image.
pub const REG_NAMES: [&str; NR_REG] = [
    "r0", "ra", "tp", "sp", "a0", "a1", "a2", "a3", "a4", "a5", //
    "a6", "a7", "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", //
    "t8", " x", "fp", "s0", "s1", "s2", "s3", "s4", "s5", "s6", //
    "s7", "s8", //
    "crmd", "prmd", "euen", "ecfg", "era", "badv", "eentry", "tlbidx",
    "tlbehi", "tlbelo0", "tlbelo1", "asid", "pgdl", "pgdh", "save0", "save1",
    "save2", "save3", "tid", "tcfg", "tval", "llbctl", "tlbrentry", "dmw0",
    "dmw1", "estat", "this_pc",
];

/// We use a 64-bit integer array to represent the architectural register
/// image on both sides of the comparison.
pub type RegFile = [u64; NR_REG];

/// Exception causes that require guided execution: the reference engine
/// cannot infer the precise fault context for these on its own.
pub fn needs_guided_exec(cause: u64) -> bool {
    matches!(
        cause,
        exc_code::INST_PAGE_FAULT | exc_code::LOAD_PAGE_FAULT | exc_code::STORE_PAGE_FAULT
    )
}
