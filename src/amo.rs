//! Atomic operation emulator.
//!
//! Replays an atomic read-modify-write against [`GoldenMem`] and
//! cross-checks the pre-existing value the DUT observed. The emulator is a
//! pure function of the event and the golden image: it never talks to the
//! reference engine and never halts the checker itself. The caller decides
//! what a [`AmoOutcome::Mismatch`] means.

use anyhow::bail;
use tracing::warn;

use crate::goldenmem::GoldenMem;
use crate::isa::define_code;

define_code! {
    @mod amo_code;
    @type u8;
    LR_W = 0o02;
    LR_D = 0o03;
    SC_W = 0o06;
    SC_D = 0o07;
    SWAP_W = 0o12;
    SWAP_D = 0o13;
    ADD_W = 0o16;
    ADD_D = 0o17;
    XOR_W = 0o22;
    XOR_D = 0o23;
    AND_W = 0o26;
    AND_D = 0o27;
    OR_W = 0o32;
    OR_D = 0o33;
    MIN_W = 0o36;
    MIN_D = 0o37;
    MAX_W = 0o42;
    MAX_D = 0o43;
    MINU_W = 0o46;
    MINU_D = 0o47;
    MAXU_W = 0o52;
    MAXU_D = 0o53;
}

/// Operation tag decoded from the functional-unit subcode. Width is not
/// part of the tag; it comes from the byte mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmoOp {
    /// Load-reserved: memory keeps its value.
    Lr,
    /// Store-conditional: the operand is stored as-is.
    Sc,
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    MinU,
    MaxU,
}

impl AmoOp {
    /// Total decode of the dense subcode table. `None` is an unrecognized
    /// subcode, surfaced to the caller rather than silently dropped.
    pub fn decode(code: u8) -> Option<Self> {
        use amo_code::*;
        match code {
            LR_W | LR_D => Some(Self::Lr),
            SC_W | SC_D => Some(Self::Sc),
            SWAP_W | SWAP_D => Some(Self::Swap),
            ADD_W | ADD_D => Some(Self::Add),
            XOR_W | XOR_D => Some(Self::Xor),
            AND_W | AND_D => Some(Self::And),
            OR_W | OR_D => Some(Self::Or),
            MIN_W | MIN_D => Some(Self::Min),
            MAX_W | MAX_D => Some(Self::Max),
            MINU_W | MINU_D => Some(Self::MinU),
            MAXU_W | MAXU_D => Some(Self::MaxU),
            _ => None,
        }
    }

    fn apply64(self, t: u64, rs: u64) -> u64 {
        match self {
            Self::Lr => t,
            Self::Sc | Self::Swap => rs,
            Self::Add => t.wrapping_add(rs),
            Self::Xor => t ^ rs,
            Self::And => t & rs,
            Self::Or => t | rs,
            Self::Min => (t as i64).min(rs as i64) as u64,
            Self::Max => (t as i64).max(rs as i64) as u64,
            Self::MinU => t.min(rs),
            Self::MaxU => t.max(rs),
        }
    }

    fn apply32(self, t: u32, rs: u32) -> u32 {
        match self {
            Self::Lr => t,
            Self::Sc | Self::Swap => rs,
            Self::Add => t.wrapping_add(rs),
            Self::Xor => t ^ rs,
            Self::And => t & rs,
            Self::Or => t | rs,
            Self::Min => (t as i32).min(rs as i32) as u32,
            Self::Max => (t as i32).max(rs as i32) as u32,
            Self::MinU => t.min(rs),
            Self::MaxU => t.max(rs),
        }
    }
}

/// One completed atomic memory operation as reported by the DUT.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AtomicEvent {
    pub addr: u64,
    /// Write operand (rs2).
    pub data: u64,
    /// Byte mask: `0x0f`/`0xf0` select the low/high half of the 8-byte
    /// cell for a 32-bit atomic, `0xff` a full-width 64-bit atomic.
    pub mask: u8,
    /// Functional-unit subcode, see [`amo_code`].
    pub fuop: u8,
    /// Pre-existing memory value as observed by the DUT (the old value
    /// the atomic instruction returned).
    pub out: u64,
}

/// What the emulator concluded. Only `Applied` mutates golden memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmoOutcome {
    /// Result computed and written back to golden memory.
    Applied { result: u64 },
    /// Subcode not in the operation table; golden memory untouched.
    /// An implementation gap to surface, not an architectural mismatch.
    UnknownOp(u8),
    /// The DUT-observed pre-existing value disagrees with golden memory.
    Mismatch { golden: u64, observed: u64 },
}

/// Replay one atomic operation against golden memory.
///
/// Bad byte masks and out-of-image addresses are configuration errors and
/// reported through `Err`; everything else is a typed [`AmoOutcome`].
pub fn handle_atomic(ev: &AtomicEvent, gmem: &mut GoldenMem) -> anyhow::Result<AmoOutcome> {
    match ev.mask {
        0xff => handle_atomic_d(ev, gmem),
        0x0f | 0xf0 => handle_atomic_w(ev, gmem),
        mask => bail!("unrecognized atomic byte mask {mask:#x}"),
    }
}

fn handle_atomic_d(ev: &AtomicEvent, gmem: &mut GoldenMem) -> anyhow::Result<AmoOutcome> {
    let rs = ev.data;
    let t = ev.out;
    let mem = gmem.read_u64(ev.addr)?;

    // sc.d / lr.d consistency is intentionally not checked
    if mem != t && ev.fuop != amo_code::SC_D && ev.fuop != amo_code::LR_D {
        warn!(
            "atomic op {:#o} at {:#x} mismatches golden memory: mem {mem:#x}, dut {t:#x}",
            ev.fuop, ev.addr
        );
        return Ok(AmoOutcome::Mismatch {
            golden: mem,
            observed: t,
        });
    }

    let Some(op) = AmoOp::decode(ev.fuop) else {
        warn!("unknown atomic fuop {:#o}", ev.fuop);
        return Ok(AmoOutcome::UnknownOp(ev.fuop));
    };

    let ret = op.apply64(t, rs);
    gmem.write_u64_masked(ev.addr, ret, ev.mask)?;
    Ok(AmoOutcome::Applied { result: ret })
}

fn handle_atomic_w(ev: &AtomicEvent, gmem: &mut GoldenMem) -> anyhow::Result<AmoOutcome> {
    let rs = ev.data as u32;
    let t = ev.out as u32;
    let addr = ev.addr & !7;
    let mem_raw = gmem.read_u64(addr)?;
    let mem = if ev.mask == 0x0f {
        mem_raw as u32
    } else {
        (mem_raw >> 32) as u32
    };

    // sc.w / lr.w consistency is intentionally not checked
    if mem != t && ev.fuop != amo_code::SC_W && ev.fuop != amo_code::LR_W {
        warn!(
            "atomic op {:#o} at {:#x} mismatches golden memory: raw {mem_raw:#x}, mem {mem:#x}, dut {t:#x}",
            ev.fuop, addr
        );
        return Ok(AmoOutcome::Mismatch {
            golden: mem as u64,
            observed: t as u64,
        });
    }

    let Some(op) = AmoOp::decode(ev.fuop) else {
        warn!("unknown atomic fuop {:#o}", ev.fuop);
        return Ok(AmoOutcome::UnknownOp(ev.fuop));
    };

    let ret = op.apply32(t, rs);
    let ret_sel = if ev.mask == 0xf0 {
        (ret as u64) << 32
    } else {
        ret as u64
    };
    gmem.write_u64_masked(addr, ret_sel, ev.mask)?;
    Ok(AmoOutcome::Applied {
        result: ret as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gmem_with(addr: u64, val: u64) -> GoldenMem {
        let mut gm = GoldenMem::new(0x1000, 0x100);
        gm.write_u64(addr, val).unwrap();
        gm
    }

    #[test]
    fn full_width_add_wraps() -> anyhow::Result<()> {
        let mut gm = gmem_with(0x1010, u64::MAX);
        let ev = AtomicEvent {
            addr: 0x1010,
            data: 3,
            mask: 0xff,
            fuop: amo_code::ADD_D,
            out: u64::MAX,
        };
        let out = handle_atomic(&ev, &mut gm)?;
        assert_eq!(out, AmoOutcome::Applied { result: 2 });
        assert_eq!(gm.read_u64(0x1010)?, 2);
        Ok(())
    }

    #[test]
    fn full_width_signed_max() -> anyhow::Result<()> {
        let mut gm = gmem_with(0x1010, 5);
        let ev = AtomicEvent {
            addr: 0x1010,
            data: 9,
            mask: 0xff,
            fuop: amo_code::MAX_D,
            out: 5,
        };
        handle_atomic(&ev, &mut gm)?;
        assert_eq!(gm.read_u64(0x1010)?, 9);
        Ok(())
    }

    #[test]
    fn unsigned_min_differs_from_signed() -> anyhow::Result<()> {
        // -1 as unsigned is the maximum, so minu keeps the operand
        let mut gm = gmem_with(0x1010, u64::MAX);
        let ev = AtomicEvent {
            addr: 0x1010,
            data: 7,
            mask: 0xff,
            fuop: amo_code::MINU_D,
            out: u64::MAX,
        };
        handle_atomic(&ev, &mut gm)?;
        assert_eq!(gm.read_u64(0x1010)?, 7);

        // signed min keeps -1
        let mut gm = gmem_with(0x1010, u64::MAX);
        let ev = AtomicEvent {
            fuop: amo_code::MIN_D,
            ..ev
        };
        handle_atomic(&ev, &mut gm)?;
        assert_eq!(gm.read_u64(0x1010)?, u64::MAX);
        Ok(())
    }

    #[test]
    fn half_width_or_touches_upper_half_only() -> anyhow::Result<()> {
        let mut gm = gmem_with(0x1018, 0x1111_1111_2222_2222);
        let ev = AtomicEvent {
            addr: 0x101c,
            data: 0x0000_00ff,
            mask: 0xf0,
            fuop: amo_code::OR_W,
            out: 0x1111_1111,
        };
        let out = handle_atomic(&ev, &mut gm)?;
        assert_eq!(
            out,
            AmoOutcome::Applied {
                result: 0x1111_11ff
            }
        );
        assert_eq!(gm.read_u64(0x1018)?, 0x1111_11ff_2222_2222);
        Ok(())
    }

    #[test]
    fn half_width_signed_min_uses_32_bit_compare() -> anyhow::Result<()> {
        // 0xffff_ffff is -1 in 32 bits, smaller than 3
        let mut gm = gmem_with(0x1018, 0xffff_ffff);
        let ev = AtomicEvent {
            addr: 0x1018,
            data: 3,
            mask: 0x0f,
            fuop: amo_code::MIN_W,
            out: 0xffff_ffff,
        };
        handle_atomic(&ev, &mut gm)?;
        assert_eq!(gm.read_u64(0x1018)?, 0xffff_ffff);
        Ok(())
    }

    #[test]
    fn mismatch_is_reported_not_applied() -> anyhow::Result<()> {
        let mut gm = gmem_with(0x1010, 0x55);
        let ev = AtomicEvent {
            addr: 0x1010,
            data: 1,
            mask: 0xff,
            fuop: amo_code::ADD_D,
            out: 0x44,
        };
        let out = handle_atomic(&ev, &mut gm)?;
        assert_eq!(
            out,
            AmoOutcome::Mismatch {
                golden: 0x55,
                observed: 0x44
            }
        );
        assert_eq!(gm.read_u64(0x1010)?, 0x55);
        Ok(())
    }

    #[test]
    fn lr_sc_skip_the_consistency_check() -> anyhow::Result<()> {
        // full width: lr.d and sc.d only
        let mut gm = gmem_with(0x1010, 0x55);
        for fuop in [amo_code::LR_D, amo_code::SC_D] {
            let ev = AtomicEvent {
                addr: 0x1010,
                data: 0x55,
                mask: 0xff,
                fuop,
                out: 0x44,
            };
            assert!(matches!(
                handle_atomic(&ev, &mut gm)?,
                AmoOutcome::Applied { .. }
            ));
        }
        // lr.w does not get the full-width exemption
        let mut gm = gmem_with(0x1010, 0x55);
        let ev = AtomicEvent {
            addr: 0x1010,
            data: 0x55,
            mask: 0xff,
            fuop: amo_code::LR_W,
            out: 0x44,
        };
        assert!(matches!(
            handle_atomic(&ev, &mut gm)?,
            AmoOutcome::Mismatch { .. }
        ));
        // half width: lr.w is exempt
        let mut gm = gmem_with(0x1018, 0x55);
        let ev = AtomicEvent {
            addr: 0x1018,
            data: 0x55,
            mask: 0x0f,
            fuop: amo_code::LR_W,
            out: 0x44,
        };
        assert!(matches!(
            handle_atomic(&ev, &mut gm)?,
            AmoOutcome::Applied { .. }
        ));
        Ok(())
    }

    #[test]
    fn unknown_subcode_leaves_memory_untouched() -> anyhow::Result<()> {
        let mut gm = gmem_with(0x1010, 0x99);
        let ev = AtomicEvent {
            addr: 0x1010,
            data: 1,
            mask: 0xff,
            fuop: 0o60,
            out: 0x99,
        };
        assert_eq!(handle_atomic(&ev, &mut gm)?, AmoOutcome::UnknownOp(0o60));
        assert_eq!(gm.read_u64(0x1010)?, 0x99);
        Ok(())
    }

    #[test]
    fn bad_mask_is_a_configuration_error() {
        let mut gm = GoldenMem::new(0x1000, 0x100);
        let ev = AtomicEvent {
            addr: 0x1010,
            data: 1,
            mask: 0x3c,
            fuop: amo_code::ADD_D,
            out: 0,
        };
        assert!(handle_atomic(&ev, &mut gm).is_err());
    }

    #[test]
    fn swap_stores_operand() -> anyhow::Result<()> {
        let mut gm = gmem_with(0x1020, 0xdead);
        let ev = AtomicEvent {
            addr: 0x1020,
            data: 0xbeef,
            mask: 0xff,
            fuop: amo_code::SWAP_D,
            out: 0xdead,
        };
        handle_atomic(&ev, &mut gm)?;
        assert_eq!(gm.read_u64(0x1020)?, 0xbeef);
        Ok(())
    }
}
