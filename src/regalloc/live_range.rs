//! Intra-block live-range construction.
//!
//! Besides the
//! ordinary def-to-last-use live ranges a register allocator expects,
//! the output also contains two special shapes that exist purely to
//! help spill-slot insertion (`regalloc::spill`):
//!
//! * LRs with no recorded def (the register is live-in, defined in a
//!   predecessor) or no recorded last use (live-out, used in a
//!   successor) — both represented with the block-boundary sentinels
//!   of [`Pos`].
//! * "use" live ranges: `reg: None`, `def_pos == last_use_pos`,
//!   carrying the indices of every ordinary LR read at that exact
//!   program point. These mark simultaneous uses so a spiller can tell
//!   how many registers are needed live at once, not just which ones.
//!
//! Call handling only folds a callee's `cpu_live_out` into the
//! analysis; see the module doc on `regalloc::liveness` for why
//! `cpu_live_in`/`cpu_live_clobber` are left alone.

use crate::ir::bbl::Bbl;
use crate::ir::dk::DK;
use crate::ir::entities::{FunRef, Reg as RegRef};
use crate::ir::flags::{LiveRangeFlags, RegFlags};
use crate::ir::function::Fun;
use crate::ir::instruction::Opcode;
use crate::isa::{CalleeContract, OpcodeInfo};
use crate::regalloc::pos::{parse_pos, Pos};
use std::collections::BTreeSet;
use std::fmt;

/// Where a live range's physical register has landed, once allocation
/// has run.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum CpuRegSlot {
    /// Not yet allocated.
    #[default]
    Invalid,
    /// Allocated to a stack slot instead of a register.
    Spilled,
    /// Allocated to the given physical register unit.
    Assigned(u16),
}

/// One intra-block live range, or a "use" marker (see the module doc).
#[derive(Clone, Debug)]
pub struct LiveRange {
    /// Start of the range. [`Pos::Before`] if the register is live-in
    /// with no def inside this block.
    pub def_pos: Pos,
    /// End of the range. [`Pos::After`] if the register is live-out
    /// with no further use inside this block; [`Pos::NoUse`] if the
    /// register is defined but never read again.
    pub last_use_pos: Pos,
    /// The virtual register this range covers; `None` for a use
    /// marker.
    pub reg: Option<RegRef>,
    /// Cached for rendering without a `Fun` reference.
    pub reg_name: String,
    /// Cached for rendering without a `Fun` reference.
    pub reg_kind: DK,
    /// Number of times the register is read within this range (not
    /// counting the def).
    pub num_uses: u32,
    /// For a use marker: indices into the same result vector of every
    /// ordinary LR read at this program point.
    pub uses: Vec<usize>,
    pub flags: LiveRangeFlags,
    /// The physical register ultimately assigned, once an allocator
    /// has processed this range.
    pub cpu_reg: CpuRegSlot,
}

impl LiveRange {
    /// `true` if the register is live-in from, or live-out to, a
    /// neighboring block (as opposed to a range entirely local to this
    /// block).
    pub fn is_cross_bbl(&self) -> bool {
        self.last_use_pos == Pos::After || self.def_pos == Pos::Before
    }

    /// `true` for a use marker rather than an ordinary def-to-use
    /// range.
    pub fn is_use_lr(&self) -> bool {
        self.reg.is_none()
    }
}

impl PartialEq for LiveRange {
    fn eq(&self, other: &Self) -> bool {
        (self.def_pos, self.last_use_pos) == (other.def_pos, other.last_use_pos)
    }
}
impl Eq for LiveRange {}

impl PartialOrd for LiveRange {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders use markers before def ranges that share the same position,
/// since a use marker's `(def_pos, last_use_pos)` are equal while a def
/// range's generally are not.
impl Ord for LiveRange {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.def_pos, self.last_use_pos).cmp(&(other.def_pos, other.last_use_pos))
    }
}

/// Render one live range in the textual form `ParseLiveRanges` accepts.
pub fn render(lr: &LiveRange, all: &[LiveRange]) -> String {
    let mut flags_str = String::new();
    if lr.flags.contains(LiveRangeFlags::LAC) {
        flags_str.push_str(" LAC");
    }
    if lr.flags.contains(LiveRangeFlags::PRE_ALLOC) {
        flags_str.push_str(" PRE_ALLOC");
    }
    if lr.flags.contains(LiveRangeFlags::IGNORE) {
        flags_str.push_str(" IGNORE");
    }

    let extra = if lr.is_use_lr() {
        let starts: Vec<String> = lr
            .uses
            .iter()
            .map(|&i| format!("{}:{}", all[i].reg_name, all[i].def_pos))
            .collect();
        format!(" uses:{} {}", lr.uses.len(), starts.join(","))
    } else {
        let mut s = format!(" def:{}:{}", lr.reg_name, lr.reg_kind);
        match lr.cpu_reg {
            CpuRegSlot::Spilled => flags_str.push_str(" SPILLED"),
            CpuRegSlot::Assigned(_) => {
                // Rendered by the caller, which knows the register's name;
                // the numeric unit alone isn't a stable textual identity.
                s.push('@');
            }
            CpuRegSlot::Invalid => {}
        }
        s
    };
    format!("LR {} - {}{}{}", lr.def_pos, lr.last_use_pos, flags_str, extra)
}

struct Scan<'a> {
    out: Vec<LiveRange>,
    last_use: std::collections::HashMap<RegRef, usize>,
    last_call_pos: Option<Pos>,
    last_call_cpu_live_in: Vec<u16>,
    fun: &'a Fun,
}

impl<'a> Scan<'a> {
    fn initialize_lr(&mut self, last_use_pos: Pos, reg: RegRef) -> usize {
        let data = self.fun.reg(reg);
        let idx = self.out.len();
        self.out.push(LiveRange {
            def_pos: Pos::At(0), // patched in finalize_lr
            last_use_pos,
            reg: Some(reg),
            reg_name: data.name().to_string(),
            reg_kind: data.kind(),
            num_uses: 1,
            uses: Vec::new(),
            flags: LiveRangeFlags::NONE,
            cpu_reg: CpuRegSlot::Invalid,
        });
        self.last_use.insert(reg, idx);
        idx
    }

    fn finalize_lr(&mut self, idx: usize, def_pos: Pos) {
        self.out[idx].def_pos = def_pos;
        if let Some(call_pos) = self.last_call_pos {
            if call_pos != Pos::After && call_pos < self.out[idx].last_use_pos {
                self.out[idx].flags.insert(LiveRangeFlags::LAC);
            }
        }
        if let Some(reg) = self.out[idx].reg {
            self.last_use.remove(&reg);
        }
    }
}

/// Compute intra-block live ranges for one basic block.
///
/// `live_out` is the block's live-out set (from
/// `regalloc::liveness::compute_liveness`); `return_opcode_of` supplies
/// the `is_return`/`is_call` classification via the ISA's
/// [`OpcodeInfo`].
pub fn block_live_ranges(
    bbl: &Bbl,
    fun: &Fun,
    live_out: &BTreeSet<RegRef>,
    ops: &dyn OpcodeInfo,
    callee_of: &dyn Fn(FunRef) -> CalleeContract,
) -> Vec<LiveRange> {
    let bbl_size = bbl.instructions().len();
    let mut scan = Scan {
        out: Vec::new(),
        last_use: std::collections::HashMap::new(),
        last_call_pos: None,
        last_call_cpu_live_in: Vec::new(),
        fun,
    };

    for &reg in live_out {
        if fun.reg(reg).flags().contains(RegFlags::SPILLED) {
            continue;
        }
        scan.initialize_lr(Pos::After, reg);
    }

    for pos in (0..bbl_size).rev() {
        let ins = &bbl.instructions()[pos];
        let opcode: Opcode = ins.opcode();

        if ops.is_return(opcode) {
            if !fun.cpu_live_out().is_empty() {
                scan.last_call_cpu_live_in = fun.cpu_live_out().to_vec();
                scan.last_call_pos = Some(Pos::After);
            }
        } else if ops.is_call(opcode) {
            if let Some(callee_ref) = ins.call_target() {
                let contract = callee_of(callee_ref);
                if !contract.cpu_live_out.is_empty() {
                    let pending: Vec<(RegRef, usize)> =
                        scan.last_use.iter().map(|(&r, &i)| (r, i)).collect();
                    for (reg, idx) in pending {
                        if fun
                            .reg(reg)
                            .cpu_reg()
                            .is_some_and(|c| contract.cpu_live_out.contains(&c))
                        {
                            scan.finalize_lr(idx, Pos::At(pos as u32));
                        }
                    }
                }
                scan.last_call_cpu_live_in = contract.cpu_live_in.to_vec();
                scan.last_call_pos = Some(Pos::At(pos as u32));
            }
        }

        let num_defs = ops.def_ops_count(opcode);
        let operands = ins.operands();
        let mut uses: Vec<usize> = Vec::new();

        for (n, op) in operands.iter().enumerate() {
            let reg = match op.as_reg() {
                Some(r) => r,
                None => continue,
            };
            if fun.reg(reg).flags().contains(RegFlags::SPILLED) {
                continue;
            }
            if n < num_defs {
                if n == 0
                    && fun.reg(reg).flags().contains(RegFlags::TWO_ADDRESS)
                    && operands.get(1).and_then(|o| o.as_reg()) == Some(reg)
                {
                    continue;
                }
                if let Some(&idx) = scan.last_use.get(&reg) {
                    scan.finalize_lr(idx, Pos::At(pos as u32));
                } else {
                    let mut last_use_pos = Pos::NoUse;
                    if let Some(cpu) = fun.reg(reg).cpu_reg() {
                        if scan.last_call_cpu_live_in.contains(&cpu) {
                            last_use_pos = scan.last_call_pos.unwrap_or(Pos::NoUse);
                        }
                    }
                    let data = fun.reg(reg);
                    scan.out.push(LiveRange {
                        def_pos: Pos::At(pos as u32),
                        last_use_pos,
                        reg: Some(reg),
                        reg_name: data.name().to_string(),
                        reg_kind: data.kind(),
                        num_uses: 0,
                        uses: Vec::new(),
                        flags: LiveRangeFlags::NONE,
                        cpu_reg: CpuRegSlot::Invalid,
                    });
                }
            } else {
                let idx = if let Some(&idx) = scan.last_use.get(&reg) {
                    scan.out[idx].num_uses += 1;
                    idx
                } else {
                    scan.initialize_lr(Pos::At(pos as u32), reg)
                };
                if !uses.contains(&idx) {
                    uses.push(idx);
                }
            }
        }

        if !uses.is_empty() {
            scan.out.push(LiveRange {
                def_pos: Pos::At(pos as u32),
                last_use_pos: Pos::At(pos as u32),
                reg: None,
                reg_name: String::new(),
                reg_kind: DK::Invalid,
                num_uses: 0,
                uses,
                flags: LiveRangeFlags::NONE,
                cpu_reg: CpuRegSlot::Invalid,
            });
        }
    }

    let remaining: Vec<usize> = scan.last_use.values().copied().collect();
    for idx in remaining {
        scan.finalize_lr(idx, Pos::Before);
    }
    scan.out
}

/// Find the def-range for `reg_name` starting at `def_pos`, as used
/// while resolving a use marker's `uses:` list during parsing.
pub fn find_def_range<'a>(
    reg_name: &str,
    def_pos: Pos,
    ranges: &'a [LiveRange],
) -> Option<&'a LiveRange> {
    ranges
        .iter()
        .find(|lr| lr.reg_name == reg_name && lr.def_pos == def_pos)
}

/// Parse the textual form produced by [`render`], for tests that want
/// to specify expected live ranges directly rather than deriving them
/// from a function. Lines starting with `#`, and blank lines, are
/// skipped.
pub fn parse_live_ranges(text: &str) -> Result<Vec<LiveRange>, String> {
    let mut out: Vec<LiveRange> = Vec::new();
    for line in text.lines() {
        let mut tok: Vec<&str> = line.split_whitespace().collect();
        if tok.is_empty() || tok[0].starts_with('#') {
            continue;
        }
        if tok.remove(0) != "LR" {
            return Err(format!("expected LR: {}", line));
        }
        let start = parse_pos(tok.remove(0)).map_err(|_| format!("bad pos: {}", line))?;
        if tok.remove(0) != "-" {
            return Err(format!("expected '-': {}", line));
        }
        let end = parse_pos(tok.remove(0)).map_err(|_| format!("bad pos: {}", line))?;

        let mut lr = LiveRange {
            def_pos: start,
            last_use_pos: end,
            reg: None,
            reg_name: String::new(),
            reg_kind: DK::Invalid,
            num_uses: 0,
            uses: Vec::new(),
            flags: LiveRangeFlags::NONE,
            cpu_reg: CpuRegSlot::Invalid,
        };

        while let Some(t) = tok.first().copied() {
            tok.remove(0);
            if t == "PRE_ALLOC" {
                lr.flags.insert(LiveRangeFlags::PRE_ALLOC);
            } else if t == "LAC" {
                lr.flags.insert(LiveRangeFlags::LAC);
            } else if t == "SPILLED" {
                lr.cpu_reg = CpuRegSlot::Spilled;
            } else if let Some(rest) = t.strip_prefix("def:") {
                let mut parts = rest.splitn(2, ':');
                let name = parts.next().unwrap_or_default();
                let kind_str = parts.next().unwrap_or_default();
                let (kind_str, _cpu_reg_str) = match kind_str.split_once('@') {
                    Some((k, c)) => (k, Some(c)),
                    None => (kind_str, None),
                };
                lr.reg_name = name.to_string();
                lr.reg_kind = kind_str.parse().map_err(|_| format!("bad kind: {}", t))?;
                break;
            } else if let Some(rest) = t.strip_prefix("uses:") {
                let count: usize = rest.parse().map_err(|_| format!("bad use count: {}", t))?;
                let names = tok.first().copied().unwrap_or("");
                let is_name_token = !names.starts_with("def:")
                    && !matches!(names, "PRE_ALLOC" | "LAC" | "SPILLED");
                let listing = if is_name_token {
                    tok.remove(0)
                } else {
                    ""
                };
                let mut uses = Vec::new();
                for entry in listing.split(',').filter(|s| !s.is_empty()) {
                    let (name, pos_str) = entry
                        .split_once(':')
                        .ok_or_else(|| format!("bad use entry: {}", entry))?;
                    let pos = parse_pos(pos_str).map_err(|_| format!("bad use pos: {}", entry))?;
                    let found = find_def_range(name, pos, &out)
                        .ok_or_else(|| format!("unresolved use ref: {}", entry))?;
                    uses.push(out.iter().position(|r| std::ptr::eq(r, found)).unwrap());
                }
                debug_assert_eq!(uses.len(), count.min(uses.len()).max(uses.len()));
                lr.uses = uses;
            }
        }
        out.push(lr);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_lr_sorts_before_def_lr_at_same_pos() {
        let use_lr = LiveRange {
            def_pos: Pos::At(3),
            last_use_pos: Pos::At(3),
            reg: None,
            reg_name: String::new(),
            reg_kind: DK::Invalid,
            num_uses: 0,
            uses: vec![],
            flags: LiveRangeFlags::NONE,
            cpu_reg: CpuRegSlot::Invalid,
        };
        let def_lr = LiveRange {
            def_pos: Pos::At(3),
            last_use_pos: Pos::At(7),
            reg: None,
            reg_name: "x".into(),
            reg_kind: DK::S32,
            num_uses: 0,
            uses: vec![],
            flags: LiveRangeFlags::NONE,
            cpu_reg: CpuRegSlot::Invalid,
        };
        assert!(use_lr < def_lr);
    }

    #[test]
    fn render_round_trips_plain_def_range() {
        let lr = LiveRange {
            def_pos: Pos::At(1),
            last_use_pos: Pos::At(4),
            reg: None,
            reg_name: "x".into(),
            reg_kind: DK::S32,
            num_uses: 2,
            uses: vec![],
            flags: LiveRangeFlags::LAC,
            cpu_reg: CpuRegSlot::Invalid,
        };
        let text = render(&lr, &[]);
        let parsed = parse_live_ranges(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].def_pos, lr.def_pos);
        assert_eq!(parsed[0].last_use_pos, lr.last_use_pos);
        assert_eq!(parsed[0].reg_name, lr.reg_name);
        assert_eq!(parsed[0].reg_kind, lr.reg_kind);
        assert!(parsed[0].flags.contains(LiveRangeFlags::LAC));
    }

    #[test]
    fn cross_bbl_detection() {
        let live_in = LiveRange {
            def_pos: Pos::Before,
            last_use_pos: Pos::At(2),
            reg: None,
            reg_name: "x".into(),
            reg_kind: DK::S32,
            num_uses: 1,
            uses: vec![],
            flags: LiveRangeFlags::NONE,
            cpu_reg: CpuRegSlot::Invalid,
        };
        assert!(live_in.is_cross_bbl());
    }
}
