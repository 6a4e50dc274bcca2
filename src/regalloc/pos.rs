//! Live-range positions.
//!
//! Rather than encode a live range's start/end as a plain integer with
//! three out-of-band sentinel values (`BEFORE_BBL`, `AFTER_BBL`,
//! `NO_USE`) chosen far outside any real instruction index — which
//! invites an off-by-one into the sentinel range — a position here is a
//! proper sum type: an ordinary in-block index, or one of the three
//! named sentinels, with `Ord` giving the same total order the sentinel
//! integers would.

use crate::ir::InstPos;
use core::cmp::Ordering;
use core::fmt;

/// A position within, before, or after a basic block's instruction
/// list, or the "no use found" sentinel.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Pos {
    /// Before the start of the block: the register is live-in and its
    /// definition lies in a predecessor.
    Before,
    /// An ordinary instruction index within the block.
    At(InstPos),
    /// After the end of the block: the register is live-out and its
    /// last use lies in a successor.
    After,
    /// No use was found (a pure "def, never used again" live range).
    NoUse,
}

impl Pos {
    /// Numeric rank used for ordering and for textual rendering of
    /// in-block positions; sentinels do not have a meaningful rank
    /// outside comparison.
    fn rank(self) -> i64 {
        match self {
            Pos::Before => i64::MIN,
            Pos::At(p) => i64::from(p),
            Pos::After => i64::MAX - 1,
            Pos::NoUse => i64::MAX,
        }
    }

    /// `true` for `Before` or `After`: this live range crosses the
    /// block boundary rather than living entirely inside one block.
    pub fn is_cross_bbl_sentinel(self) -> bool {
        matches!(self, Pos::Before | Pos::After)
    }

    /// The in-block index, if this is an ordinary position.
    pub fn as_index(self) -> Option<InstPos> {
        match self {
            Pos::At(p) => Some(p),
            _ => None,
        }
    }
}

impl PartialOrd for Pos {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pos {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Pos::Before => f.write_str("BB"),
            Pos::After => f.write_str("AB"),
            Pos::NoUse => f.write_str("NU"),
            Pos::At(p) => write!(f, "{:2}", p),
        }
    }
}

/// Parse the two-letter sentinel tokens or a plain integer, as they
/// appear in the textual live-range format.
pub fn parse_pos(s: &str) -> Result<Pos, ()> {
    match s {
        "BB" => Ok(Pos::Before),
        "AB" => Ok(Pos::After),
        "NU" => Ok(Pos::NoUse),
        _ => s.parse::<InstPos>().map(Pos::At).map_err(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_sentinel_convention() {
        assert!(Pos::Before < Pos::At(0));
        assert!(Pos::At(0) < Pos::At(5));
        assert!(Pos::At(1000) < Pos::After);
        assert!(Pos::After < Pos::NoUse);
    }

    #[test]
    fn parse_round_trips() {
        assert_eq!(parse_pos("BB"), Ok(Pos::Before));
        assert_eq!(parse_pos("AB"), Ok(Pos::After));
        assert_eq!(parse_pos("NU"), Ok(Pos::NoUse));
        assert_eq!(parse_pos("7"), Ok(Pos::At(7)));
        assert_eq!(parse_pos("x"), Err(()));
    }

    #[test]
    fn display_matches_parse() {
        assert_eq!(parse_pos(&Pos::Before.to_string()), Ok(Pos::Before));
        assert_eq!(parse_pos(&Pos::After.to_string()), Ok(Pos::After));
        assert_eq!(parse_pos(&Pos::NoUse.to_string()), Ok(Pos::NoUse));
    }
}
