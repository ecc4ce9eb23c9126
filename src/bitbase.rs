/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The king-and-pawn-versus-king bitbase.
//!
//! Every KPK position, normalized so the pawn's side is White and the pawn
//! stands on files a through d, is classified as won or drawn for the
//! strong side by retrograde fixed-point iteration. The table is built once
//! at startup and probed by the endgame scorers.

use std::sync::LazyLock;

use crate::{attacks, Color, File, Rank, Square};

/// Number of classified positions: 2 sides to move, 24 normalized pawn
/// squares (files a-d, ranks 2-7), and two free kings.
const ENTRIES: usize = 2 * 24 * 64 * 64;

const INVALID: u8 = 0;
const UNKNOWN: u8 = 1;
const DRAW: u8 = 2;
const WIN: u8 = 4;

static BITBASE: LazyLock<Vec<u8>> = LazyLock::new(compute);

/// Forces construction of the bitbase.
///
/// Probes build it on demand anyway; calling this at startup just keeps
/// the cost out of the first search.
pub fn init() {
    LazyLock::force(&BITBASE);
}

/// Returns `true` if the strong side (the one with the pawn) wins.
///
/// `stm` is the side to move. The position is normalized internally, so
/// the caller may pass any legal KPK material arrangement.
pub fn probe(strong: Color, stm: Color, strong_king: Square, pawn: Square, weak_king: Square) -> bool {
    let (stm, wk, psq, bk) = normalize(strong, stm, strong_king, pawn, weak_king);
    BITBASE[index(stm, wk, psq, bk)] == WIN
}

/// Maps the position onto the table's canonical frame: the strong side
/// becomes White, and the pawn is mirrored onto files a through d.
fn normalize(
    strong: Color,
    stm: Color,
    strong_king: Square,
    pawn: Square,
    weak_king: Square,
) -> (Color, Square, Square, Square) {
    let (mut wk, mut psq, mut bk) = (strong_king, pawn, weak_king);

    if strong == Color::Black {
        wk = wk.flipped_rank();
        psq = psq.flipped_rank();
        bk = bk.flipped_rank();
    }

    if psq.file() > File::D {
        wk = wk.flipped_file();
        psq = psq.flipped_file();
        bk = bk.flipped_file();
    }

    let stm = if stm == strong {
        Color::White
    } else {
        Color::Black
    };
    (stm, wk, psq, bk)
}

/// The table index of a normalized position.
#[inline(always)]
fn index(stm: Color, wk: Square, psq: Square, bk: Square) -> usize {
    debug_assert!(psq.file() <= File::D);
    debug_assert!(psq.rank() >= Rank::TWO && psq.rank() <= Rank::SEVEN);

    let pawn = psq.file().index() + 4 * (psq.rank().index() - 1);
    wk.index() + 64 * bk.index() + 4096 * stm.index() + 8192 * pawn
}

/// The inverse of [`index`].
fn unpack(idx: usize) -> (Color, Square, Square, Square) {
    let wk = Square::from_index_unchecked(idx & 63);
    let bk = Square::from_index_unchecked((idx >> 6) & 63);
    let stm = if (idx >> 12) & 1 == 0 {
        Color::White
    } else {
        Color::Black
    };
    let pawn = idx >> 13;
    let psq = Square::new(File((pawn & 3) as u8), Rank((pawn / 4 + 1) as u8));
    (stm, wk, psq, bk)
}

/// Seeds every entry with its immediate result, then grows the won and
/// drawn sets until nothing changes.
fn compute() -> Vec<u8> {
    let mut db: Vec<u8> = (0..ENTRIES).map(|idx| classify_leaf(unpack(idx))).collect();

    // Iterate to the fixed point
    let mut changed = true;
    while changed {
        changed = false;
        for idx in 0..ENTRIES {
            if db[idx] == UNKNOWN {
                let result = classify(&db, unpack(idx));
                if result != UNKNOWN {
                    db[idx] = result;
                    changed = true;
                }
            }
        }
    }

    db
}

/// The immediate classification of a position, before any search: invalid,
/// won by promotion, drawn by stalemate or pawn capture, or unknown.
fn classify_leaf((stm, wk, psq, bk): (Color, Square, Square, Square)) -> u8 {
    // Overlapping or touching kings, a king on the pawn's square, or the
    // weak king already capturable
    if wk == bk
        || wk == psq
        || bk == psq
        || attacks::king_attacks(wk).contains(bk)
        || (stm == Color::White && attacks::pawn_attacks(psq, Color::White).contains(bk))
    {
        return INVALID;
    }

    if stm == Color::White {
        // Promotion next move, with the promotion square free and safe
        if psq.rank() == Rank::SEVEN {
            let promote = psq.forward_by(Color::White, 1).unwrap();
            if wk != promote
                && (bk.distance(promote) > 1 || attacks::king_attacks(wk).contains(promote))
            {
                return WIN;
            }
        }
    } else {
        let escape =
            attacks::king_attacks(bk) & !(attacks::king_attacks(wk) | attacks::pawn_attacks(psq, Color::White));

        // Stalemate
        if escape.is_empty() {
            return DRAW;
        }

        // The pawn can be captured safely
        if attacks::king_attacks(bk).contains(psq) && !attacks::king_attacks(wk).contains(psq) {
            return DRAW;
        }
    }

    UNKNOWN
}

/// Classifies a non-leaf position from its successors: White needs one
/// winning move, Black needs one drawing move, and an undecided successor
/// keeps the position undecided.
fn classify(db: &[u8], (stm, wk, psq, bk): (Color, Square, Square, Square)) -> u8 {
    let mut results = INVALID;

    if stm == Color::White {
        for to in attacks::king_attacks(wk) {
            results |= lookup(db, Color::Black, to, psq, bk);
        }

        if psq.rank() < Rank::SEVEN {
            let push = psq.forward_by(Color::White, 1).unwrap();
            results |= lookup(db, Color::Black, wk, push, bk);

            // Double push, with the transit square empty
            if psq.rank() == Rank::TWO && push != wk && push != bk {
                let push = psq.forward_by(Color::White, 2).unwrap();
                results |= lookup(db, Color::Black, wk, push, bk);
            }
        }

        if results & WIN != 0 {
            WIN
        } else if results & UNKNOWN != 0 {
            UNKNOWN
        } else {
            DRAW
        }
    } else {
        for to in attacks::king_attacks(bk) {
            results |= lookup(db, Color::White, wk, psq, to);
        }

        if results & DRAW != 0 {
            DRAW
        } else if results & UNKNOWN != 0 {
            UNKNOWN
        } else {
            WIN
        }
    }
}

/// A successor lookup; invalid successors (captured kings, occupied
/// squares) contribute nothing.
#[inline(always)]
fn lookup(db: &[u8], stm: Color, wk: Square, psq: Square, bk: Square) -> u8 {
    db[index(stm, wk, psq, bk)]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_king_in_front_on_sixth_wins() {
        // Ke6 + Pe5 vs Ke8 is won no matter who moves
        assert!(probe(Color::White, Color::White, Square::E6, Square::E5, Square::E8));
        assert!(probe(Color::White, Color::Black, Square::E6, Square::E5, Square::E8));
    }

    #[test]
    fn test_rook_pawn_with_cornered_defender_draws() {
        // Kg6 + Ph5 vs Kh8: the defender holds the corner
        assert!(!probe(Color::White, Color::White, Square::G6, Square::H5, Square::H8));
        assert!(!probe(Color::White, Color::Black, Square::G6, Square::H5, Square::H8));
    }

    #[test]
    fn test_unreachable_pawn_promotes() {
        // The defender is hopelessly far away
        assert!(probe(Color::White, Color::White, Square::B3, Square::C6, Square::H8));
    }

    #[test]
    fn test_normalization_flips_colors() {
        // The mirror image of a won position is equally won for Black
        assert!(probe(Color::Black, Color::Black, Square::E3, Square::E4, Square::E1));
        assert!(probe(Color::Black, Color::White, Square::E3, Square::E4, Square::E1));
    }
}
