/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Specialized scorers for a handful of known endgames.
//!
//! The search consults this registry at its leaves, after the draw checks
//! and before the general evaluator. Entries are keyed by the packed
//! material signature, one per strong side, so a leaf probe is a hash
//! lookup rather than a scan.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::{bitbase, Color, MaterialKey, Piece, PieceKind, Position, Score, Square};

/// Weights to push the weak king to the edges and corners.
#[rustfmt::skip]
const PUSH_TO_EDGE_BONUS: [i32; Square::COUNT] = [
    100, 90, 80, 70, 70, 80, 90, 100,
     90, 60, 50, 40, 40, 50, 60,  90,
     80, 50, 30, 20, 20, 30, 40,  80,
     70, 40, 20, 10, 10, 20, 40,  70,
     70, 40, 20, 10, 10, 20, 40,  70,
     80, 50, 30, 20, 20, 30, 40,  80,
     90, 60, 50, 40, 40, 50, 60,  90,
    100, 90, 80, 70, 70, 80, 90, 100,
];

/// Weights to push the weak king to a corner of the mating bishop's color.
///
/// As written, the push is toward the dark corners (a1, h8); for a
/// light-squared bishop the board is flipped vertically first.
#[rustfmt::skip]
const PUSH_TO_CORNER_BONUS: [i32; Square::COUNT] = [
    100, 90, 80, 70, 70, 60, 50,  40,
     90, 60, 50, 40, 40, 50, 60,  50,
     80, 50, 30, 20, 20, 30, 40,  60,
     70, 40, 20, 10, 10, 20, 40,  70,
     70, 40, 20, 10, 10, 20, 40,  70,
     60, 50, 30, 20, 20, 30, 40,  80,
     50, 60, 50, 40, 40, 50, 60,  90,
     40, 50, 60, 70, 70, 80, 90, 100,
];

/// Weights to draw the two kings together, indexed by their distance.
const PUSH_CLOSE: [i32; 8] = [0, 7, 6, 5, 4, 3, 2, 1];

/// The specialized endgames with their own entries in the registry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum EndgameKind {
    /// King and pawn versus king, decided by the bitbase.
    Kpk,

    /// Bishop and knight mate: drive the king to a corner of the bishop's color.
    Kbnk,
}

/// Material signatures mapped to their scorer and the winning side.
static REGISTRY: LazyLock<HashMap<MaterialKey, (EndgameKind, Color)>> = LazyLock::new(|| {
    let mut registry = HashMap::new();

    let kpk = MaterialKey::from_counts(1, 0, 0, 0, 0, 0, 0, 0, 0, 0);
    registry.insert(kpk, (EndgameKind::Kpk, Color::White));
    registry.insert(kpk.flipped(), (EndgameKind::Kpk, Color::Black));

    let kbnk = MaterialKey::from_counts(0, 1, 1, 0, 0, 0, 0, 0, 0, 0);
    registry.insert(kbnk, (EndgameKind::Kbnk, Color::White));
    registry.insert(kbnk.flipped(), (EndgameKind::Kbnk, Color::Black));

    registry
});

/// Builds the registry and the KPK bitbase.
pub fn init() {
    LazyLock::force(&REGISTRY);
    bitbase::init();
}

/// Scores `position` if its material matches a known endgame.
///
/// Returns `None` when no specialized knowledge applies and the general
/// evaluator should be used instead. Draw detection is the caller's job
/// and is expected to have run already.
pub fn probe(position: &Position) -> Option<Score> {
    let key = position.material_key();

    if let Some(&(kind, strong)) = REGISTRY.get(&key) {
        let score = match kind {
            EndgameKind::Kpk => score_kpk(position, strong),
            EndgameKind::Kbnk => score_kbnk(position, strong),
        };
        return Some(score);
    }

    // Catch-all: one side with a bare king loses to any real material
    for strong in Color::all() {
        if has_bare_king(position, strong.opponent()) && !has_bare_king(position, strong) {
            return Some(score_kxk(position, strong));
        }
    }

    None
}

/// Returns `true` if `color` owns nothing but its king.
fn has_bare_king(position: &Position, color: Color) -> bool {
    position.color(color).population() == 1
}

/// The generic won endgame: count the strong side's material and herd the
/// defending king to the edge, with the attacking king nearby.
fn score_kxk(position: &Position, strong: Color) -> Score {
    use PieceKind::*;

    let strong_king = position.king_square(strong);
    let weak_king = position.king_square(strong.opponent());

    let mut value = 0;
    for (kind, worth) in [(Pawn, 100), (Knight, 300), (Bishop, 300), (Rook, 500), (Queen, 900)] {
        value += worth * position.piece_count(Piece::new(strong, kind)) as i32;
    }
    value += PUSH_TO_EDGE_BONUS[weak_king.index()];
    value += PUSH_CLOSE[strong_king.distance(weak_king) as usize];

    signed(position, strong, capped(Score::KNOWN_WIN + value))
}

/// Bishop and knight versus king: the mate only works in a corner the
/// bishop controls, so the corner push flips with the bishop's color.
fn score_kbnk(position: &Position, strong: Color) -> Score {
    let bishop = position.piece_square(Piece::new(strong, PieceKind::Bishop), 0);
    let weak_king = position.king_square(strong.opponent());

    let corner_square = match bishop.color() {
        Color::White => weak_king.flipped_rank(),
        Color::Black => weak_king,
    };

    let value = PUSH_TO_CORNER_BONUS[corner_square.index()];
    signed(position, strong, capped(Score::KNOWN_WIN + value))
}

/// King and pawn versus king: the bitbase gives the exact result, and won
/// positions are graded by how far the pawn has come.
fn score_kpk(position: &Position, strong: Color) -> Score {
    let strong_king = position.king_square(strong);
    let weak_king = position.king_square(strong.opponent());
    let pawn = position.piece_square(Piece::new(strong, PieceKind::Pawn), 0);

    if !bitbase::probe(strong, position.side_to_move(), strong_king, pawn, weak_king) {
        return Score::DRAW;
    }

    let value = Score::KNOWN_WIN + pawn.rank().relative_to(strong).index() as i32;
    signed(position, strong, value)
}

/// Keeps a won score from wandering into the mate range.
#[inline(always)]
fn capped(score: Score) -> Score {
    score.clamp(-Score::LOWEST_MATE + 1, Score::LOWEST_MATE - 1)
}

/// Orients `score` to the side to move, per the negamax convention.
#[inline(always)]
fn signed(position: &Position, strong: Color, score: Score) -> Score {
    if position.side_to_move() == strong {
        score
    } else {
        -score
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kxk_favors_the_strong_side() {
        let pos = Position::from_fen("8/8/8/3k4/8/3K4/3Q4/8 w - - 0 1").unwrap();
        let score = probe(&pos).unwrap();
        assert!(score > Score::KNOWN_WIN);

        // Same position, defender to move: mirrored sign
        let pos = Position::from_fen("8/8/8/3k4/8/3K4/3Q4/8 b - - 0 1").unwrap();
        let score = probe(&pos).unwrap();
        assert!(score < -Score::KNOWN_WIN);
    }

    #[test]
    fn test_kxk_prefers_cornered_defenders() {
        let centered = Position::from_fen("8/8/8/3k4/8/3K4/3Q4/8 w - - 0 1").unwrap();
        let cornered = Position::from_fen("k7/8/2K5/8/8/8/3Q4/8 w - - 0 1").unwrap();
        assert!(probe(&cornered).unwrap() > probe(&centered).unwrap());
    }

    #[test]
    fn test_kbnk_pushes_toward_the_bishops_corner() {
        // Dark-squared bishop: the a1/h8 corners are mating corners
        let right_corner = Position::from_fen("7k/8/5K2/8/3B4/4N3/8/8 w - - 0 1").unwrap();
        let wrong_corner = Position::from_fen("k7/8/2K5/8/3B4/4N3/8/8 w - - 0 1").unwrap();
        assert!(probe(&right_corner).unwrap() > probe(&wrong_corner).unwrap());
    }

    #[test]
    fn test_kpk_win_is_graded_by_pawn_rank() {
        // Ke6 + Pe5 vs Ke8 is a known win whoever moves
        let pos = Position::from_fen("4k3/8/4K3/4P3/8/8/8/8 w - - 0 1").unwrap();
        assert_eq!(probe(&pos).unwrap(), Score::KNOWN_WIN + 4);

        let pos = Position::from_fen("4k3/8/4K3/4P3/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(probe(&pos).unwrap(), -(Score::KNOWN_WIN + 4));
    }

    #[test]
    fn test_kpk_draw_is_flagged() {
        // Rook pawn with the defender in the corner
        let pos = Position::from_fen("7k/8/6K1/7P/8/8/8/8 w - - 0 1").unwrap();
        assert_eq!(probe(&pos).unwrap(), Score::DRAW);
    }

    #[test]
    fn test_kpk_applies_for_black_too() {
        // Mirror of the won position, Black owning the pawn
        let pos = Position::from_fen("8/8/8/8/4p3/4k3/8/4K3 b - - 0 1").unwrap();
        assert_eq!(probe(&pos).unwrap(), Score::KNOWN_WIN + 4);
    }

    #[test]
    fn test_no_probe_for_general_material() {
        let pos = Position::default();
        assert!(probe(&pos).is_none());

        let pos = Position::from_fen("4k3/4p3/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        assert!(probe(&pos).is_none());
    }
}
