/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use sable::{perft, Position, FEN_KIWIPETE, FEN_STARTPOS};

fn test_perft_fen_nodes(depth: usize, fen: &str, expected: u64) {
    let mut position = Position::from_fen(fen).unwrap();
    let nodes = perft(&mut position, depth);
    assert_eq!(nodes, expected, "perft({depth}) failed on {fen}");
}

mod startpos_perft {
    use super::*;

    #[test]
    fn test_startpos_perft_1() {
        test_perft_fen_nodes(1, FEN_STARTPOS, 20);
    }
    #[test]
    fn test_startpos_perft_2() {
        test_perft_fen_nodes(2, FEN_STARTPOS, 400);
    }
    #[test]
    fn test_startpos_perft_3() {
        test_perft_fen_nodes(3, FEN_STARTPOS, 8_902);
    }
    #[test]
    fn test_startpos_perft_4() {
        test_perft_fen_nodes(4, FEN_STARTPOS, 197_281);
    }
    #[test]
    fn test_startpos_perft_5() {
        test_perft_fen_nodes(5, FEN_STARTPOS, 4_865_609);
    }
    #[test]
    #[ignore = "several minutes without optimizations"]
    fn test_startpos_perft_6() {
        test_perft_fen_nodes(6, FEN_STARTPOS, 119_060_324);
    }
}

mod kiwipete_perft {
    use super::*;

    #[test]
    fn test_kiwipete_perft_1() {
        test_perft_fen_nodes(1, FEN_KIWIPETE, 48);
    }
    #[test]
    fn test_kiwipete_perft_2() {
        test_perft_fen_nodes(2, FEN_KIWIPETE, 2_039);
    }
    #[test]
    fn test_kiwipete_perft_3() {
        test_perft_fen_nodes(3, FEN_KIWIPETE, 97_862);
    }
    #[test]
    fn test_kiwipete_perft_4() {
        test_perft_fen_nodes(4, FEN_KIWIPETE, 4_085_603);
    }
}

mod endgame_perft {
    use super::*;

    /// An endgame with plenty of en passant and pin trickery.
    const FEN: &str = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";

    #[test]
    fn test_endgame_perft_1() {
        test_perft_fen_nodes(1, FEN, 14);
    }
    #[test]
    fn test_endgame_perft_2() {
        test_perft_fen_nodes(2, FEN, 191);
    }
    #[test]
    fn test_endgame_perft_3() {
        test_perft_fen_nodes(3, FEN, 2_812);
    }
    #[test]
    fn test_endgame_perft_4() {
        test_perft_fen_nodes(4, FEN, 43_238);
    }
    #[test]
    fn test_endgame_perft_5() {
        test_perft_fen_nodes(5, FEN, 674_624);
    }
}

mod promotion_perft {
    use super::*;

    /// A sample test position for discovering promotion bugs.
    const FEN: &str = "n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1";

    #[test]
    fn test_promotion_perft_1() {
        test_perft_fen_nodes(1, FEN, 24);
    }
    #[test]
    fn test_promotion_perft_2() {
        test_perft_fen_nodes(2, FEN, 496);
    }
    #[test]
    fn test_promotion_perft_3() {
        test_perft_fen_nodes(3, FEN, 9_483);
    }
    #[test]
    fn test_promotion_perft_4() {
        test_perft_fen_nodes(4, FEN, 182_838);
    }
    #[test]
    fn test_promotion_perft_5() {
        test_perft_fen_nodes(5, FEN, 3_605_103);
    }
}

mod castling_perft {
    use super::*;

    /// Castling rights under attack from promoted and promoting pieces.
    const FEN: &str = "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1";

    #[test]
    fn test_castling_perft_1() {
        test_perft_fen_nodes(1, FEN, 6);
    }
    #[test]
    fn test_castling_perft_2() {
        test_perft_fen_nodes(2, FEN, 264);
    }
    #[test]
    fn test_castling_perft_3() {
        test_perft_fen_nodes(3, FEN, 9_467);
    }
    #[test]
    fn test_castling_perft_4() {
        test_perft_fen_nodes(4, FEN, 422_333);
    }
}

mod middlegame_perft {
    use super::*;

    /// A busy middlegame with an advanced passed pawn.
    const FEN: &str = "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8";

    #[test]
    fn test_middlegame_perft_1() {
        test_perft_fen_nodes(1, FEN, 44);
    }
    #[test]
    fn test_middlegame_perft_2() {
        test_perft_fen_nodes(2, FEN, 1_486);
    }
    #[test]
    fn test_middlegame_perft_3() {
        test_perft_fen_nodes(3, FEN, 62_379);
    }
    #[test]
    fn test_middlegame_perft_4() {
        test_perft_fen_nodes(4, FEN, 2_103_487);
    }
}

/// Applying and un-applying every move at every node of a perft tree must
/// leave the position untouched, with the hash matching a from-scratch
/// recomputation at every step.
#[test]
fn test_perft_preserves_position() {
    fn walk(position: &mut Position, depth: usize) {
        if depth == 0 {
            return;
        }
        let before = position.clone();
        for mv in sable::generate_moves(position) {
            let info = position.do_move(mv);
            assert_eq!(position.key(), position.rehash());
            walk(position, depth - 1);
            position.undo_move(mv, info);
        }
        assert_eq!(*position, before);
        assert_eq!(position.key(), position.rehash());
    }

    for fen in [FEN_STARTPOS, FEN_KIWIPETE, "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1"] {
        let mut position = Position::from_fen(fen).unwrap();
        walk(&mut position, 3);
    }
}
