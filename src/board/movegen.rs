/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{attacks, File, Move, MoveKind, MoveList, PieceKind, Position, Rank, Square};

/// Generates all legal moves for the side to move.
///
/// Generation is pseudo-legal per piece, followed by a legality filter that
/// plays each candidate on `position` and rejects those leaving the mover's
/// King in check. The position is unchanged when this returns.
pub fn generate_moves(position: &mut Position) -> MoveList {
    let us = position.side_to_move();
    let mut moves = MoveList::new();

    for mv in generate_pseudo_legal(position) {
        let info = position.do_move(mv);
        if !position.is_in_check(us) {
            moves.push(mv);
        }
        position.undo_move(mv, info);
    }

    moves
}

/// Generates the quiescence candidates for the side to move: captures,
/// en passant, promotions, and moves that give check. All returned moves
/// are legal.
pub fn generate_quiescence_moves(position: &mut Position) -> MoveList {
    let us = position.side_to_move();
    let mut moves = MoveList::new();

    for mv in generate_pseudo_legal(position) {
        let tactical =
            mv.is_capture() || mv.promotion().is_some() || position.gives_check(mv);
        if !tactical {
            continue;
        }

        let info = position.do_move(mv);
        if !position.is_in_check(us) {
            moves.push(mv);
        }
        position.undo_move(mv, info);
    }

    moves
}

/// Generates pseudo-legal moves: consistent with the board, but possibly
/// leaving the mover's King in check.
fn generate_pseudo_legal(position: &Position) -> MoveList {
    let mut moves = MoveList::new();
    let us = position.side_to_move();
    let them = us.opponent();
    let blockers = position.occupied();

    // The enemy King is never a target; a position where he could be
    // captured is already illegal.
    let targets = !position.color(us) ^ position.king(them);

    // Pawns first
    let ep_bb = position
        .ep_square()
        .map(|sq| sq.bitboard())
        .unwrap_or_default();
    for from in position.pawns(us) {
        let attacks = attacks::pawn_attacks(from, us)
            & ((position.color(them) ^ position.king(them)) | ep_bb);

        // A double push requires both squares in front to be empty
        let all_but_this_pawn = blockers ^ from.bitboard();
        let push_blockers = all_but_this_pawn | all_but_this_pawn.forward_by_one(us);
        let pushes = attacks::pawn_pushes(from, us) & !push_blockers;

        for to in attacks | pushes {
            let captures = position.piece_at(to).is_some();

            if to.rank() == Rank::eighth(us) {
                for promotion in [
                    PieceKind::Knight,
                    PieceKind::Bishop,
                    PieceKind::Rook,
                    PieceKind::Queen,
                ] {
                    let kind = if captures {
                        MoveKind::promotion_capture(promotion)
                    } else {
                        MoveKind::promotion(promotion)
                    };
                    moves.push(Move::new(from, to, kind));
                }
                continue;
            }

            let kind = if captures {
                MoveKind::Capture
            } else if Some(to) == position.ep_square() {
                MoveKind::EnPassantCapture
            } else if from.distance_ranks(to) == 2 {
                MoveKind::PawnDoublePush
            } else {
                MoveKind::Quiet
            };
            moves.push(Move::new(from, to, kind));
        }
    }

    // Knights, sliders, and the King share the same serialization
    for kind in [
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ] {
        for from in position.pieces(us, kind) {
            let reachable = match kind {
                PieceKind::Knight => attacks::knight_attacks(from),
                PieceKind::Bishop => attacks::bishop_attacks(from, blockers),
                PieceKind::Rook => attacks::rook_attacks(from, blockers),
                PieceKind::Queen => attacks::queen_attacks(from, blockers),
                _ => attacks::king_attacks(from),
            } & targets;

            for to in reachable {
                let kind = if position.piece_at(to).is_some() {
                    MoveKind::Capture
                } else {
                    MoveKind::Quiet
                };
                moves.push(Move::new(from, to, kind));
            }
        }
    }

    generate_castling(position, &mut moves);

    moves
}

/// Appends the legal castling moves.
///
/// Castling requires the right to still be held, the squares between King
/// and Rook to be empty, and the King's start, transit, and destination
/// squares to be unattacked. All of that is enforced here, so a generated
/// castle never needs further legality checks.
fn generate_castling(position: &Position, moves: &mut MoveList) {
    let us = position.side_to_move();
    let them = us.opponent();
    let rank = Rank::first(us);
    let occupied = position.occupied();

    let empty = |file| !occupied.contains(Square::new(file, rank));
    let safe = |file| !position.is_attacked_by(Square::new(file, rank), them);

    if position.castling_rights().has(us, true)
        && empty(File::F)
        && empty(File::G)
        && safe(File::E)
        && safe(File::F)
        && safe(File::G)
    {
        moves.push(Move::castle(us, true));
    }

    if position.castling_rights().has(us, false)
        && empty(File::B)
        && empty(File::C)
        && empty(File::D)
        && safe(File::E)
        && safe(File::D)
        && safe(File::C)
    {
        moves.push(Move::castle(us, false));
    }
}

/// Counts the leaf nodes of the move-generation tree `depth` plies deep.
pub fn perft(position: &mut Position, depth: usize) -> u64 {
    if depth == 0 {
        return 1;
    }

    let moves = generate_moves(position);

    // The last ply needs no making of moves, only counting them
    if depth == 1 {
        return moves.len() as u64;
    }

    let mut nodes = 0;
    for mv in moves {
        let info = position.do_move(mv);
        nodes += perft(position, depth - 1);
        position.undo_move(mv, info);
    }

    nodes
}

/// Like [`perft`], but prints the node count beneath every root move.
pub fn splitperft(position: &mut Position, depth: usize) -> u64 {
    let mut nodes = 0;

    for mv in generate_moves(position) {
        let info = position.do_move(mv);
        let count = if depth > 1 {
            perft(position, depth - 1)
        } else {
            1
        };
        position.undo_move(mv, info);

        println!("{mv}\t{count}");
        nodes += count;
    }

    println!("\n{nodes}");
    nodes
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Color, FEN_KIWIPETE, FEN_STARTPOS};

    fn legal_moves(fen: &str) -> MoveList {
        let mut pos = Position::from_fen(fen).unwrap();
        generate_moves(&mut pos)
    }

    /// Can `piece` mechanically travel from `from` to `to` on this board?
    ///
    /// A deliberately slow re-derivation of the movement rules, independent
    /// of the generator, used as its reference.
    fn mechanically_reachable(pos: &Position, from: Square, to: Square) -> bool {
        let piece = pos.piece_at(from).unwrap();
        let us = piece.color();
        let them = us.opponent();
        let occupied = pos.occupied();

        match piece.kind() {
            PieceKind::Pawn => {
                let ep_bb = pos
                    .ep_square()
                    .map(|sq| sq.bitboard())
                    .unwrap_or_default();
                if attacks::pawn_attacks(from, us)
                    .and(pos.color(them).xor(pos.king(them)).or(ep_bb))
                    .contains(to)
                {
                    return true;
                }
                // Single push
                if from.forward_by(us, 1) == Some(to) && !occupied.contains(to) {
                    return true;
                }
                // Double push from the home rank
                from.rank() == Rank::second(us)
                    && from.forward_by(us, 2) == Some(to)
                    && !occupied.contains(from.forward_by(us, 1).unwrap())
                    && !occupied.contains(to)
            }
            PieceKind::King if from.distance_files(to) == 2 && from.rank() == to.rank() => {
                // Castling
                let short = to.file() > from.file();
                let rank = Rank::first(us);
                if from != Square::new(File::E, rank) || !pos.castling_rights().has(us, short) {
                    return false;
                }
                let (empties, safes): (&[File], &[File]) = if short {
                    (&[File::F, File::G], &[File::E, File::F, File::G])
                } else {
                    (&[File::B, File::C, File::D], &[File::E, File::D, File::C])
                };
                empties.iter().all(|&f| !occupied.contains(Square::new(f, rank)))
                    && safes
                        .iter()
                        .all(|&f| !pos.is_attacked_by(Square::new(f, rank), them))
            }
            _ => {
                let reachable = attacks::attacks_for(piece, from, occupied)
                    & !pos.color(us)
                    & !pos.king(them);
                reachable.contains(to)
            }
        }
    }

    /// The generator must produce exactly the moves that a slow 64x64x5
    /// candidate enumeration accepts.
    fn assert_matches_reference(fen: &str) {
        let mut pos = Position::from_fen(fen).unwrap();
        let us = pos.side_to_move();

        let mut generated: Vec<String> =
            generate_moves(&mut pos).iter().map(|mv| mv.to_uci()).collect();
        generated.sort();

        let mut reference = Vec::new();
        for from in Square::iter() {
            if pos.piece_at(from).map(|p| p.color()) != Some(us) {
                continue;
            }

            for to in Square::iter() {
                if from == to
                    || pos.piece_at(to).is_some_and(|p| p.color() == us)
                    || !mechanically_reachable(&pos, from, to)
                {
                    continue;
                }

                let is_promotion = pos.piece_at(from).unwrap().is_pawn()
                    && to.rank() == Rank::eighth(us);
                let candidates: Vec<String> = if is_promotion {
                    "nbrq".chars().map(|p| format!("{from}{to}{p}")).collect()
                } else {
                    vec![format!("{from}{to}")]
                };

                for uci in candidates {
                    let mv = Move::from_uci(&pos, &uci).unwrap();
                    let info = pos.do_move(mv);
                    if !pos.is_in_check(us) {
                        reference.push(uci);
                    }
                    pos.undo_move(mv, info);
                }
            }
        }
        reference.sort();

        assert_eq!(generated, reference, "move sets differ on {fen}");
    }

    #[test]
    fn test_startpos_move_count() {
        assert_eq!(legal_moves(FEN_STARTPOS).len(), 20);
    }

    #[test]
    fn test_kiwipete_move_count() {
        assert_eq!(legal_moves(FEN_KIWIPETE).len(), 48);
    }

    #[test]
    fn test_generator_against_reference() {
        assert_matches_reference(FEN_STARTPOS);
        assert_matches_reference(FEN_KIWIPETE);
        assert_matches_reference("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1");
        assert_matches_reference("n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1");
    }

    #[test]
    fn test_pinned_ep_capture_is_illegal() {
        // After c7c5, capturing en passant with the b5 pawn would clear the
        // fifth rank and expose the King on a5 to the rook on h5
        let mut pos =
            Position::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 b - - 0 1").unwrap();
        let mv = Move::from_uci(&pos, "c7c5").unwrap();
        pos.do_move(mv);
        assert_eq!(pos.ep_square(), Some(Square::C6));

        let replies = generate_moves(&mut pos);
        assert!(!replies.is_empty());
        assert!(!replies.iter().any(|mv| mv.is_en_passant()));
    }

    #[test]
    fn test_castling_through_check_is_illegal() {
        // The f1 square is covered by the rook on f8
        let moves = legal_moves("5r2/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        assert!(!moves.iter().any(|mv| mv.is_short_castle()));
        assert!(moves.iter().any(|mv| mv.is_long_castle()));
    }

    #[test]
    fn test_castling_out_of_check_is_illegal() {
        let moves = legal_moves("4r3/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        assert!(!moves.iter().any(|mv| mv.is_castle()));
    }

    #[test]
    fn test_castling_with_blocked_path_is_illegal() {
        // Long castling is blocked on b1; the b1 square being attacked
        // would not matter, but occupation does
        let moves = legal_moves("4k3/8/8/8/8/8/8/RN2K2R w KQ - 0 1");
        assert!(moves.iter().any(|mv| mv.is_short_castle()));
        assert!(!moves.iter().any(|mv| mv.is_long_castle()));
    }

    #[test]
    fn test_evasions_only_while_in_check() {
        let mut pos = Position::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").unwrap();
        assert!(pos.is_in_check(Color::White));
        for mv in generate_moves(&mut pos) {
            let info = pos.do_move(mv);
            assert!(!pos.is_in_check(Color::White));
            pos.undo_move(mv, info);
        }
    }

    #[test]
    fn test_quiescence_candidates_are_tactical() {
        let mut pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        let quiescence = generate_quiescence_moves(&mut pos);
        assert!(!quiescence.is_empty());

        for &mv in &quiescence {
            let tactical =
                mv.is_capture() || mv.promotion().is_some() || pos.gives_check(mv);
            assert!(tactical, "{mv} is not a quiescence candidate");
        }

        // And they are a subset of the legal moves
        let legal = generate_moves(&mut pos);
        for mv in quiescence {
            assert!(legal.contains(&mv));
        }
    }

    #[test]
    fn test_uci_round_trip() {
        for fen in [
            FEN_STARTPOS,
            FEN_KIWIPETE,
            "n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1",
            "r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1",
        ] {
            let mut pos = Position::from_fen(fen).unwrap();
            for mv in generate_moves(&mut pos) {
                let parsed = Move::from_uci(&pos, &mv.to_uci()).unwrap();
                assert_eq!(parsed, mv, "UCI round-trip failed for {mv} on {fen}");
            }
        }
    }

    #[test]
    fn test_perft_shallow() {
        let mut pos = Position::default();
        assert_eq!(perft(&mut pos, 1), 20);
        assert_eq!(perft(&mut pos, 2), 400);
        assert_eq!(perft(&mut pos, 3), 8_902);
    }
}
