/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Reading and writing moves in [Standard Algebraic Notation](https://en.wikipedia.org/wiki/Algebraic_notation_(chess)).

use anyhow::{anyhow, bail, Result};

use super::{movegen, File, Move, PieceKind, Position, Rank, Square};

/// Formats `mv` in Standard Algebraic Notation on `position`.
///
/// Disambiguation is minimal: the source file is added only when another
/// piece of the same kind could reach the target, and the source rank only
/// when the file does not settle it. Pawn captures always show the source
/// file. A `+` or `#` suffix is appended when the move gives check or mate.
///
/// `mv` must be legal on `position`.
pub fn san(position: &Position, mv: Move) -> String {
    let mut text = san_without_suffix(position, mv);

    let mut next = position.clone();
    next.do_move(mv);
    if next.is_checkmate() {
        text.push('#');
    } else if next.is_in_check(next.side_to_move()) {
        text.push('+');
    }

    text
}

fn san_without_suffix(position: &Position, mv: Move) -> String {
    if mv.is_short_castle() {
        return String::from("O-O");
    }
    if mv.is_long_castle() {
        return String::from("O-O-O");
    }

    let from = mv.from();
    let to = mv.to();
    let moved = position.piece_at(from).expect("SAN of a move with no piece");

    let mut matching: Vec<Move> = movegen::generate_moves(&mut position.clone())
        .into_iter()
        .filter(|other| {
            !other.is_castle()
                && other.to() == to
                && other.promotion() == mv.promotion()
                && position.piece_at(other.from()).is_some_and(|p| p.kind() == moved.kind())
        })
        .collect();

    let mut text = String::with_capacity(7);
    if !moved.is_pawn() {
        text.push(moved.kind().char().to_ascii_uppercase());
    }

    if matching.len() > 1 {
        text.push(from.file().char());
        matching.retain(|other| other.from().file() == from.file());
        if matching.len() > 1 {
            text.push(from.rank().char());
        }
    }

    if mv.is_capture() {
        if moved.is_pawn() && text.is_empty() {
            text.push(from.file().char());
        }
        text.push('x');
    }

    text.push_str(&to.to_uci());

    if let Some(promotion) = mv.promotion() {
        text.push('=');
        text.push(promotion.char().to_ascii_uppercase());
    }

    text
}

/// Parses a move in Standard Algebraic Notation against the legal moves of
/// `position`.
///
/// Accepts `[NBRQK]?[a-h]?[1-8]?x?<target>(=[NBRQ])?[+#]?` and both
/// castling spellings (`O-O`/`0-0`, `O-O-O`/`0-0-0`). Fails unless exactly
/// one legal move matches.
pub fn parse_san(position: &Position, input: &str) -> Result<Move> {
    let legal = movegen::generate_moves(&mut position.clone());
    let s = input.trim().trim_end_matches(['+', '#']);

    if s == "O-O" || s == "0-0" {
        return legal
            .into_iter()
            .find(Move::is_short_castle)
            .ok_or(anyhow!("{input:?} is not legal here"));
    }
    if s == "O-O-O" || s == "0-0-0" {
        return legal
            .into_iter()
            .find(Move::is_long_castle)
            .ok_or(anyhow!("{input:?} is not legal here"));
    }

    // Split off the promotion, with or without the '='
    let (s, promotion) = match s.find('=') {
        Some(i) => {
            let piece = s[i + 1..]
                .chars()
                .next()
                .ok_or(anyhow!("Missing promotion piece in {input:?}"))?;
            (&s[..i], Some(PieceKind::from_uci(piece)?))
        }
        None => match s.chars().last() {
            Some(c) if c.is_ascii_uppercase() && s.len() > 2 => {
                (&s[..s.len() - 1], Some(PieceKind::from_uci(c)?))
            }
            _ => (s, None),
        },
    };

    if matches!(promotion, Some(PieceKind::Pawn) | Some(PieceKind::King)) {
        bail!("Cannot promote to a {} in {input:?}", promotion.unwrap().name());
    }

    // A leading uppercase letter names the moving piece; pawns go unnamed
    let mut chars = s.chars().peekable();
    let kind = match chars.peek() {
        Some(&c) if c.is_ascii_uppercase() => {
            chars.next();
            PieceKind::from_uci(c)?
        }
        Some(_) => PieceKind::Pawn,
        None => bail!("Cannot parse an empty SAN move"),
    };

    let rest: String = chars.filter(|&c| c != 'x').collect();
    if rest.len() < 2 || !rest.is_ascii() {
        bail!("SAN move {input:?} has no target square");
    }

    let target = Square::from_uci(&rest[rest.len() - 2..])?;
    let mut from_file = None;
    let mut from_rank = None;
    for c in rest[..rest.len() - 2].chars() {
        if let Ok(file) = File::from_char(c) {
            from_file = Some(file);
        } else if let Ok(rank) = Rank::from_char(c) {
            from_rank = Some(rank);
        } else {
            bail!("Unexpected {c:?} in SAN move {input:?}");
        }
    }

    let mut matches = legal.into_iter().filter(|mv| {
        !mv.is_castle()
            && mv.to() == target
            && position.piece_at(mv.from()).is_some_and(|p| p.kind() == kind)
            && from_file.is_none_or(|f| mv.from().file() == f)
            && from_rank.is_none_or(|r| mv.from().rank() == r)
            && promotion.is_none_or(|p| mv.promotion() == Some(p))
    });

    let Some(mv) = matches.next() else {
        bail!("{input:?} matches no legal move");
    };
    if matches.next().is_some() {
        bail!("{input:?} is ambiguous");
    }

    Ok(mv)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{FEN_KIWIPETE, FEN_STARTPOS};

    fn roundtrip_all(fen: &str) {
        let mut pos = Position::from_fen(fen).unwrap();
        for mv in movegen::generate_moves(&mut pos) {
            let text = san(&pos, mv);
            let parsed = parse_san(&pos, &text)
                .unwrap_or_else(|e| panic!("failed to re-parse {text:?} on {fen}: {e}"));
            assert_eq!(parsed, mv, "SAN round-trip failed for {text:?} on {fen}");
        }
    }

    #[test]
    fn test_san_round_trip() {
        roundtrip_all(FEN_STARTPOS);
        roundtrip_all(FEN_KIWIPETE);
        roundtrip_all("n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1");
        roundtrip_all("r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1");
        roundtrip_all("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 b - - 0 1");
    }

    #[test]
    fn test_san_basics() {
        let pos = Position::default();
        assert_eq!(san(&pos, Move::from_uci(&pos, "e2e4").unwrap()), "e4");
        assert_eq!(san(&pos, Move::from_uci(&pos, "g1f3").unwrap()), "Nf3");

        assert_eq!(parse_san(&pos, "e4").unwrap(), "e2e4");
        assert_eq!(parse_san(&pos, "Nf3").unwrap(), "g1f3");
    }

    #[test]
    fn test_san_castling() {
        let pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(san(&pos, Move::from_uci(&pos, "e1g1").unwrap()), "O-O");
        assert_eq!(san(&pos, Move::from_uci(&pos, "e1c1").unwrap()), "O-O-O");
        assert_eq!(parse_san(&pos, "O-O").unwrap(), "e1g1");
        assert_eq!(parse_san(&pos, "0-0-0").unwrap(), "e1c1");
    }

    #[test]
    fn test_san_disambiguation() {
        // Two knights can reach d2: file disambiguation suffices
        let pos = Position::from_fen("4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1").unwrap();
        assert_eq!(san(&pos, Move::from_uci(&pos, "b1d2").unwrap()), "Nbd2");
        assert_eq!(san(&pos, Move::from_uci(&pos, "f3d2").unwrap()), "Nfd2");
        assert_eq!(parse_san(&pos, "Nbd2").unwrap(), "b1d2");
        assert!(parse_san(&pos, "Nd2").is_err());

        // Two rooks on the same file: the file alone does not settle it,
        // so the rank is appended as well
        let pos = Position::from_fen("4k3/8/8/1R6/8/8/8/1R2K3 w - - 0 1").unwrap();
        assert_eq!(san(&pos, Move::from_uci(&pos, "b1b3").unwrap()), "Rb1b3");
        assert_eq!(san(&pos, Move::from_uci(&pos, "b5b3").unwrap()), "Rb5b3");
        assert_eq!(parse_san(&pos, "Rb1b3").unwrap(), "b1b3");
        assert!(parse_san(&pos, "Rb3").is_err());
    }

    #[test]
    fn test_san_captures_and_promotions() {
        let pos = Position::from_fen("n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1").unwrap();
        assert_eq!(san(&pos, Move::from_uci(&pos, "g2h1q").unwrap()), "gxh1=Q+");
        assert_eq!(san(&pos, Move::from_uci(&pos, "f2f1n").unwrap()), "f1=N");
        assert_eq!(parse_san(&pos, "gxh1=Q").unwrap(), "g2h1q");
        assert_eq!(parse_san(&pos, "gxh1Q").unwrap(), "g2h1q");

        // En passant is written as a plain pawn capture
        let mut pos =
            Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3p4/2N5/PPPPPPPP/R1BQKBNR w KQkq - 0 3")
                .unwrap();
        pos.do_move(Move::from_uci(&pos, "e2e4").unwrap());
        let ep = Move::from_uci(&pos, "d4e3").unwrap();
        assert!(ep.is_en_passant());
        assert_eq!(san(&pos, ep), "dxe3");
        assert_eq!(parse_san(&pos, "dxe3").unwrap(), ep);
    }

    #[test]
    fn test_san_check_suffixes() {
        let pos = Position::from_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1").unwrap();
        assert_eq!(san(&pos, Move::from_uci(&pos, "a1a8").unwrap()), "Ra8#");

        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        assert_eq!(san(&pos, Move::from_uci(&pos, "a1a8").unwrap()), "Ra8+");
    }

    #[test]
    fn test_parse_san_rejects_nonsense() {
        let pos = Position::default();
        assert!(parse_san(&pos, "").is_err());
        assert!(parse_san(&pos, "Ke2").is_err());
        assert!(parse_san(&pos, "e5").is_err());
        assert!(parse_san(&pos, "O-O").is_err());
        assert!(parse_san(&pos, "xyzzy").is_err());
        assert!(parse_san(&pos, "e8=P").is_err());
    }
}
