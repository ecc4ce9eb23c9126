/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use super::{CastlingRights, Color, File, Piece, PieceKind, Square, XoShiRo};

/// Random keys for every (piece, square) pair, en passant file, castling
/// right, and the side to move.
///
/// Generated at compile time from the library's seeded PRNG, so keys are
/// identical across builds.
const ZOBRIST_TABLE: ZobristTable = ZobristTable::new();

/// The incrementally-maintained Zobrist hash of a position.
///
/// Five sub-keys are kept separately and XOR'd together on demand: one for
/// non-pawn pieces, one for pawns (so a pawn-structure cache can key off it
/// alone), and one each for castling rights, the en passant file, and the
/// side to move.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ZobristHash {
    piece_key: u64,
    pawn_key: u64,
    castling_key: u64,
    enpassant_key: u64,
    color_key: u64,
}

impl ZobristHash {
    /// A hash with every sub-key zeroed, as for an empty board.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            piece_key: 0,
            pawn_key: 0,
            castling_key: 0,
            enpassant_key: 0,
            color_key: 0,
        }
    }

    /// The composite 64-bit key: the XOR of all five sub-keys.
    #[inline(always)]
    pub const fn key(&self) -> u64 {
        self.piece_key ^ self.pawn_key ^ self.castling_key ^ self.enpassant_key ^ self.color_key
    }

    /// The pawns-only sub-key.
    #[inline(always)]
    pub const fn pawn_key(&self) -> u64 {
        self.pawn_key
    }

    /// The en passant sub-key. Zero whenever no en passant file is hashed.
    #[inline(always)]
    pub const fn enpassant_key(&self) -> u64 {
        self.enpassant_key
    }

    /// Adds/removes `piece` at `square`.
    ///
    /// Pawns are tracked in their own sub-key; every other kind shares the
    /// piece sub-key.
    #[inline(always)]
    pub fn toggle_piece(&mut self, piece: Piece, square: Square) {
        let key = ZOBRIST_TABLE.piece_keys[square.index()][piece.index()];
        if matches!(piece.kind(), PieceKind::Pawn) {
            self.pawn_key ^= key;
        } else {
            self.piece_key ^= key;
        }
    }

    /// Moves `piece` from `from` to `to`: un-hashes the one, hashes the other.
    #[inline(always)]
    pub fn move_piece(&mut self, piece: Piece, from: Square, to: Square) {
        self.toggle_piece(piece, from);
        self.toggle_piece(piece, to);
    }

    /// Toggles the side to move.
    #[inline(always)]
    pub fn flip_side(&mut self) {
        self.color_key ^= ZOBRIST_TABLE.turn_key;
    }

    /// Sets the side-to-move sub-key outright. White carries the turn key.
    #[inline(always)]
    pub fn set_side_to_move(&mut self, color: Color) {
        self.color_key = match color {
            Color::White => ZOBRIST_TABLE.turn_key,
            Color::Black => 0,
        };
    }

    /// Replaces the castling sub-key with one for `rights`.
    ///
    /// Each of the four rights carries its own key; the sub-key is the XOR
    /// of the keys of the rights currently held.
    #[inline(always)]
    pub fn set_castling(&mut self, rights: CastlingRights) {
        let mut key = 0;
        if rights.white_short() {
            key ^= ZOBRIST_TABLE.castling_keys[0];
        }
        if rights.white_long() {
            key ^= ZOBRIST_TABLE.castling_keys[1];
        }
        if rights.black_short() {
            key ^= ZOBRIST_TABLE.castling_keys[2];
        }
        if rights.black_long() {
            key ^= ZOBRIST_TABLE.castling_keys[3];
        }
        self.castling_key = key;
    }

    /// Sets the en passant sub-key to the key of `file`.
    #[inline(always)]
    pub fn set_enpassant(&mut self, file: File) {
        self.enpassant_key = ZOBRIST_TABLE.ep_keys[file.index()];
    }

    /// Clears the en passant sub-key.
    #[inline(always)]
    pub fn clear_enpassant(&mut self) {
        self.enpassant_key = 0;
    }
}

impl fmt::Display for ZobristHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.key())
    }
}

/// The raw key material behind [`ZobristHash`].
struct ZobristTable {
    /// One unique key for every piece on every square.
    piece_keys: [[u64; Piece::COUNT]; Square::COUNT],

    /// One unique key for each possible en passant file.
    ep_keys: [u64; File::COUNT],

    /// One unique key for each of the four castling rights.
    castling_keys: [u64; 4],

    /// The key carried by the side to move (White, by convention).
    turn_key: u64,
}

impl ZobristTable {
    /// Draws every key from the seeded [`XoShiRo`] generator, at compile time.
    const fn new() -> Self {
        let mut piece_keys = [[0; Piece::COUNT]; Square::COUNT];
        let mut ep_keys = [0; File::COUNT];
        let mut castling_keys = [0; 4];

        let mut prng = XoShiRo::new();

        let mut i = 0;
        while i < Square::COUNT {
            let mut j = 0;
            while j < Piece::COUNT {
                let key;
                (key, prng) = prng.get_next_const();
                piece_keys[i][j] = key;
                j += 1;
            }
            i += 1;
        }

        i = 0;
        while i < File::COUNT {
            let key;
            (key, prng) = prng.get_next_const();
            ep_keys[i] = key;
            i += 1;
        }

        i = 0;
        while i < 4 {
            let key;
            (key, prng) = prng.get_next_const();
            castling_keys[i] = key;
            i += 1;
        }

        let (turn_key, _) = prng.get_next_const();

        Self {
            piece_keys,
            ep_keys,
            castling_keys,
            turn_key,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_toggle_is_involution() {
        let mut hash = ZobristHash::new();
        hash.toggle_piece(Piece::BLACK_ROOK, Square::D7);
        assert_ne!(hash.key(), 0);
        hash.toggle_piece(Piece::BLACK_ROOK, Square::D7);
        assert_eq!(hash.key(), 0);
    }

    #[test]
    fn test_pawns_hash_into_their_own_subkey() {
        let mut hash = ZobristHash::new();
        hash.toggle_piece(Piece::WHITE_PAWN, Square::E2);
        assert_ne!(hash.pawn_key(), 0);

        let mut other = ZobristHash::new();
        other.toggle_piece(Piece::WHITE_KNIGHT, Square::E2);
        assert_eq!(other.pawn_key(), 0);
        assert_ne!(other.key(), 0);
    }

    #[test]
    fn test_move_piece_matches_two_toggles() {
        let mut moved = ZobristHash::new();
        moved.toggle_piece(Piece::WHITE_QUEEN, Square::D1);
        moved.move_piece(Piece::WHITE_QUEEN, Square::D1, Square::H5);

        let mut placed = ZobristHash::new();
        placed.toggle_piece(Piece::WHITE_QUEEN, Square::H5);
        assert_eq!(moved, placed);
    }

    #[test]
    fn test_flip_side_is_involution() {
        let mut hash = ZobristHash::new();
        let initial = hash.key();
        hash.flip_side();
        assert_ne!(hash.key(), initial);
        hash.flip_side();
        assert_eq!(hash.key(), initial);
    }
}
