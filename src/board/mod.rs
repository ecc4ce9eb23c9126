/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Attack tables for every piece, magic bitboards included.
pub mod attacks;

/// Sets of squares as 64-bit words.
mod bitboard;

/// Legal and quiescence move generation, and perft.
pub mod movegen;

/// Moves, their 16-bit encoding, and the undo record.
mod moves;

/// Colors, piece kinds, and pieces.
mod piece;

/// The Polyglot opening-book position key.
pub mod polyglot;

/// The board state itself: make/unmake, draws, and exchange evaluation.
mod position;

/// The library's deterministic pseudo-random number generator.
mod prng;

/// Standard Algebraic Notation.
pub mod san;

/// Squares, files, and ranks.
mod square;

/// The incremental position hash.
mod zobrist;

pub use bitboard::{Bitboard, BitboardIter, BitboardSubsetIter};
pub use movegen::{generate_moves, generate_quiescence_moves, perft, splitperft};
pub use moves::{Move, MoveInfo, MoveKind, MoveList, MAX_NUM_MOVES};
pub use piece::{Color, Piece, PieceKind};
pub use position::{CastlingRights, MaterialKey, Position};
pub use prng::XoShiRo;
pub use square::{File, Rank, Square};
pub use zobrist::ZobristHash;

/// FEN string for the starting position of chess.
pub const FEN_STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A popular FEN string for debugging move generation.
pub const FEN_KIWIPETE: &str =
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
