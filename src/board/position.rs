/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, Result};
use arrayvec::ArrayVec;

use super::{
    attacks, Bitboard, Color, File, Move, MoveInfo, Piece, PieceKind, Rank, Square, ZobristHash,
    FEN_STARTPOS,
};

/// Most pieces of one kind a single side can ever own (two Rooks plus eight
/// promotions).
const MAX_PIECES_PER_KIND: usize = 10;

/// Piece values used by static exchange evaluation.
///
/// The King's value is large enough that a capture sequence ending in his
/// "capture" can never look profitable for the defender.
const SEE_VALUES: [i32; PieceKind::COUNT] = [100, 320, 330, 500, 900, 20000];

/// The castling rights of both players, as a 4-bit mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const WHITE_SHORT: Self = Self(0b0001);
    pub const WHITE_LONG: Self = Self(0b0010);
    pub const BLACK_SHORT: Self = Self(0b0100);
    pub const BLACK_LONG: Self = Self(0b1000);
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b1111);

    /// Both rights belonging to `color`.
    #[inline(always)]
    pub const fn for_color(color: Color) -> Self {
        match color {
            Color::White => Self(0b0011),
            Color::Black => Self(0b1100),
        }
    }

    /// Returns `true` if White may still castle short.
    #[inline(always)]
    pub const fn white_short(&self) -> bool {
        self.0 & Self::WHITE_SHORT.0 != 0
    }

    /// Returns `true` if White may still castle long.
    #[inline(always)]
    pub const fn white_long(&self) -> bool {
        self.0 & Self::WHITE_LONG.0 != 0
    }

    /// Returns `true` if Black may still castle short.
    #[inline(always)]
    pub const fn black_short(&self) -> bool {
        self.0 & Self::BLACK_SHORT.0 != 0
    }

    /// Returns `true` if Black may still castle long.
    #[inline(always)]
    pub const fn black_long(&self) -> bool {
        self.0 & Self::BLACK_LONG.0 != 0
    }

    /// Returns `true` if `color` may still castle on the side given by `short`.
    #[inline(always)]
    pub const fn has(&self, color: Color, short: bool) -> bool {
        match (color, short) {
            (Color::White, true) => self.white_short(),
            (Color::White, false) => self.white_long(),
            (Color::Black, true) => self.black_short(),
            (Color::Black, false) => self.black_long(),
        }
    }

    /// Returns `true` if no rights remain.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Removes every right in `rights` from `self`.
    #[inline(always)]
    pub fn clear(&mut self, rights: Self) {
        self.0 &= !rights.0;
    }

    /// Parses the castling field of a FEN string.
    pub fn from_fen_field(field: &str) -> Result<Self> {
        let mut rights = Self::NONE;
        if field == "-" {
            return Ok(rights);
        }
        for c in field.chars() {
            match c {
                'K' => rights.0 |= Self::WHITE_SHORT.0,
                'Q' => rights.0 |= Self::WHITE_LONG.0,
                'k' => rights.0 |= Self::BLACK_SHORT.0,
                'q' => rights.0 |= Self::BLACK_LONG.0,
                _ => bail!("Castling rights must be in [K, Q, k, q]. Got {c:?}"),
            }
        }
        Ok(rights)
    }
}

impl fmt::Display for CastlingRights {
    /// Displays these rights as the castling field of a FEN string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        if self.white_short() {
            write!(f, "K")?;
        }
        if self.white_long() {
            write!(f, "Q")?;
        }
        if self.black_short() {
            write!(f, "k")?;
        }
        if self.black_long() {
            write!(f, "q")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// The full state of a game in progress.
///
/// The board is held in several redundant representations that are kept in
/// lockstep: a mailbox of 64 squares, one bitboard per color, one bitboard
/// per piece kind, and a square list per piece. All mutation goes through
/// [`Position::add_piece`], [`Position::remove_piece`], and
/// [`Position::move_piece`], which update every representation and the
/// incremental Zobrist hash together.
///
/// State changes only through [`Position::do_move`] / [`Position::undo_move`]
/// (and the null-move pair), always in matched pairs around any recursion.
#[derive(Clone)]
pub struct Position {
    /// Which piece, if any, sits on each square.
    mailbox: [Option<Piece>; Square::COUNT],

    /// All squares occupied by a specific color.
    colors: [Bitboard; Color::COUNT],

    /// All squares occupied by a specific piece kind.
    kinds: [Bitboard; PieceKind::COUNT],

    /// The squares of every copy of each piece, in no particular order.
    piece_squares: [ArrayVec<Square, MAX_PIECES_PER_KIND>; Piece::COUNT],

    /// The [`Color`] of the current player.
    side_to_move: Color,

    /// Castling rights for both players.
    castling: CastlingRights,

    /// The square a pawn may capture onto en passant, if any.
    ep_square: Option<Square>,

    /// Used to enforce the fifty-move rule.
    ///
    /// Reset when a pawn moves or a piece is captured.
    halfmove: u8,

    /// Number of completed turn pairs, starting at 1.
    fullmove: u16,

    /// The incrementally-maintained hash of the position.
    hash: ZobristHash,

    /// The composite keys of every position reached since this [`Position`]
    /// was created, the current one on top. Scanned for repetitions.
    history: Vec<u64>,
}

impl Position {
    /// Creates an empty [`Position`]: no pieces, White to move, no castling
    /// rights, no en passant square.
    pub fn new() -> Self {
        let mut hash = ZobristHash::new();
        hash.set_side_to_move(Color::White);

        let mut pos = Self {
            mailbox: [None; Square::COUNT],
            colors: [Bitboard::EMPTY_BOARD; Color::COUNT],
            kinds: [Bitboard::EMPTY_BOARD; PieceKind::COUNT],
            piece_squares: Default::default(),
            side_to_move: Color::White,
            castling: CastlingRights::NONE,
            ep_square: None,
            halfmove: 0,
            fullmove: 1,
            hash,
            history: Vec::with_capacity(256),
        };
        pos.history.push(pos.hash.key());
        pos
    }

    /// Creates a new [`Position`] from the provided FEN string.
    pub fn from_fen(fen: &str) -> Result<Self> {
        let mut pos = Self::new();
        let mut split = fen.trim().split(' ');

        let placements = split
            .next()
            .ok_or(anyhow!("FEN string must have piece placements."))?;
        if placements.matches('/').count() != 7 {
            bail!("FEN must have piece placements for all 8 ranks");
        }

        // Ranks arrive 8 down to 1
        for (rank, placements) in placements.split('/').rev().enumerate() {
            let mut file = 0;
            for c in placements.chars() {
                if let Some(empty) = c.to_digit(10) {
                    file += empty as u8;
                } else {
                    let piece = Piece::from_uci(c)?;
                    if file >= 8 {
                        bail!("Rank {} of FEN placements overflows the board", rank + 1);
                    }
                    let square = Square::new(File(file), Rank(rank as u8));
                    pos.add_piece(piece, square);
                    file += 1;
                }
            }
        }

        let active_color = split.next().unwrap_or("w");
        pos.side_to_move = Color::from_str(active_color)?;
        pos.hash.set_side_to_move(pos.side_to_move);

        let castling = split.next().unwrap_or("-");
        pos.castling = CastlingRights::from_fen_field(castling)?;
        pos.hash.set_castling(pos.castling);

        let ep = split.next().unwrap_or("-");
        match ep {
            "-" => {}
            square => pos.set_ep_square(Some(Square::from_uci(square)?)),
        }

        let halfmove = split.next().unwrap_or("0");
        pos.halfmove = halfmove.parse().or(Err(anyhow!(
            "FEN string must have valid halfmove counter. Got {halfmove:?}"
        )))?;

        let fullmove = split.next().unwrap_or("1");
        pos.fullmove = fullmove.parse().or(Err(anyhow!(
            "FEN string must have valid fullmove counter. Got {fullmove:?}"
        )))?;

        pos.history.clear();
        pos.history.push(pos.hash.key());

        Ok(pos)
    }

    /// Creates a new [`Position`] holding only the provided pieces, with
    /// `side_to_move` next to play. No castling rights, no en passant.
    pub fn from_pieces(
        pieces: impl IntoIterator<Item = (Piece, Square)>,
        side_to_move: Color,
    ) -> Self {
        let mut pos = Self::new();
        for (piece, square) in pieces {
            pos.add_piece(piece, square);
        }
        pos.side_to_move = side_to_move;
        pos.hash.set_side_to_move(side_to_move);
        pos.history.clear();
        pos.history.push(pos.hash.key());
        pos
    }

    /// Generates the FEN string of this [`Position`].
    pub fn to_fen(&self) -> String {
        format!("{self}")
    }

    /// Returns the current player as a [`Color`].
    #[inline(always)]
    pub const fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// If en passant can be performed, returns the en passant [`Square`].
    #[inline(always)]
    pub const fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    /// Returns the [`CastlingRights`] of the current position.
    #[inline(always)]
    pub const fn castling_rights(&self) -> CastlingRights {
        self.castling
    }

    /// Returns the half-move clock of the current position.
    #[inline(always)]
    pub const fn halfmove(&self) -> u8 {
        self.halfmove
    }

    /// Returns the full-move counter of the current position.
    #[inline(always)]
    pub const fn fullmove(&self) -> u16 {
        self.fullmove
    }

    /// The composite Zobrist key of this position.
    #[inline(always)]
    pub fn key(&self) -> u64 {
        self.hash.key()
    }

    /// The pawns-only sub-key of this position's hash.
    #[inline(always)]
    pub fn pawn_key(&self) -> u64 {
        self.hash.pawn_key()
    }

    /// The en passant sub-key of this position's hash.
    ///
    /// Zero unless an en passant capture is actually available to the side
    /// to move.
    #[inline(always)]
    pub fn enpassant_key(&self) -> u64 {
        self.hash.enpassant_key()
    }

    /// Number of plies played since this [`Position`] was created or reset.
    #[inline(always)]
    pub fn ply(&self) -> usize {
        self.history.len() - 1
    }

    /// Fetches the [`Piece`] at the provided [`Square`], if there is one.
    #[inline(always)]
    pub const fn piece_at(&self, square: Square) -> Option<Piece> {
        self.mailbox[square.index()]
    }

    /// Fetches a [`Bitboard`] of all occupied squares on the board.
    #[inline(always)]
    pub const fn occupied(&self) -> Bitboard {
        self.colors[0].or(self.colors[1])
    }

    /// Fetches the [`Bitboard`] for all pieces of the given [`Color`].
    #[inline(always)]
    pub const fn color(&self, color: Color) -> Bitboard {
        self.colors[color.index()]
    }

    /// Fetches the [`Bitboard`] for all pieces of the given [`PieceKind`].
    #[inline(always)]
    pub const fn kind(&self, kind: PieceKind) -> Bitboard {
        self.kinds[kind.index()]
    }

    /// Fetches the [`Bitboard`] for the pieces of the given color and kind.
    #[inline(always)]
    pub const fn pieces(&self, color: Color, kind: PieceKind) -> Bitboard {
        self.color(color).and(self.kind(kind))
    }

    /// Fetches the [`Bitboard`] for the Pawns of the provided color.
    #[inline(always)]
    pub const fn pawns(&self, color: Color) -> Bitboard {
        self.pieces(color, PieceKind::Pawn)
    }

    /// Fetches the [`Bitboard`] for the King of the provided color.
    #[inline(always)]
    pub const fn king(&self, color: Color) -> Bitboard {
        self.pieces(color, PieceKind::King)
    }

    /// Fetches a [`Bitboard`] of the diagonal sliders (Bishop, Queen) of `color`.
    #[inline(always)]
    pub fn diagonal_sliders(&self, color: Color) -> Bitboard {
        (self.kind(PieceKind::Bishop) | self.kind(PieceKind::Queen)) & self.color(color)
    }

    /// Fetches a [`Bitboard`] of the orthogonal sliders (Rook, Queen) of `color`.
    #[inline(always)]
    pub fn orthogonal_sliders(&self, color: Color) -> Bitboard {
        (self.kind(PieceKind::Rook) | self.kind(PieceKind::Queen)) & self.color(color)
    }

    /// Number of copies of `piece` on the board.
    #[inline(always)]
    pub fn piece_count(&self, piece: Piece) -> usize {
        self.piece_squares[piece.index()].len()
    }

    /// The square of the `i`th copy of `piece`.
    ///
    /// # Panics
    /// If fewer than `i + 1` copies of `piece` are on the board.
    #[inline(always)]
    pub fn piece_square(&self, piece: Piece, i: usize) -> Square {
        self.piece_squares[piece.index()][i]
    }

    /// The square of `color`'s King.
    ///
    /// # Panics
    /// If `color` has no King, which a legal position never allows.
    #[inline(always)]
    pub fn king_square(&self, color: Color) -> Square {
        self.piece_squares[Piece::new(color, PieceKind::King).index()][0]
    }

    /// Number of non-pawn, non-king pieces `color` owns.
    ///
    /// Consulted by the search before trying a null move.
    #[inline(always)]
    pub fn nonpawn_material(&self, color: Color) -> usize {
        use PieceKind::*;
        [Knight, Bishop, Rook, Queen]
            .into_iter()
            .map(|kind| self.piece_count(Piece::new(color, kind)))
            .sum()
    }

    /// Places `piece` on `square`, updating every representation and the hash.
    ///
    /// One of the three write paths; `square` must be empty.
    pub(crate) fn add_piece(&mut self, piece: Piece, square: Square) {
        debug_assert!(self.mailbox[square.index()].is_none());

        self.mailbox[square.index()] = Some(piece);
        self.colors[piece.color().index()].set(square.bitboard());
        self.kinds[piece.kind().index()].set(square.bitboard());
        self.piece_squares[piece.index()].push(square);

        self.hash.toggle_piece(piece, square);
    }

    /// Removes and returns the piece on `square`, updating every
    /// representation and the hash.
    ///
    /// One of the three write paths; `square` must be occupied.
    pub(crate) fn remove_piece(&mut self, square: Square) -> Piece {
        let piece = self.mailbox[square.index()]
            .take()
            .expect("remove_piece called on an empty square");

        self.colors[piece.color().index()].clear(square.bitboard());
        self.kinds[piece.kind().index()].clear(square.bitboard());

        let list = &mut self.piece_squares[piece.index()];
        let i = list.iter().position(|&s| s == square).unwrap();
        list.swap_remove(i);

        self.hash.toggle_piece(piece, square);
        piece
    }

    /// Moves the piece on `from` to the empty square `to`, updating every
    /// representation and the hash.
    ///
    /// One of the three write paths.
    pub(crate) fn move_piece(&mut self, from: Square, to: Square) {
        debug_assert!(self.mailbox[to.index()].is_none());

        let piece = self.mailbox[from.index()]
            .take()
            .expect("move_piece called on an empty square");
        self.mailbox[to.index()] = Some(piece);

        let change = from.bitboard() | to.bitboard();
        self.colors[piece.color().index()].toggle(change);
        self.kinds[piece.kind().index()].toggle(change);

        let list = &mut self.piece_squares[piece.index()];
        let i = list.iter().position(|&s| s == from).unwrap();
        list[i] = to;

        self.hash.move_piece(piece, from, to);
    }

    /// Sets (or clears) the en passant square, maintaining the hash.
    ///
    /// The en passant sub-key is only added while a pawn of the side to
    /// move actually attacks the target square, matching the rule used by
    /// Polyglot book keys.
    fn set_ep_square(&mut self, square: Option<Square>) {
        debug_assert!(square.is_none_or(|sq| {
            sq.rank() == Rank::THREE || sq.rank() == Rank::SIX
        }));

        self.ep_square = square;
        match square {
            Some(sq) if self.ep_capture_possible(sq) => self.hash.set_enpassant(sq.file()),
            _ => self.hash.clear_enpassant(),
        }
    }

    /// Returns `true` if a pawn of the side to move attacks `ep_square`.
    #[inline(always)]
    fn ep_capture_possible(&self, ep_square: Square) -> bool {
        let us = self.side_to_move;
        (attacks::pawn_attacks(ep_square, us.opponent()) & self.pawns(us)).is_nonempty()
    }

    /// Applies `mv` to the board, returning a [`MoveInfo`] with which
    /// [`Position::undo_move`] can restore the prior state exactly.
    ///
    /// `mv` must be legal; passing anything else breaks the position.
    pub fn do_move(&mut self, mv: Move) -> MoveInfo {
        let us = self.side_to_move;
        let mut info = MoveInfo {
            captured: None,
            castling: self.castling,
            ep_square: self.ep_square,
            was_en_passant: false,
            halfmove: self.halfmove,
        };

        // Hand the turn over first, so the en passant hashing below sees
        // the side that could actually make the capture.
        self.side_to_move = us.opponent();
        self.hash.flip_side();
        self.fullmove += us.is_black() as u16;

        self.ep_square = None;
        self.hash.clear_enpassant();

        if mv.is_castle() {
            self.halfmove = 0;

            let rank = Rank::first(us);
            if mv.is_short_castle() {
                self.move_piece(Square::new(File::E, rank), Square::new(File::G, rank));
                self.move_piece(Square::new(File::H, rank), Square::new(File::F, rank));
            } else {
                self.move_piece(Square::new(File::E, rank), Square::new(File::C, rank));
                self.move_piece(Square::new(File::A, rank), Square::new(File::D, rank));
            }

            self.castling.clear(CastlingRights::for_color(us));
            self.hash.set_castling(self.castling);
        } else {
            let from = mv.from();
            let to = mv.to();
            let piece = self.mailbox[from.index()].expect("no piece to move");

            if mv.is_en_passant() {
                // The captured pawn is behind the target square
                let victim_square = to.backward_by(us, 1).unwrap();
                self.move_piece(from, to);
                self.remove_piece(victim_square);
                info.captured = Some(PieceKind::Pawn);
                info.was_en_passant = true;
                self.halfmove = 0;
            } else {
                let captured = mv.is_capture().then(|| self.remove_piece(to).kind());
                info.captured = captured;

                if piece.is_pawn() || captured.is_some() {
                    self.halfmove = 0;
                } else {
                    self.halfmove += 1;
                }

                if let Some(promotion) = mv.promotion() {
                    self.remove_piece(from);
                    self.add_piece(piece.promoted(promotion), to);
                } else {
                    self.move_piece(from, to);
                }

                // A King move forfeits both rights; a Rook leaving (or an
                // enemy Rook captured on) a home corner forfeits that side's
                self.castling.clear(castling_rights_lost(us, piece.kind(), from));
                if let Some(captured) = captured {
                    self.castling
                        .clear(castling_rights_lost(us.opponent(), captured, to));
                }
                self.hash.set_castling(self.castling);

                if mv.is_pawn_double_push() {
                    self.set_ep_square(from.forward_by(us, 1));
                }
            }
        }

        self.history.push(self.hash.key());
        info
    }

    /// Exactly inverts a [`Position::do_move`] of `mv` that returned `info`.
    ///
    /// Restores every field of the position, including the hash.
    pub fn undo_move(&mut self, mv: Move, info: MoveInfo) {
        self.side_to_move = self.side_to_move.opponent();
        self.hash.flip_side();
        let us = self.side_to_move;

        self.fullmove -= us.is_black() as u16;
        self.halfmove = info.halfmove;

        self.castling = info.castling;
        self.hash.set_castling(self.castling);

        if mv.is_castle() {
            let rank = Rank::first(us);
            if mv.is_short_castle() {
                self.move_piece(Square::new(File::G, rank), Square::new(File::E, rank));
                self.move_piece(Square::new(File::F, rank), Square::new(File::H, rank));
            } else {
                self.move_piece(Square::new(File::C, rank), Square::new(File::E, rank));
                self.move_piece(Square::new(File::D, rank), Square::new(File::A, rank));
            }
        } else {
            let from = mv.from();
            let to = mv.to();

            if info.was_en_passant {
                self.move_piece(to, from);
                let victim_square = to.backward_by(us, 1).unwrap();
                self.add_piece(Piece::new(us.opponent(), PieceKind::Pawn), victim_square);
            } else {
                if mv.promotion().is_some() {
                    self.remove_piece(to);
                    self.add_piece(Piece::new(us, PieceKind::Pawn), from);
                } else {
                    self.move_piece(to, from);
                }

                if let Some(kind) = info.captured {
                    self.add_piece(Piece::new(us.opponent(), kind), to);
                }
            }
        }

        // Restored after the side to move so the capture-possible predicate
        // sees the right pawns
        self.set_ep_square(info.ep_square);

        self.history.pop();
    }

    /// Passes the turn without moving: flips the side to move, clears the
    /// en passant square, and advances the clocks.
    ///
    /// Only ever used by the search's null-move reduction.
    pub fn do_null_move(&mut self) -> MoveInfo {
        let info = MoveInfo {
            captured: None,
            castling: self.castling,
            ep_square: self.ep_square,
            was_en_passant: false,
            halfmove: self.halfmove,
        };

        self.side_to_move = self.side_to_move.opponent();
        self.hash.flip_side();
        self.halfmove += 1;

        self.ep_square = None;
        self.hash.clear_enpassant();

        self.history.push(self.hash.key());
        info
    }

    /// Exactly inverts a [`Position::do_null_move`] that returned `info`.
    pub fn undo_null_move(&mut self, info: MoveInfo) {
        self.side_to_move = self.side_to_move.opponent();
        self.hash.flip_side();
        self.halfmove = info.halfmove;

        self.set_ep_square(info.ep_square);

        self.history.pop();
    }

    /// Returns a [`Bitboard`] of all of `color`'s pieces that attack `square`.
    pub fn square_attackers(&self, square: Square, color: Color) -> Bitboard {
        let blockers = self.occupied();
        let mut attackers = Bitboard::EMPTY_BOARD;

        attackers |= attacks::pawn_attacks(square, color.opponent()) & self.pawns(color);
        attackers |= attacks::knight_attacks(square) & self.pieces(color, PieceKind::Knight);
        attackers |= attacks::bishop_attacks(square, blockers) & self.diagonal_sliders(color);
        attackers |= attacks::rook_attacks(square, blockers) & self.orthogonal_sliders(color);
        attackers |= attacks::king_attacks(square) & self.king(color);

        attackers
    }

    /// Returns `true` if any piece of `color` attacks `square`.
    #[inline(always)]
    pub fn is_attacked_by(&self, square: Square, color: Color) -> bool {
        self.square_attackers(square, color).is_nonempty()
    }

    /// Returns `true` if `color`'s King is currently attacked.
    #[inline(always)]
    pub fn is_in_check(&self, color: Color) -> bool {
        self.is_attacked_by(self.king_square(color), color.opponent())
    }

    /// Returns `true` if the side to move has no legal moves and is in check.
    pub fn is_checkmate(&self) -> bool {
        self.is_in_check(self.side_to_move) && self.has_no_legal_moves()
    }

    /// Returns `true` if the side to move has no legal moves but is *not* in check.
    pub fn is_stalemate(&self) -> bool {
        !self.is_in_check(self.side_to_move) && self.has_no_legal_moves()
    }

    #[inline(always)]
    fn has_no_legal_moves(&self) -> bool {
        super::movegen::generate_moves(&mut self.clone()).is_empty()
    }

    /// Returns `true` if the game is drawn by the fifty-move rule, by
    /// threefold repetition, or by insufficient material.
    #[inline(always)]
    pub fn is_draw(&self) -> bool {
        self.can_draw_by_fifty()
            || self.is_threefold_repetition()
            || self.has_insufficient_material()
    }

    /// Returns `true` if the half-move clock has reached 100 ply.
    #[inline(always)]
    pub const fn can_draw_by_fifty(&self) -> bool {
        self.halfmove >= 100
    }

    /// Returns `true` if the current position has occurred three times.
    ///
    /// This is the strict rule: the count includes the current position,
    /// and two prior occurrences are required.
    pub fn is_threefold_repetition(&self) -> bool {
        let current = self.hash.key();
        let mut count = 1;
        for &key in self.history.iter().rev().skip(1) {
            if key == current {
                count += 1;
                if count == 3 {
                    return true;
                }
            }
        }
        false
    }

    /// Returns `true` if neither side can possibly deliver checkmate.
    ///
    /// The recognized material sets are bare kings, and a lone Knight or
    /// lone Bishop against a bare king.
    pub fn has_insufficient_material(&self) -> bool {
        const DRAWN: [MaterialKey; 5] = [
            MaterialKey::from_counts(0, 0, 0, 0, 0, 0, 0, 0, 0, 0),
            MaterialKey::from_counts(0, 1, 0, 0, 0, 0, 0, 0, 0, 0),
            MaterialKey::from_counts(0, 0, 1, 0, 0, 0, 0, 0, 0, 0),
            MaterialKey::from_counts(0, 0, 0, 0, 0, 0, 1, 0, 0, 0),
            MaterialKey::from_counts(0, 0, 0, 0, 0, 0, 0, 1, 0, 0),
        ];

        DRAWN.contains(&self.material_key())
    }

    /// The packed piece-count signature of this position.
    #[inline(always)]
    pub fn material_key(&self) -> MaterialKey {
        use PieceKind::*;
        let count = |color, kind| self.piece_count(Piece::new(color, kind)) as u64;
        MaterialKey::from_counts(
            count(Color::White, Pawn),
            count(Color::White, Knight),
            count(Color::White, Bishop),
            count(Color::White, Rook),
            count(Color::White, Queen),
            count(Color::Black, Pawn),
            count(Color::Black, Knight),
            count(Color::Black, Bishop),
            count(Color::Black, Rook),
            count(Color::Black, Queen),
        )
    }

    /// Structural sanity check: exactly one King per side, the Kings not
    /// adjacent, and the player who just moved not left in check.
    pub fn is_legal(&self) -> bool {
        if self.piece_count(Piece::WHITE_KING) != 1 || self.piece_count(Piece::BLACK_KING) != 1 {
            return false;
        }

        let wk = self.king_square(Color::White);
        let bk = self.king_square(Color::Black);
        if attacks::king_attacks(wk).contains(bk) {
            return false;
        }

        !self.is_in_check(self.side_to_move.opponent())
    }

    /// [Static exchange evaluation](https://www.chessprogramming.org/Static_Exchange_Evaluation):
    /// the material balance, in centipawns, of the capture sequence opened
    /// by `mv`, with both sides always recapturing with their least
    /// valuable attacker and free to stop when recapturing loses material.
    pub fn see(&self, mv: Move) -> i32 {
        let from = mv.from();
        let to = mv.to();
        let mut side = self.side_to_move;
        let mut current = self.piece_at(from).map(|p| p.kind()).unwrap_or(PieceKind::Pawn);

        // The kinds standing on the target as the exchange progresses;
        // index 0 is the initial victim.
        let mut stood: ArrayVec<PieceKind, 32> = ArrayVec::new();
        stood.push(self.piece_at(to).map(|p| p.kind()).unwrap_or(PieceKind::Pawn));

        let mut occupied = self.occupied() ^ from.bitboard() ^ to.bitboard();
        let mut attackers = [
            self.square_attackers(to, Color::White),
            self.square_attackers(to, Color::Black),
        ];
        attackers[side.index()].clear(from.bitboard());

        'exchange: loop {
            side = side.opponent();

            if (attackers[side.index()] & occupied).is_empty() {
                break;
            }

            // Recapture with the least valuable attacker available
            for kind in PieceKind::all() {
                let candidates = attackers[side.index()] & self.pieces(side, kind) & occupied;
                if let Some(sq) = candidates.lsb() {
                    attackers[side.index()].clear(sq.bitboard());
                    occupied.clear(sq.bitboard());
                    stood.push(current);
                    current = kind;
                    continue 'exchange;
                }
            }

            break;
        }

        // Resolve the exchange backwards; each side may decline to recapture
        let mut value = 0;
        for &kind in stood.iter().skip(1).rev() {
            value = (SEE_VALUES[kind.index()] - value).max(0);
        }

        // The first capture is forced
        SEE_VALUES[stood[0].index()] - value
    }

    /// Returns `true` if playing `mv` would put the opponent in check.
    ///
    /// Used when selecting quiescence candidates, without actually making
    /// the move.
    pub fn gives_check(&self, mv: Move) -> bool {
        let us = self.side_to_move;
        let king_sq = self.king_square(us.opponent());
        let king_bb = king_sq.bitboard();
        let mut blockers = self.occupied();

        if mv.is_castle() {
            // Only the rook's final square can give check
            let rank = Rank::first(us);
            let (king_to, rook_from, rook_to) = if mv.is_short_castle() {
                (File::G, File::H, File::F)
            } else {
                (File::C, File::A, File::D)
            };
            let blockers = blockers
                ^ Square::new(File::E, rank).bitboard()
                ^ Square::new(rook_from, rank).bitboard()
                ^ Square::new(king_to, rank).bitboard()
                ^ Square::new(rook_to, rank).bitboard();
            return attacks::rook_attacks(Square::new(rook_to, rank), blockers)
                .intersects(king_bb);
        }

        let from = mv.from();
        let to = mv.to();
        let moved = mv
            .promotion()
            .unwrap_or_else(|| self.piece_at(from).map(|p| p.kind()).unwrap_or(PieceKind::Pawn));

        // Direct check from the destination square
        let direct = match moved {
            PieceKind::Pawn => attacks::pawn_attacks(to, us),
            PieceKind::Knight => attacks::knight_attacks(to),
            PieceKind::Bishop => attacks::bishop_attacks(to, blockers),
            PieceKind::Rook => attacks::rook_attacks(to, blockers),
            PieceKind::Queen => attacks::queen_attacks(to, blockers),
            PieceKind::King => Bitboard::EMPTY_BOARD,
        };
        if direct.intersects(king_bb) {
            return true;
        }

        // Discovered check through the vacated square
        blockers = (blockers ^ from.bitboard()) | to.bitboard();
        if mv.is_en_passant() {
            blockers ^= to.backward_by(us, 1).unwrap().bitboard();
        }

        (attacks::bishop_attacks(king_sq, blockers) & self.diagonal_sliders(us)).is_nonempty()
            || (attacks::rook_attacks(king_sq, blockers) & self.orthogonal_sliders(us))
                .is_nonempty()
    }

    /// Recomputes the Zobrist hash from scratch.
    ///
    /// The incremental hash must always equal this; only used by debug
    /// assertions and tests.
    pub fn rehash(&self) -> u64 {
        let mut hash = ZobristHash::new();
        for square in Square::iter() {
            if let Some(piece) = self.piece_at(square) {
                hash.toggle_piece(piece, square);
            }
        }
        hash.set_castling(self.castling);
        hash.set_side_to_move(self.side_to_move);
        if let Some(sq) = self.ep_square {
            if self.ep_capture_possible(sq) {
                hash.set_enpassant(sq.file());
            }
        }
        hash.key()
    }
}

/// The rights `color` loses when a piece of `kind` moves from (or an enemy
/// piece of `kind` is captured on) `square`.
#[inline(always)]
fn castling_rights_lost(color: Color, kind: PieceKind, square: Square) -> CastlingRights {
    match kind {
        PieceKind::King => CastlingRights::for_color(color),
        PieceKind::Rook => {
            let rank = Rank::first(color);
            if square == Square::new(File::H, rank) {
                match color {
                    Color::White => CastlingRights::WHITE_SHORT,
                    Color::Black => CastlingRights::BLACK_SHORT,
                }
            } else if square == Square::new(File::A, rank) {
                match color {
                    Color::White => CastlingRights::WHITE_LONG,
                    Color::Black => CastlingRights::BLACK_LONG,
                }
            } else {
                CastlingRights::NONE
            }
        }
        _ => CastlingRights::NONE,
    }
}

/// A compact piece-count signature: ten 6-bit counts, pawns through queens
/// for each color. Kings are omitted, as both sides always have one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct MaterialKey(u64);

impl MaterialKey {
    /// Packs the provided counts into a [`MaterialKey`].
    #[allow(clippy::too_many_arguments)]
    pub const fn from_counts(
        wp: u64,
        wn: u64,
        wb: u64,
        wr: u64,
        wq: u64,
        bp: u64,
        bn: u64,
        bb: u64,
        br: u64,
        bq: u64,
    ) -> Self {
        Self(
            wp | wn << 6
                | wb << 12
                | wr << 18
                | wq << 24
                | bp << 30
                | bn << 36
                | bb << 42
                | br << 48
                | bq << 54,
        )
    }

    /// The signature with the colors of every count exchanged.
    pub const fn flipped(self) -> Self {
        Self((self.0 >> 30) | (self.0 & 0x3FFF_FFFF) << 30)
    }
}

impl PartialEq for Position {
    /// Two positions are equal if they agree on every square, the side to
    /// move, castling rights, the en passant square, and both clocks.
    ///
    /// Piece-list ordering and key history are not compared.
    fn eq(&self, other: &Self) -> bool {
        self.hash.key() == other.hash.key()
            && self.side_to_move == other.side_to_move
            && self.castling == other.castling
            && self.ep_square == other.ep_square
            && self.halfmove == other.halfmove
            && self.fullmove == other.fullmove
            && self.mailbox == other.mailbox
    }
}

impl Eq for Position {}

impl Default for Position {
    fn default() -> Self {
        // The FEN for startpos is always valid
        Self::from_fen(FEN_STARTPOS).unwrap()
    }
}

impl FromStr for Position {
    type Err = anyhow::Error;
    #[inline(always)]
    fn from_str(s: &str) -> Result<Self> {
        Self::from_fen(s)
    }
}

impl fmt::Display for Position {
    /// Displays this position's FEN string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::iter().rev() {
            let mut empty = 0;
            for file in File::iter() {
                if let Some(piece) = self.piece_at(Square::new(file, rank)) {
                    if empty != 0 {
                        write!(f, "{empty}")?;
                        empty = 0;
                    }
                    write!(f, "{piece}")?;
                } else {
                    empty += 1;
                }
            }
            if empty != 0 {
                write!(f, "{empty}")?;
            }
            if rank != Rank::ONE {
                write!(f, "/")?;
            }
        }

        let ep = match self.ep_square {
            Some(sq) => sq.to_uci(),
            None => String::from("-"),
        };

        write!(
            f,
            " {} {} {ep} {} {}",
            self.side_to_move, self.castling, self.halfmove, self.fullmove
        )
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::iter().rev() {
            write!(f, "{rank}|")?;
            for file in File::iter() {
                let c = self
                    .piece_at(Square::new(file, rank))
                    .map(|p| p.char())
                    .unwrap_or('.');
                write!(f, " {c}")?;
            }
            if rank == Rank::SIX {
                write!(f, "    FEN: {}", self.to_fen())?;
            } else if rank == Rank::FIVE {
                write!(f, "    Key: {:#018x}", self.key())?;
            }
            writeln!(f)?;
        }
        write!(f, " +----------------\n   a b c d e f g h")
    }
}
