/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

/// The color of a player or piece. White moves first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[repr(u8)]
pub enum Color {
    #[default]
    White = 0,
    Black = 1,
}

impl Color {
    /// Number of colors.
    pub const COUNT: usize = 2;

    /// Both colors, White first.
    #[inline(always)]
    pub const fn all() -> [Self; Self::COUNT] {
        [Self::White, Self::Black]
    }

    /// Returns `true` if this is [`Color::White`].
    #[inline(always)]
    pub const fn is_white(&self) -> bool {
        matches!(self, Self::White)
    }

    /// Returns `true` if this is [`Color::Black`].
    #[inline(always)]
    pub const fn is_black(&self) -> bool {
        matches!(self, Self::Black)
    }

    /// Returns the opposite color.
    ///
    /// # Example
    /// ```
    /// # use sable::Color;
    /// assert_eq!(Color::White.opponent(), Color::Black);
    /// ```
    #[inline(always)]
    pub const fn opponent(&self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Returns this [`Color`] as a `usize`, for indexing into lists.
    #[inline(always)]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// `1` for White, `-1` for Black. Used when scoring relative to a side.
    #[inline(always)]
    pub const fn negation_multiplier(&self) -> i32 {
        1 - 2 * (*self as i32)
    }

    /// The name of this color, as a lowercase string.
    #[inline(always)]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "w" | "W" => Ok(Self::White),
            "b" | "B" => Ok(Self::Black),
            _ => bail!("Color must be either \"w\" or \"b\". Got {s:?}"),
        }
    }
}

impl std::ops::Not for Color {
    type Output = Self;
    #[inline(always)]
    fn not(self) -> Self::Output {
        self.opponent()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = if self.is_white() { "w" } else { "b" };
        write!(f, "{s}")
    }
}

/// The kind of a chess piece, independent of its color.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum PieceKind {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl PieceKind {
    /// Number of kinds of pieces.
    pub const COUNT: usize = 6;

    /// All piece kinds, in ascending order of value.
    #[inline(always)]
    pub const fn all() -> [Self; Self::COUNT] {
        use PieceKind::*;
        [Pawn, Knight, Bishop, Rook, Queen, King]
    }

    /// Creates a new [`PieceKind`] from raw bits, without validation.
    ///
    /// Bits above the third are discarded.
    #[inline(always)]
    pub const fn from_bits_unchecked(bits: u8) -> Self {
        // Safety: masked to [0, 5] by the caller's contract
        unsafe { std::mem::transmute(bits & 0b111) }
    }

    /// Returns this [`PieceKind`] as a `usize`, for indexing into lists.
    #[inline(always)]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// The material value of this piece kind, in centipawns.
    ///
    /// The King's value is 0, as he can never be captured.
    #[inline(always)]
    pub const fn value(&self) -> i32 {
        match self {
            Self::Pawn => 100,
            Self::Knight => 320,
            Self::Bishop => 330,
            Self::Rook => 500,
            Self::Queen => 900,
            Self::King => 0,
        }
    }

    /// Parses a piece kind from a (case-insensitive) UCI char.
    pub fn from_uci(kind: char) -> Result<Self> {
        match kind {
            'p' | 'P' => Ok(Self::Pawn),
            'n' | 'N' => Ok(Self::Knight),
            'b' | 'B' => Ok(Self::Bishop),
            'r' | 'R' => Ok(Self::Rook),
            'q' | 'Q' => Ok(Self::Queen),
            'k' | 'K' => Ok(Self::King),
            _ => bail!("Piece kind must be one of [p, n, b, r, q, k]. Got {kind:?}"),
        }
    }

    /// Returns this piece kind as a lowercase UCI char.
    #[inline(always)]
    pub const fn char(&self) -> char {
        match self {
            Self::Pawn => 'p',
            Self::Knight => 'n',
            Self::Bishop => 'b',
            Self::Rook => 'r',
            Self::Queen => 'q',
            Self::King => 'k',
        }
    }

    /// The name of this piece kind, as a lowercase string.
    #[inline(always)]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pawn => "pawn",
            Self::Knight => "knight",
            Self::Bishop => "bishop",
            Self::Rook => "rook",
            Self::Queen => "queen",
            Self::King => "king",
        }
    }
}

impl FromStr for PieceKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        let Some(c) = s.chars().next() else {
            bail!("PieceKind string cannot be empty");
        };
        Self::from_uci(c)
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.char())
    }
}

/// A chess piece: a [`Color`] and a [`PieceKind`], packed into a single byte.
///
/// Bits 0-2 hold the kind, bit 3 the color.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Piece(u8);

impl Piece {
    pub const WHITE_PAWN: Self = Self::new(Color::White, PieceKind::Pawn);
    pub const WHITE_KNIGHT: Self = Self::new(Color::White, PieceKind::Knight);
    pub const WHITE_BISHOP: Self = Self::new(Color::White, PieceKind::Bishop);
    pub const WHITE_ROOK: Self = Self::new(Color::White, PieceKind::Rook);
    pub const WHITE_QUEEN: Self = Self::new(Color::White, PieceKind::Queen);
    pub const WHITE_KING: Self = Self::new(Color::White, PieceKind::King);
    pub const BLACK_PAWN: Self = Self::new(Color::Black, PieceKind::Pawn);
    pub const BLACK_KNIGHT: Self = Self::new(Color::Black, PieceKind::Knight);
    pub const BLACK_BISHOP: Self = Self::new(Color::Black, PieceKind::Bishop);
    pub const BLACK_ROOK: Self = Self::new(Color::Black, PieceKind::Rook);
    pub const BLACK_QUEEN: Self = Self::new(Color::Black, PieceKind::Queen);
    pub const BLACK_KING: Self = Self::new(Color::Black, PieceKind::King);

    /// Number of distinct pieces: 6 kinds for each color.
    pub const COUNT: usize = PieceKind::COUNT * Color::COUNT;

    /// All twelve pieces, White's first.
    #[inline(always)]
    pub const fn all() -> [Self; Self::COUNT] {
        [
            Self::WHITE_PAWN,
            Self::WHITE_KNIGHT,
            Self::WHITE_BISHOP,
            Self::WHITE_ROOK,
            Self::WHITE_QUEEN,
            Self::WHITE_KING,
            Self::BLACK_PAWN,
            Self::BLACK_KNIGHT,
            Self::BLACK_BISHOP,
            Self::BLACK_ROOK,
            Self::BLACK_QUEEN,
            Self::BLACK_KING,
        ]
    }

    /// Creates a new [`Piece`] from the provided [`Color`] and [`PieceKind`].
    #[inline(always)]
    pub const fn new(color: Color, kind: PieceKind) -> Self {
        Self((color as u8) << 3 | kind as u8)
    }

    /// Returns the [`Color`] of this piece.
    #[inline(always)]
    pub const fn color(&self) -> Color {
        if self.0 & 0b1000 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    /// Returns the [`PieceKind`] of this piece.
    #[inline(always)]
    pub const fn kind(&self) -> PieceKind {
        PieceKind::from_bits_unchecked(self.0)
    }

    /// Returns the [`Color`] and [`PieceKind`] of this piece.
    #[inline(always)]
    pub const fn parts(&self) -> (Color, PieceKind) {
        (self.color(), self.kind())
    }

    /// Returns `true` if this piece is a Pawn.
    #[inline(always)]
    pub const fn is_pawn(&self) -> bool {
        matches!(self.kind(), PieceKind::Pawn)
    }

    /// Returns `true` if this piece is a Rook.
    #[inline(always)]
    pub const fn is_rook(&self) -> bool {
        matches!(self.kind(), PieceKind::Rook)
    }

    /// Returns `true` if this piece is a King.
    #[inline(always)]
    pub const fn is_king(&self) -> bool {
        matches!(self.kind(), PieceKind::King)
    }

    /// Returns this [`Piece`] as a `usize` in `[0, 12)`, for indexing into lists.
    ///
    /// White pieces occupy `[0, 6)` and Black pieces `[6, 12)`.
    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.color().index() * PieceKind::COUNT + self.kind().index()
    }

    /// Exchanges this piece's kind for `promotion`, keeping its color.
    #[inline(always)]
    pub const fn promoted(self, promotion: PieceKind) -> Self {
        Self::new(self.color(), promotion)
    }

    /// Parses a piece from a FEN char: uppercase for White, lowercase for Black.
    pub fn from_uci(piece: char) -> Result<Self> {
        let kind = PieceKind::from_uci(piece)?;
        let color = if piece.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Ok(Self::new(color, kind))
    }

    /// Returns this piece's FEN char: uppercase for White, lowercase for Black.
    #[inline(always)]
    pub const fn char(&self) -> char {
        let c = self.kind().char();
        if self.color().is_white() {
            c.to_ascii_uppercase()
        } else {
            c
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.char())
    }
}

impl fmt::Debug for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.color().name(), self.kind().name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_piece_packing() {
        for color in Color::all() {
            for kind in PieceKind::all() {
                let piece = Piece::new(color, kind);
                assert_eq!(piece.color(), color);
                assert_eq!(piece.kind(), kind);
            }
        }
        assert_eq!(Piece::WHITE_PAWN.index(), 0);
        assert_eq!(Piece::BLACK_KING.index(), 11);
    }

    #[test]
    fn test_piece_from_uci() {
        assert_eq!(Piece::from_uci('N').unwrap(), Piece::WHITE_KNIGHT);
        assert_eq!(Piece::from_uci('q').unwrap(), Piece::BLACK_QUEEN);
        assert!(Piece::from_uci('x').is_err());
    }

    #[test]
    fn test_piece_promotion() {
        let promoted = Piece::BLACK_PAWN.promoted(PieceKind::Queen);
        assert_eq!(promoted, Piece::BLACK_QUEEN);
    }
}
