/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Everything about the board itself: squares, pieces, bitboards, attack
/// tables, moves, hashing, and the make/unmake protocol.
mod board;

/// The king-and-pawn-versus-king bitbase.
pub mod bitbase;

/// Reading and probing Polyglot opening books.
mod book;

/// Specialized scorers for a handful of known endgames.
pub mod endgame;

/// The UCI dispatcher and the engine's own command prompt.
mod engine;

/// Static evaluation: material and piece-square tables.
mod eval;

/// Killer moves and the history heuristic.
mod history;

/// Staged move ordering for the search.
mod picker;

/// Types and utilities for rating how good or bad a position is.
mod score;

/// Main engine logic; all search related code.
mod search;

pub use board::*;
pub use book::*;
pub use engine::*;
pub use eval::*;
pub use history::*;
pub use picker::*;
pub use score::*;
pub use search::*;

/// Builds every table the engine relies on: sliding attacks, the KPK
/// bitbase, and the endgame registry.
///
/// Everything is also built lazily on first use; calling this once at
/// startup simply front-loads the cost, before any clock is running.
pub fn init() {
    board::attacks::init();
    endgame::init();
}
