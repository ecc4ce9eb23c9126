/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use arrayvec::ArrayVec;

use crate::{HistoryTable, Move, MoveList, PieceKind, Position, MAX_NUM_MOVES};

/// Victim values for Most-Valuable-Victim / Least-Valuable-Attacker
/// ordering.
const MVV_LVA_VALUES: [i32; PieceKind::COUNT] = [100, 320, 330, 500, 900, 0];

/// The picker's progression through its move classes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    HashMove,
    GoodCaptures,
    Killers,
    Quiets,
    BadCaptures,
}

/// Hands out the moves of one node in stages, most promising first,
/// without ever sorting the whole list:
///
/// 1. the hash move (the PV move stored for this position's key),
/// 2. captures in MVV-LVA order, losing captures (SEE < 0) held back,
/// 3. the two killer moves recorded for this ply,
/// 4. the remaining quiet moves, best history score first,
/// 5. the losing captures last.
///
/// Within a stage, the best remaining move is selected on demand, so a
/// node that cuts off early never pays for ordering the rest.
pub struct MovePicker {
    stage: Stage,
    hash_move: Move,
    captures: ArrayVec<(Move, i32), MAX_NUM_MOVES>,
    bad_captures: ArrayVec<Move, MAX_NUM_MOVES>,
    killers: ArrayVec<Move, 2>,
    quiets: ArrayVec<(Move, i32), MAX_NUM_MOVES>,
    bad_index: usize,
}

impl MovePicker {
    /// Builds a picker over `moves` for this node.
    ///
    /// `hash_move` is emitted first if it is among `moves`; `killers` are
    /// promoted ahead of the other quiets.
    pub fn new(
        position: &Position,
        history: &HistoryTable,
        moves: MoveList,
        hash_move: Move,
        killers: [Move; 2],
    ) -> Self {
        let us = position.side_to_move();

        let mut picker = Self {
            stage: Stage::HashMove,
            hash_move: Move::NONE,
            captures: ArrayVec::new(),
            bad_captures: ArrayVec::new(),
            killers: ArrayVec::new(),
            quiets: ArrayVec::new(),
            bad_index: 0,
        };

        for mv in moves {
            if mv == hash_move {
                picker.hash_move = mv;
            } else if mv.is_capture() {
                if position.see(mv) < 0 {
                    picker.bad_captures.push(mv);
                } else {
                    picker.captures.push((mv, mvv_lva(position, mv)));
                }
            } else if killers.contains(&mv) {
                // Keep the killers in their slot order
                if killers[0] == mv {
                    picker.killers.insert(0, mv);
                } else {
                    picker.killers.push(mv);
                }
            } else {
                picker.quiets.push((mv, history.get(us, mv)));
            }
        }

        picker
    }

    /// Returns `true` if another move remains.
    #[inline(always)]
    pub fn has_next(&self) -> bool {
        !self.hash_move.is_none()
            || !self.captures.is_empty()
            || !self.killers.is_empty()
            || !self.quiets.is_empty()
            || self.bad_index < self.bad_captures.len()
    }

    /// Removes and returns the best-scored entry of `list`.
    fn take_best(list: &mut ArrayVec<(Move, i32), MAX_NUM_MOVES>) -> Option<Move> {
        let mut best = 0;
        for i in 1..list.len() {
            if list[i].1 > list[best].1 {
                best = i;
            }
        }
        Some(list.swap_remove(best).0)
    }
}

impl Iterator for MovePicker {
    type Item = Move;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stage {
                Stage::HashMove => {
                    self.stage = Stage::GoodCaptures;
                    if !self.hash_move.is_none() {
                        let mv = self.hash_move;
                        self.hash_move = Move::NONE;
                        return Some(mv);
                    }
                }

                Stage::GoodCaptures => {
                    if self.captures.is_empty() {
                        self.stage = Stage::Killers;
                    } else {
                        return Self::take_best(&mut self.captures);
                    }
                }

                Stage::Killers => {
                    if self.killers.is_empty() {
                        self.stage = Stage::Quiets;
                    } else {
                        return Some(self.killers.remove(0));
                    }
                }

                Stage::Quiets => {
                    if self.quiets.is_empty() {
                        self.stage = Stage::BadCaptures;
                    } else {
                        return Self::take_best(&mut self.quiets);
                    }
                }

                Stage::BadCaptures => {
                    if self.bad_index < self.bad_captures.len() {
                        let mv = self.bad_captures[self.bad_index];
                        self.bad_index += 1;
                        return Some(mv);
                    }
                    return None;
                }
            }
        }
    }
}

/// Scores a capture by its victim and attacker: the most valuable victim
/// first, taken by the least valuable attacker.
#[inline(always)]
fn mvv_lva(position: &Position, mv: Move) -> i32 {
    // En passant's victim square is empty; the victim is always a pawn
    let victim = position
        .piece_at(mv.to())
        .map(|p| p.kind())
        .unwrap_or(PieceKind::Pawn);
    let attacker = position
        .piece_at(mv.from())
        .map(|p| p.kind())
        .unwrap_or(PieceKind::Pawn);

    10 * MVV_LVA_VALUES[victim.index()] - MVV_LVA_VALUES[attacker.index()]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{generate_moves, Move};

    #[test]
    fn test_picker_yields_every_move_once() {
        let mut pos = Position::from_fen(crate::FEN_KIWIPETE).unwrap();
        let moves = generate_moves(&mut pos);
        let history = HistoryTable::default();

        let picker = MovePicker::new(&pos, &history, moves.clone(), Move::NONE, [Move::NONE; 2]);
        let mut picked: Vec<Move> = picker.collect();

        assert_eq!(picked.len(), moves.len());
        picked.sort_by_key(|mv| mv.to_uci());
        let mut expected: Vec<Move> = moves.into_iter().collect();
        expected.sort_by_key(|mv| mv.to_uci());
        assert_eq!(picked, expected);
    }

    #[test]
    fn test_hash_move_comes_first() {
        let mut pos = Position::from_fen(crate::FEN_KIWIPETE).unwrap();
        let moves = generate_moves(&mut pos);
        let history = HistoryTable::default();

        let hash_move = Move::from_uci(&pos, "a2a3").unwrap();
        let mut picker =
            MovePicker::new(&pos, &history, moves, hash_move, [Move::NONE; 2]);
        assert_eq!(picker.next().unwrap(), hash_move);
    }

    #[test]
    fn test_winning_captures_before_quiets_before_losing_captures() {
        // White can win a queen with the d5 pawn, or lose his own queen
        // grabbing the pawn on c7
        let mut pos =
            Position::from_fen("2r1k3/2p5/4q3/3P4/8/8/2Q5/6K1 w - - 0 1").unwrap();
        let moves = generate_moves(&mut pos);
        let history = HistoryTable::default();

        let picker = MovePicker::new(&pos, &history, moves, Move::NONE, [Move::NONE; 2]);
        let picked: Vec<Move> = picker.collect();

        let take_queen = Move::from_uci(&pos, "d5e6").unwrap();
        assert_eq!(picked[0], take_queen);

        // The losing capture comes dead last
        let losing = picked
            .iter()
            .position(|&mv| mv == "c2c7")
            .expect("losing capture missing");
        assert_eq!(losing, picked.len() - 1);
    }

    #[test]
    fn test_killers_precede_other_quiets() {
        let mut pos = Position::default();
        let moves = generate_moves(&mut pos);
        let history = HistoryTable::default();

        let killer = Move::from_uci(&pos, "g2g3").unwrap();
        let picker =
            MovePicker::new(&pos, &history, moves, Move::NONE, [killer, Move::NONE]);
        let picked: Vec<Move> = picker.collect();

        // No captures from the start position, so the killer leads
        assert_eq!(picked[0], killer);
    }

    #[test]
    fn test_history_orders_quiets() {
        let mut pos = Position::default();
        let moves = generate_moves(&mut pos);
        let mut history = HistoryTable::default();

        let favored = Move::from_uci(&pos, "b1c3").unwrap();
        history.update(pos.side_to_move(), favored, 8);

        let picker = MovePicker::new(&pos, &history, moves, Move::NONE, [Move::NONE; 2]);
        let picked: Vec<Move> = picker.collect();
        assert_eq!(picked[0], favored);
    }
}
