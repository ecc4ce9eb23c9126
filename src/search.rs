/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use arrayvec::ArrayVec;
use uci_parser::{UciInfo, UciResponse, UciSearchOptions};

use crate::{
    endgame, generate_moves, generate_quiescence_moves, HistoryTable, KillerTable, Move,
    MovePicker, Position, Score, Scorer, MAX_DEPTH,
};

/// How many nodes are visited between polls of the stop flag and the
/// elapsed-time check.
const LIMIT_CHECK_INTERVAL: u64 = 4096;

/// A stand-in for "no limit at all" on the clock.
const FOREVER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A line-oriented sink for the search's `info` and `bestmove` output.
///
/// The engine points this at stdout; tests usually discard it.
pub trait Logger {
    /// Emits one protocol line.
    fn send(&self, line: String);
}

/// A [`Logger`] that prints to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutLogger;

impl Logger for StdoutLogger {
    #[inline(always)]
    fn send(&self, line: String) {
        println!("{line}");
    }
}

/// A [`Logger`] that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    #[inline(always)]
    fn send(&self, _line: String) {}
}

/// What the search is allowed to spend, as parsed from `go`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    /// Fixed depth cap.
    pub depth: Option<usize>,

    /// Node budget.
    pub nodes: Option<u64>,

    /// Exact time for this move.
    pub movetime: Option<Duration>,

    /// Remaining clock time per side, White first.
    pub time_left: [Option<Duration>; 2],

    /// Moves until the next time control.
    pub movestogo: Option<u64>,

    /// Search until told to stop.
    pub infinite: bool,
}

impl Limits {
    /// Builds [`Limits`] from the options of a UCI `go` command.
    pub fn from_uci(options: &UciSearchOptions) -> Self {
        Self {
            depth: options.depth.map(|d| d as usize),
            nodes: options.nodes.map(|n| n as u64),
            movetime: options.movetime,
            time_left: [options.wtime, options.btime],
            movestogo: options.movestogo.map(|m| m as u64),
            infinite: options.infinite,
        }
    }

    /// Resolves these limits into a depth cap and a time budget for the
    /// side to move. The first budget to trip ends the search.
    fn resolve(&self, position: &Position) -> (usize, Duration) {
        if self.infinite {
            return (MAX_DEPTH, FOREVER);
        }
        if let Some(depth) = self.depth {
            return (depth.min(MAX_DEPTH), FOREVER);
        }
        if let Some(movetime) = self.movetime {
            return (MAX_DEPTH, movetime);
        }
        if let Some(time) = self.time_left[position.side_to_move().index()] {
            // Budget an even share of the remaining clock
            let movestogo = self.movestogo.unwrap_or(20);
            return (MAX_DEPTH, time / (movestogo + 1) as u32);
        }

        // Nothing was specified; search shallow rather than forever
        (7, FOREVER)
    }
}

/// The best line found, rooted at the searched position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrincipalVariation(ArrayVec<Move, MAX_DEPTH>);

impl PrincipalVariation {
    /// The first move of the line, if any.
    #[inline(always)]
    pub fn first(&self) -> Option<Move> {
        self.0.first().copied()
    }

    /// The moves of the line, in playing order.
    #[inline(always)]
    pub fn moves(&self) -> &[Move] {
        &self.0
    }

    #[inline(always)]
    fn clear(&mut self) {
        self.0.clear();
    }

    /// Replaces `self` with `mv` followed by `rest`.
    fn assign(&mut self, mv: Move, rest: &Self) {
        self.0.clear();
        self.0.push(mv);
        // The line can only fill up if mate scores stop terminating the
        // iterative deepening, which they do
        let spare = self.0.capacity() - 1;
        self.0.extend(rest.0.iter().copied().take(spare));
    }
}

/// What a finished (or cancelled) search hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// The best move found. `None` only if the position has no legal moves.
    pub bestmove: Option<Move>,

    /// The score of `bestmove` from the searched side's perspective.
    pub score: Score,

    /// The depth of the last fully-completed iteration.
    pub depth: usize,

    /// Total nodes visited.
    pub nodes: u64,

    /// The principal variation of the last completed iteration.
    pub pv: PrincipalVariation,
}

/// The caches the search keeps warm between iterations and between moves:
/// killers, quiet-move history, and the move that proved best for each
/// position key.
#[derive(Default)]
pub struct SearchCache {
    killers: KillerTable,
    history: HistoryTable,
    pv_moves: HashMap<u64, Move>,
}

impl SearchCache {
    /// Forgets everything, as for a new game.
    pub fn clear(&mut self) {
        self.killers.clear();
        self.history.clear();
        self.pv_moves.clear();
    }
}

/// One run of iterative deepening over a single position.
///
/// The search owns a copy of the position and mutates it with strict
/// do/undo discipline. Cancellation is cooperative: the `stop` flag is
/// polled every few thousand nodes, and a cancelled iteration's result is
/// discarded in favor of the last completed one.
pub struct Search<'a, S, L> {
    position: Position,
    scorer: &'a S,
    logger: &'a L,
    cache: &'a mut SearchCache,
    stop: Arc<AtomicBool>,

    /// Depth of the iteration currently running.
    current_depth: usize,

    /// Node and time bookkeeping.
    nodes: u64,
    limit_countdown: u64,
    started: Instant,
    search_time: Duration,
    search_depth: usize,
    node_limit: u64,
}

impl<'a, S: Scorer, L: Logger> Search<'a, S, L> {
    /// Prepares a search of `position` under `limits`.
    pub fn new(
        position: Position,
        limits: Limits,
        stop: Arc<AtomicBool>,
        scorer: &'a S,
        logger: &'a L,
        cache: &'a mut SearchCache,
    ) -> Self {
        let (search_depth, search_time) = limits.resolve(&position);

        Self {
            position,
            scorer,
            logger,
            cache,
            stop,
            current_depth: 0,
            nodes: 0,
            limit_countdown: LIMIT_CHECK_INTERVAL,
            started: Instant::now(),
            search_time,
            search_depth,
            node_limit: limits.nodes.unwrap_or(u64::MAX),
        }
    }

    /// Runs iterative deepening to completion and emits `bestmove`.
    pub fn run(mut self) -> SearchResult {
        let mut result = SearchResult {
            bestmove: generate_moves(&mut self.position).first().copied(),
            score: Score::DRAW,
            depth: 0,
            nodes: 0,
            pv: PrincipalVariation::default(),
        };

        let mut depth = 1;
        while depth <= self.search_depth && !self.stop.load(Ordering::Relaxed) {
            self.current_depth = depth;
            let mut pv = PrincipalVariation::default();

            let score = self.negamax(depth, 0, -Score::INFINITY, Score::INFINITY, true, &mut pv);

            // A cancelled iteration returned early with a junk score;
            // whatever was completed before it stands as the answer
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            result.score = score;
            result.depth = depth;
            result.pv = pv;
            if let Some(mv) = result.pv.first() {
                result.bestmove = Some(mv);
            }

            self.send_info(&result);

            // A forced mate cannot be improved by searching deeper
            if score.is_mate() {
                break;
            }

            // Don't start an iteration that can't finish in the remaining
            // budget
            if self.started.elapsed() >= self.search_time / 2 {
                break;
            }

            depth += 1;
        }

        result.nodes = self.nodes;

        let bestmove = result.bestmove.map(|mv| mv.to_uci());
        self.logger
            .send(UciResponse::BestMove { bestmove, ponder: None }.to_string());

        self.stop.store(true, Ordering::Relaxed);
        result
    }

    /// Emits the `info` line for a completed iteration.
    fn send_info(&self, result: &SearchResult) {
        let elapsed = self.started.elapsed();
        let nps = (self.nodes as f64 / elapsed.as_secs_f64().max(0.001)).trunc();

        let info = UciInfo::new()
            .depth(result.depth)
            .score(result.score.into_uci())
            .nodes(self.nodes)
            .nps(nps)
            .time(elapsed.as_millis())
            .pv(result.pv.moves().iter().map(|mv| mv.to_uci()));

        self.logger.send(UciResponse::info(info).to_string());
    }

    /// The negamax alpha-beta recursion with principal-variation search.
    ///
    /// `allow_null` guards against two null moves in a row. Returns a
    /// meaningless score once the stop flag is set; the driver discards it.
    fn negamax(
        &mut self,
        depth: usize,
        ply: usize,
        mut alpha: Score,
        beta: Score,
        allow_null: bool,
        pv: &mut PrincipalVariation,
    ) -> Score {
        pv.clear();

        if self.should_stop() {
            return Score::DRAW;
        }

        if self.position.is_threefold_repetition() || self.position.can_draw_by_fifty() {
            return Score::DRAW;
        }

        let us = self.position.side_to_move();
        let in_check = self.position.is_in_check(us);

        let moves = generate_moves(&mut self.position);
        if moves.is_empty() {
            return if in_check {
                Score::lost_in(ply)
            } else {
                Score::DRAW
            };
        }

        if depth == 0 {
            return self.quiescence(MAX_DEPTH - 1, ply, alpha, beta);
        }

        // Null move: if passing the turn still fails high, an actual move
        // will too. Unsound in check and in pawn endings (zugzwang), so
        // skipped there.
        if allow_null && !in_check && depth > 4 && self.position.nonpawn_material(us) > 0 {
            let mut ignored = PrincipalVariation::default();
            let info = self.position.do_null_move();
            let score =
                -self.negamax(depth - 4, ply + 1, -beta, -beta + 1, false, &mut ignored);
            self.position.undo_null_move(info);

            if score >= beta && !self.stop.load(Ordering::Relaxed) {
                return beta;
            }
        }

        let hash_move = self
            .cache
            .pv_moves
            .get(&self.position.key())
            .copied()
            .unwrap_or(Move::NONE);
        let killers = self.cache.killers.get(ply);
        let picker = MovePicker::new(
            &self.position,
            &self.cache.history,
            moves,
            hash_move,
            killers,
        );

        let mut local_pv = PrincipalVariation::default();
        let mut best = -Score::INFINITY;
        let mut full_window = true;

        for mv in picker {
            self.nodes += 1;
            let info = self.position.do_move(mv);

            // Principal-variation search: the first move gets the full
            // window; the rest must first beat a zero window to earn a
            // re-search
            let score = if full_window {
                -self.negamax(depth - 1, ply + 1, -beta, -alpha, true, &mut local_pv)
            } else {
                let score =
                    -self.negamax(depth - 1, ply + 1, -alpha - 1, -alpha, true, &mut local_pv);
                if alpha < score && score < beta {
                    -self.negamax(depth - 1, ply + 1, -beta, -alpha, true, &mut local_pv)
                } else {
                    score
                }
            };

            self.position.undo_move(mv, info);

            if self.stop.load(Ordering::Relaxed) {
                return Score::DRAW;
            }

            if score >= beta {
                // Quiet moves that refute a whole subtree are worth
                // remembering
                if mv.is_quiet() {
                    self.cache.killers.update(ply, mv);
                    self.cache.history.update(us, mv, depth);
                }
                self.cache.pv_moves.insert(self.position.key(), mv);
                return beta;
            }

            if score > best {
                best = score;
                pv.assign(mv, &local_pv);
            }
            if score > alpha {
                alpha = score;
                full_window = false;
            }
        }

        if let Some(mv) = pv.first() {
            self.cache.pv_moves.insert(self.position.key(), mv);
        }

        best
    }

    /// The quiescence extension: only tactical moves, with the static
    /// evaluation as a standing floor, until the position goes quiet.
    fn quiescence(&mut self, qdepth: usize, ply: usize, mut alpha: Score, beta: Score) -> Score {
        if self.should_stop() {
            return Score::DRAW;
        }

        if self.position.is_threefold_repetition() || self.position.can_draw_by_fifty() {
            return Score::DRAW;
        }

        // Mate and stalemate are exact even here, so look at the full move
        // list before narrowing to tactical candidates
        let any_moves = !generate_moves(&mut self.position).is_empty();
        if !any_moves {
            return if self.position.is_in_check(self.position.side_to_move()) {
                Score::lost_in(ply)
            } else {
                Score::DRAW
            };
        }

        let stand_pat = self.evaluate();
        self.nodes += 1;

        if qdepth == 0 {
            return stand_pat;
        }

        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let candidates = generate_quiescence_moves(&mut self.position);
        let picker = MovePicker::new(
            &self.position,
            &self.cache.history,
            candidates,
            Move::NONE,
            [Move::NONE; 2],
        );

        let mut full_window = true;
        for mv in picker {
            let info = self.position.do_move(mv);

            let score = if full_window {
                -self.quiescence(qdepth - 1, ply + 1, -beta, -alpha)
            } else {
                let score = -self.quiescence(qdepth - 1, ply + 1, -alpha - 1, -alpha);
                if alpha < score && score < beta {
                    -self.quiescence(qdepth - 1, ply + 1, -beta, -alpha)
                } else {
                    score
                }
            };

            self.position.undo_move(mv, info);

            if self.stop.load(Ordering::Relaxed) {
                return Score::DRAW;
            }

            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
                full_window = false;
            }
        }

        alpha
    }

    /// The leaf evaluation: dead positions are draws, then a matching
    /// endgame scorer if one applies, then the general evaluator.
    #[inline(always)]
    fn evaluate(&self) -> Score {
        if self.position.has_insufficient_material() {
            return Score::DRAW;
        }
        endgame::probe(&self.position).unwrap_or_else(|| self.scorer.score(&self.position))
    }

    /// Cheap cancellation poll: every [`LIMIT_CHECK_INTERVAL`] visits,
    /// check the clock and node budget, and latch the stop flag if either
    /// has run out.
    #[inline(always)]
    fn should_stop(&mut self) -> bool {
        if self.stop.load(Ordering::Relaxed) {
            return true;
        }

        self.limit_countdown -= 1;
        if self.limit_countdown > 0 {
            return false;
        }
        self.limit_countdown = LIMIT_CHECK_INTERVAL;

        if self.nodes >= self.node_limit || self.started.elapsed() >= self.search_time {
            self.stop.store(true, Ordering::Relaxed);
            return true;
        }

        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Evaluator;

    fn run_search(fen: &str, limits: Limits) -> SearchResult {
        let position = Position::from_fen(fen).unwrap();
        let mut cache = SearchCache::default();
        let stop = Arc::new(AtomicBool::new(false));
        Search::new(position, limits, stop, &Evaluator, &NullLogger, &mut cache).run()
    }

    fn depth_limited(depth: usize) -> Limits {
        Limits {
            depth: Some(depth),
            ..Default::default()
        }
    }

    #[test]
    fn test_finds_back_rank_mate_in_one() {
        let res = run_search("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", depth_limited(2));
        assert_eq!(res.bestmove.unwrap(), "a1a8");
        assert!(res.score.is_mate());
        assert_eq!(res.score, Score::win_in(1));
    }

    #[test]
    fn test_sees_mate_against_itself() {
        // Black's only move is Kb8, and Qf8 is then mate
        let res = run_search("k7/8/1K6/2Q5/8/8/8/8 b - - 0 1", depth_limited(3));
        assert_eq!(res.bestmove.unwrap(), "a8b8");
        assert_eq!(res.score, Score::lost_in(2));
    }

    #[test]
    fn test_grabs_a_hanging_queen() {
        let res = run_search("3q3k/8/8/8/8/8/8/3R3K w - - 0 1", depth_limited(3));
        assert_eq!(res.bestmove.unwrap(), "d1d8");
    }

    #[test]
    fn test_capture_promotion_is_found() {
        let res = run_search("3q1n2/4P3/8/8/8/8/k7/7K w - - 0 1", depth_limited(2));
        assert_eq!(res.bestmove.unwrap(), "e7d8q");
    }

    #[test]
    fn test_stalemate_scores_draw() {
        let res = run_search("k7/8/KQ6/8/8/8/8/8 b - - 0 1", depth_limited(3));
        assert!(res.bestmove.is_none());
        assert_eq!(res.score, Score::DRAW);
    }

    #[test]
    fn test_node_limit_stops_the_search() {
        let limits = Limits {
            nodes: Some(20_000),
            ..Default::default()
        };
        let res = run_search(crate::FEN_STARTPOS, limits);
        assert!(res.bestmove.is_some());
        assert!(res.nodes < 200_000);
    }

    #[test]
    fn test_stop_flag_is_honored_immediately() {
        let position = Position::default();
        let mut cache = SearchCache::default();
        let stop = Arc::new(AtomicBool::new(true));
        let res = Search::new(
            position,
            Limits::default(),
            stop,
            &Evaluator,
            &NullLogger,
            &mut cache,
        )
        .run();

        // Even a pre-cancelled search proposes some legal move
        assert!(res.bestmove.is_some());
        assert_eq!(res.depth, 0);
    }

    #[test]
    fn test_finds_mate_in_two() {
        // 1. Kb6 Kb8 (forced) 2. Rh8#; no mate in one exists
        let res = run_search("k7/7R/8/1K6/8/8/8/8 w - - 0 1", depth_limited(4));
        assert!(res.score.is_mate());
        assert_eq!(res.score, Score::win_in(3));
    }
}
