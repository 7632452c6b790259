//! Search module for the chess engine.
//!
//! # Architecture
//! - `Searcher`: the frontend-facing controller; owns the shared state
//!   and launches one search thread pool per `go`
//! - `Worker`: per-thread search state running iterative deepening with
//!   aspiration windows and MultiPV
//! - `alpha_beta` / `qsearch`: the recursive search itself
//! - `ordering`, `history`, `killers`, `countermove`: move ordering
//! - `tt`: shared lock-free transposition table
//! - `limits`: search limits and time management
//!
//! Parallel search is lazy SMP: every thread runs a full search of the
//! root position over the shared transposition table, desynchronized by
//! a per-thread schedule of skipped iteration depths.

pub mod alpha_beta;
pub mod countermove;
pub mod history;
pub mod killers;
pub mod limits;
pub mod node_types;
pub mod ordering;
pub mod qsearch;
pub mod see;
pub mod stack;
pub mod tt;

pub use limits::{SearchLimits, TimeManager};
pub use tt::TranspositionTable;

use crate::eval::nnue;
use crate::eval::pawns::PawnTable;
use crate::perft;
use crate::types::{
    Board, Depth, Move, MoveGen, Piece, Ply, Score, MAX_DEPTH, SCORE_MATE, SCORE_MATE_IN_MAX,
    EMPTY,
};
use crate::uci::format_move;
use countermove::CounterMoveTable;
use history::{piece_index, ButterflyHistory, CaptureHistory, ContinuationHistory};
use killers::KillerTable;
use node_types::Root;
use ordering::OrderingContext;
use stack::SearchStack;

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

// Sizes and phases of the skip blocks distributing search depths across
// the helper threads
const SKIP_SIZE: [i32; 20] = [1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4];
const SKIP_PHASE: [i32; 20] = [0, 1, 0, 1, 2, 3, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 6, 7];

// ============================================================================
// PRECOMPUTED TABLES
// ============================================================================

struct LookupTables {
    /// [pv][improving][depth][move number]
    reductions: Box<[[[[i32; 64]; 64]; 2]; 2]>,
    /// [improving][depth]
    futility_move_counts: [[u32; 16]; 2],
}

static TABLES: std::sync::OnceLock<LookupTables> = std::sync::OnceLock::new();

fn lookup_tables() -> &'static LookupTables {
    TABLES.get_or_init(|| {
        let mut reductions = Box::new([[[[0i32; 64]; 64]; 2]; 2]);
        for imp in 0..2 {
            for d in 1..64 {
                for mc in 1..64 {
                    let r = (d as f64).ln() * (mc as f64).ln() / 1.95;
                    let non_pv = r.round() as i32;
                    reductions[1][imp][d][mc] = (non_pv - 1).max(0);
                    // Reduce more at non-PV nodes when the eval is not
                    // improving
                    reductions[0][imp][d][mc] = if imp == 0 && non_pv >= 2 {
                        non_pv + 1
                    } else {
                        non_pv
                    };
                }
            }
        }

        let mut futility_move_counts = [[0u32; 16]; 2];
        for d in 0..16 {
            futility_move_counts[0][d] = (2.4 + 0.74 * (d as f64).powf(1.78)) as u32;
            futility_move_counts[1][d] = (5.0 + (d * d) as f64) as u32;
        }

        LookupTables {
            reductions,
            futility_move_counts,
        }
    })
}

/// One-time table precomputation, called at startup
pub fn init_tables() {
    let _ = lookup_tables();
}

/// Base late-move reduction in plies
#[inline]
pub fn reduction(pv: bool, improving: bool, depth: Depth, move_count: u32) -> i32 {
    let t = lookup_tables();
    t.reductions[pv as usize][improving as usize][(depth.raw() as usize).min(63)]
        [(move_count as usize).min(63)]
}

/// Move-count threshold for pruning the remaining quiet moves
#[inline]
pub fn futility_move_count(improving: bool, depth: Depth) -> u32 {
    lookup_tables().futility_move_counts[improving as usize][(depth.raw() as usize).min(15)]
}

// ============================================================================
// SMALL HELPERS SHARED BY THE SEARCH FUNCTIONS
// ============================================================================

/// Continuation-history key of a move: (moving piece index, to square)
#[inline]
pub fn cont_key_of(board: &Board, m: Move) -> (usize, usize) {
    let piece = board.piece_on(m.get_source()).unwrap_or(Piece::Pawn);
    (
        piece_index(board.side_to_move(), piece),
        m.get_dest().to_index(),
    )
}

/// Whether a move resets the 50-move counter
#[inline]
pub fn resets_rule50(board: &Board, m: Move) -> bool {
    crate::types::is_capture(board, m) || board.piece_on(m.get_source()) == Some(Piece::Pawn)
}

fn flush_stdout() {
    std::io::stdout().flush().ok();
}

// ============================================================================
// ROOT MOVES
// ============================================================================

/// One root move with its running score and principal variation
#[derive(Debug, Clone)]
pub struct RootMove {
    pub mv: Move,
    pub score: Score,
    pub previous_score: Score,
    pub sel_depth: i32,
    pub pv: Vec<Move>,
}

impl RootMove {
    fn new(mv: Move) -> Self {
        Self {
            mv,
            score: Score::neg_infinity(),
            previous_score: Score::neg_infinity(),
            sel_depth: 0,
            pv: vec![mv],
        }
    }
}

/// Stable sort by score, best first. Stability keeps the previous
/// iteration's order for all moves whose score was reset.
fn sort_root_moves(moves: &mut [RootMove]) {
    moves.sort_by(|a, b| b.score.cmp(&a.score));
}

// ============================================================================
// PER-THREAD STATE
// ============================================================================

/// Heuristic tables that persist for the lifetime of a search thread.
/// Cleared on `ucinewgame`, kept across `go` commands.
pub struct SearchTables {
    pub butterfly: ButterflyHistory,
    pub capture_history: CaptureHistory,
    pub cont_history: ContinuationHistory,
    pub counters: CounterMoveTable,
    pub pawn_table: PawnTable,
}

impl SearchTables {
    pub fn new() -> Self {
        Self {
            butterfly: ButterflyHistory::new(),
            capture_history: CaptureHistory::new(),
            cont_history: ContinuationHistory::new(),
            counters: CounterMoveTable::new(),
            pawn_table: PawnTable::new(),
        }
    }

    pub fn clear(&mut self) {
        self.butterfly.clear();
        self.capture_history.clear();
        self.cont_history.clear();
        self.counters.clear();
        self.pawn_table.clear();
    }
}

impl Default for SearchTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the worker threads share for one `go`
pub struct SharedContext {
    pub tt: Arc<TranspositionTable>,
    pub stop: Arc<AtomicBool>,
    pub ponder: Arc<AtomicBool>,
    pub stop_on_ponderhit: Arc<AtomicBool>,
    pub nodes: Arc<AtomicU64>,
    pub board: Board,
    /// Zobrist keys of the game so far, root position included
    pub game_keys: Vec<u64>,
    pub root_rule50: u32,
    pub game_ply: i32,
    pub limits: SearchLimits,
    pub multipv: usize,
    pub nnue: Option<nnue::Model>,
    pub root_moves: Vec<Move>,
    pub start: Instant,
}

/// Per-thread search state
pub struct Worker<'a> {
    pub id: usize,
    pub is_main: bool,
    pub tables: &'a mut SearchTables,
    pub tt: &'a TranspositionTable,
    shared: &'a SharedContext,

    pub stack: SearchStack,
    pub killers: KillerTable,
    path_keys: Vec<u64>,
    rule50s: Vec<u32>,
    pub nodes: u64,
    pub sel_depth: i32,
    pub root_depth: Depth,
    pub completed_depth: Depth,
    pub root_moves: Vec<RootMove>,
    pub pv_idx: usize,
    pub nmp_ply: i32,
    pub nmp_odd: i32,
    time: TimeManager,
}

impl<'a> Worker<'a> {
    fn new(id: usize, tables: &'a mut SearchTables, shared: &'a SharedContext) -> Self {
        let time = TimeManager::from_limits(&shared.limits, shared.board.side_to_move());
        Worker {
            id,
            is_main: id == 0,
            tables,
            tt: shared.tt.as_ref(),
            shared,
            stack: SearchStack::new(),
            killers: KillerTable::new(),
            path_keys: vec![shared.board.get_hash()],
            rule50s: vec![shared.root_rule50],
            nodes: 0,
            sel_depth: 0,
            root_depth: Depth::ZERO,
            completed_depth: Depth::ZERO,
            root_moves: shared.root_moves.iter().map(|&m| RootMove::new(m)).collect(),
            pv_idx: 0,
            nmp_ply: 0,
            nmp_odd: 0,
            time,
        }
    }

    // --- bookkeeping used by the search functions ---

    #[inline]
    pub fn visit_node(&mut self) {
        self.nodes += 1;
        if self.nodes % 1024 == 0 {
            self.shared.nodes.fetch_add(1024, Ordering::Relaxed);
        }
        if self.is_main && self.nodes % 4096 == 0 {
            self.check_time();
        }
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.shared.start.elapsed().as_millis() as u64
    }

    /// Time, node and movetime limits; polled by the main thread about
    /// every 4096 nodes
    fn check_time(&self) {
        // While pondering the GUI owns the clock
        if self.shared.ponder.load(Ordering::Relaxed) {
            return;
        }

        let elapsed = self.elapsed_ms();
        let out_of_time = self.time.out_of_maximum(elapsed);
        let out_of_nodes = self
            .shared
            .limits
            .nodes
            .map_or(false, |n| self.global_nodes() >= n);

        if out_of_time || out_of_nodes {
            self.shared.stop.store(true, Ordering::Release);
        }
    }

    pub fn global_nodes(&self) -> u64 {
        self.shared.nodes.load(Ordering::Relaxed) + self.nodes % 1024
    }

    pub fn evaluate(&mut self, board: &Board) -> Score {
        crate::eval::evaluate(
            board,
            &mut self.tables.pawn_table,
            self.shared.nnue.as_ref(),
            *self.rule50s.last().unwrap(),
            self.nodes,
        )
    }

    pub fn push_position(&mut self, board: &Board, resets_rule50: bool) {
        self.path_keys.push(board.get_hash());
        let r = if resets_rule50 {
            0
        } else {
            self.rule50s.last().unwrap() + 1
        };
        self.rule50s.push(r);
    }

    pub fn pop_position(&mut self) {
        self.path_keys.pop();
        self.rule50s.pop();
    }

    /// Draw by 50-move rule, insufficient material, or repetition.
    ///
    /// Any repetition within the search path scores as a draw; against
    /// the game history the position must occur for the third time.
    pub fn is_draw(&self, board: &Board) -> bool {
        if *self.rule50s.last().unwrap() >= 100 && *board.checkers() == EMPTY {
            return true;
        }

        if insufficient_material(board) {
            return true;
        }

        let key = board.get_hash();
        let path = &self.path_keys[..self.path_keys.len() - 1];
        if path.contains(&key) {
            return true;
        }
        self.shared.game_keys.iter().filter(|&&k| k == key).count() >= 2
    }

    /// Build the ordering context for a node
    pub fn ordering_context(
        &self,
        board: &Board,
        ply: Ply,
        tt_move: Option<Move>,
    ) -> OrderingContext<'_> {
        let us = board.side_to_move();
        let counter = self.stack.at(ply - 1).current_move.and_then(|pm| {
            board.piece_on(pm.get_dest()).and_then(|p| {
                self.tables
                    .counters
                    .get(piece_index(!us, p), pm.get_dest().to_index())
            })
        });

        OrderingContext {
            side: us,
            tt_move,
            killers: self.killers.get(ply),
            counter,
            butterfly: &self.tables.butterfly,
            capture_history: &self.tables.capture_history,
            cont_history: &self.tables.cont_history,
            cont_keys: [
                self.stack.cont_key_behind(ply, 1),
                self.stack.cont_key_behind(ply, 2),
                self.stack.cont_key_behind(ply, 4),
            ],
        }
    }

    /// Prepend a move to the PV collected at the child ply
    pub fn update_pv(&mut self, ply: Ply, m: Move) {
        let child_pv = self.stack.at(ply + 1).pv.clone();
        let frame = self.stack.at_mut(ply);
        frame.pv.clear();
        frame.pv.push(m);
        frame.pv.extend(child_pv);
    }

    // --- history feedback ---

    /// Update the continuation histories 1, 2 and 4 plies behind `ply`
    pub fn update_continuation_histories(&mut self, ply: Ply, pc: usize, to: usize, bonus: i32) {
        for offset in [1, 2, 4] {
            if let Some(prev) = self.stack.cont_key_behind(ply, offset) {
                self.tables.cont_history.update(prev, pc, to, bonus);
            }
        }
    }

    /// A quiet move produced a beta cutoff: promote it everywhere and
    /// demote the quiets searched before it
    pub fn update_quiet_stats(
        &mut self,
        board: &Board,
        ply: Ply,
        m: Move,
        quiets: &[Move],
        bonus: i32,
    ) {
        let us = board.side_to_move();
        self.killers.store(ply, m);
        self.tables.butterfly.update(us, m, bonus);
        let (pc, to) = cont_key_of(board, m);
        self.update_continuation_histories(ply, pc, to, bonus);

        if let Some(pm) = self.stack.at(ply - 1).current_move {
            if let Some(p) = board.piece_on(pm.get_dest()) {
                self.tables
                    .counters
                    .store(piece_index(!us, p), pm.get_dest().to_index(), m);
            }
        }

        for &q in quiets {
            self.tables.butterfly.update(us, q, -bonus);
            let (pc, to) = cont_key_of(board, q);
            self.update_continuation_histories(ply, pc, to, -bonus);
        }
    }

    /// A capture became the best move: update the capture history
    pub fn update_capture_stats(
        &mut self,
        board: &Board,
        m: Move,
        captures: &[Move],
        bonus: i32,
    ) {
        let us = board.side_to_move();
        let mut apply = |mv: Move, b: i32| {
            let piece = board.piece_on(mv.get_source()).unwrap_or(Piece::Pawn);
            let captured = ordering::captured_piece(board, mv).unwrap_or(Piece::Pawn);
            self.tables.capture_history.update(
                piece_index(us, piece),
                mv.get_dest().to_index(),
                captured,
                b,
            );
        };
        apply(m, bonus);
        for &c in captures {
            apply(c, -bonus);
        }
    }

    /// Penalize the opponent's previous move via continuation history
    pub fn penalize_prior_move(
        &mut self,
        board: &Board,
        ply: Ply,
        prev_sq: Option<crate::types::Square>,
        bonus: i32,
    ) {
        if let Some(sq) = prev_sq {
            if let Some(p) = board.piece_on(sq) {
                let pc = piece_index(!board.side_to_move(), p);
                self.update_continuation_histories(ply - 1, pc, sq.to_index(), -bonus);
            }
        }
    }

    /// Reward the opponent's previous move (it forced our fail low)
    pub fn reward_prior_move(
        &mut self,
        board: &Board,
        ply: Ply,
        prev_sq: Option<crate::types::Square>,
        bonus: i32,
    ) {
        if let Some(sq) = prev_sq {
            if let Some(p) = board.piece_on(sq) {
                let pc = piece_index(!board.side_to_move(), p);
                self.update_continuation_histories(ply - 1, pc, sq.to_index(), bonus);
            }
        }
    }

    // --- root move handling ---

    /// True while `m` still has to be searched for the current PV index
    pub fn root_move_pending(&self, m: Move) -> bool {
        self.root_moves[self.pv_idx..].iter().any(|rm| rm.mv == m)
    }

    /// Record the result of one searched root move
    pub fn commit_root_move(
        &mut self,
        m: Move,
        value: Score,
        move_count: u32,
        improved_alpha: bool,
        ply: Ply,
    ) {
        let pv = if move_count == 1 || improved_alpha {
            let mut pv = vec![m];
            pv.extend(self.stack.at(ply + 1).pv.iter().copied());
            Some(pv)
        } else {
            None
        };
        let sel_depth = self.sel_depth;

        let rm = self
            .root_moves
            .iter_mut()
            .find(|rm| rm.mv == m)
            .expect("searched move must be a root move");

        match pv {
            Some(pv) => {
                rm.score = value;
                rm.sel_depth = sel_depth;
                rm.pv = pv;
            }
            // Other moves keep their slot but sort behind every scored
            // move until they improve alpha
            None => rm.score = Score::neg_infinity(),
        }
    }

    // --- the iterative deepening loop ---

    pub fn iterative_deepening(&mut self) {
        let board = self.shared.board.clone();
        let multipv = self.shared.multipv.min(self.root_moves.len());
        let mut best_value = Score::neg_infinity();

        loop {
            self.root_depth += 1;
            if self.root_depth.raw() >= MAX_DEPTH || self.should_stop() {
                break;
            }
            if let Some(limit) = self.shared.limits.depth {
                if self.is_main && self.root_depth > limit {
                    break;
                }
            }

            // Helper threads skip a staggered subset of depths so the
            // pool explores different horizons concurrently
            if self.id > 0 {
                let i = (self.id - 1) % 20;
                if ((self.root_depth.raw() + self.shared.game_ply + SKIP_PHASE[i]) / SKIP_SIZE[i])
                    % 2
                    != 0
                {
                    continue;
                }
            }

            for rm in self.root_moves.iter_mut() {
                rm.previous_score = rm.score;
            }

            for pv_idx in 0..multipv {
                if self.should_stop() {
                    break;
                }
                self.pv_idx = pv_idx;
                self.sel_depth = 0;

                // Aspiration window around the previous score
                let mut delta = Score::infinity();
                let mut alpha = Score::neg_infinity();
                let mut beta = Score::infinity();
                if self.root_depth.raw() >= 5 {
                    delta = Score::cp(18);
                    let prev = self.root_moves[pv_idx].previous_score;
                    alpha = (prev - delta).max(Score::neg_infinity());
                    beta = (prev + delta).min(Score::infinity());
                }

                loop {
                    best_value = alpha_beta::search::<Root>(
                        self,
                        &board,
                        Ply::ZERO,
                        alpha,
                        beta,
                        self.root_depth,
                        false,
                        false,
                    );

                    sort_root_moves(&mut self.root_moves[pv_idx..]);

                    if self.should_stop() {
                        break;
                    }

                    if self.is_main
                        && multipv == 1
                        && (best_value <= alpha || best_value >= beta)
                        && self.elapsed_ms() > 3000
                    {
                        self.print_pv(self.root_depth, alpha, beta);
                    }

                    // Widen the window on fail high/low and search again
                    if best_value <= alpha {
                        beta = Score::cp((alpha.raw() + beta.raw()) / 2);
                        alpha = (best_value - delta).max(Score::neg_infinity());
                        if self.is_main {
                            self.shared
                                .stop_on_ponderhit
                                .store(false, Ordering::Relaxed);
                        }
                    } else if best_value >= beta {
                        beta = (best_value + delta).min(Score::infinity());
                    } else {
                        break;
                    }

                    delta = delta + Score::cp(delta.raw() / 4 + 5);
                    debug_assert!(alpha >= Score::neg_infinity() && beta <= Score::infinity());
                }

                sort_root_moves(&mut self.root_moves[..=pv_idx]);

                if self.is_main
                    && (self.should_stop() || pv_idx + 1 == multipv || self.elapsed_ms() > 3000)
                {
                    self.print_pv(self.root_depth, alpha, beta);
                }
            }

            if !self.should_stop() {
                self.completed_depth = self.root_depth;
            }

            // A mate search is done once the requested distance shows up
            if let Some(mate) = self.shared.limits.mate {
                if best_value >= Score::cp(SCORE_MATE_IN_MAX)
                    && SCORE_MATE - best_value.raw() <= 2 * mate as i32
                {
                    self.shared.stop.store(true, Ordering::Release);
                }
            }

            if !self.is_main {
                continue;
            }

            // Time management between iterations
            if self.shared.limits.use_time_management()
                && !self.should_stop()
                && !self.shared.stop_on_ponderhit.load(Ordering::Relaxed)
            {
                let done = self.root_moves.len() == 1
                    || self.time.out_of_optimum(self.elapsed_ms());
                if done {
                    // While pondering we may not act on the clock until
                    // the GUI releases us
                    if self.shared.ponder.load(Ordering::Relaxed) {
                        self.shared.stop_on_ponderhit.store(true, Ordering::Relaxed);
                    } else {
                        self.shared.stop.store(true, Ordering::Release);
                    }
                }
            }
        }

        // Flush remaining local nodes into the global counter
        self.shared
            .nodes
            .fetch_add(self.nodes % 1024, Ordering::Relaxed);
    }

    /// Emit `info` lines for every MultiPV line searched so far
    fn print_pv(&self, depth: Depth, alpha: Score, beta: Score) {
        let elapsed = self.elapsed_ms() + 1;
        let nodes = self.shared.nodes.load(Ordering::Relaxed) + self.nodes % 1024;
        let multipv = self.shared.multipv.min(self.root_moves.len());

        for i in 0..multipv {
            let updated = i <= self.pv_idx && self.root_moves[i].score != Score::neg_infinity();
            if depth.raw() == 1 && !updated {
                continue;
            }

            let d = if updated { depth } else { depth - 1 };
            if d.raw() <= 0 {
                continue;
            }
            let v = if updated {
                self.root_moves[i].score
            } else {
                self.root_moves[i].previous_score
            };

            let bound = if i == self.pv_idx {
                if v >= beta {
                    " lowerbound"
                } else if v <= alpha {
                    " upperbound"
                } else {
                    ""
                }
            } else {
                ""
            };

            let pv: Vec<String> = self.root_moves[i].pv.iter().map(|&m| format_move(m)).collect();
            let mut line = format!(
                "info depth {} seldepth {} multipv {} score {}{} nodes {} nps {}",
                d.raw(),
                self.root_moves[i].sel_depth,
                i + 1,
                v,
                bound,
                nodes,
                nodes * 1000 / elapsed,
            );
            if elapsed > 1000 {
                line.push_str(&format!(" hashfull {}", self.tt.hashfull()));
            }
            line.push_str(&format!(" time {} pv {}", elapsed, pv.join(" ")));
            println!("{}", line);
        }
        flush_stdout();
    }
}

/// King versus king, or king and one minor versus king
fn insufficient_material(board: &Board) -> bool {
    if *board.pieces(Piece::Pawn) != EMPTY
        || *board.pieces(Piece::Rook) != EMPTY
        || *board.pieces(Piece::Queen) != EMPTY
    {
        return false;
    }
    (*board.pieces(Piece::Knight) | *board.pieces(Piece::Bishop)).popcnt() <= 1
}

// ============================================================================
// THE COORDINATOR
// ============================================================================

/// Result handed back to the frontend once a search finishes
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub best_move: Option<Move>,
    pub ponder: Option<Move>,
    pub pv: Vec<Move>,
    pub score: Score,
    pub depth: Depth,
    pub nodes: u64,
}

/// Frontend-facing search controller.
///
/// Owns the transposition table and the persistent per-thread tables;
/// every `go` spawns a coordinator thread that runs the pool and prints
/// the protocol output, so the caller stays responsive to `stop`.
pub struct Searcher {
    pub tt: Arc<TranspositionTable>,
    tables: Arc<Mutex<Vec<SearchTables>>>,
    stop: Arc<AtomicBool>,
    ponder: Arc<AtomicBool>,
    stop_on_ponderhit: Arc<AtomicBool>,
    nodes: Arc<AtomicU64>,
    pub threads: usize,
    pub multipv: usize,
    pub nnue: Option<nnue::Model>,
    handle: Option<thread::JoinHandle<Option<SearchReport>>>,
}

impl Searcher {
    pub fn new(hash_mb: usize) -> Self {
        init_tables();
        Self {
            tt: Arc::new(TranspositionTable::new(hash_mb)),
            tables: Arc::new(Mutex::new(vec![SearchTables::new()])),
            stop: Arc::new(AtomicBool::new(false)),
            ponder: Arc::new(AtomicBool::new(false)),
            stop_on_ponderhit: Arc::new(AtomicBool::new(false)),
            nodes: Arc::new(AtomicU64::new(0)),
            threads: 1,
            multipv: 1,
            nnue: None,
            handle: None,
        }
    }

    pub fn set_threads(&mut self, n: usize) {
        self.threads = n.clamp(1, 256);
    }

    pub fn resize_hash(&mut self, mb: usize) {
        self.wait();
        self.tt = Arc::new(TranspositionTable::new(mb));
    }

    /// Signal every running worker to stop
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// The GUI played the expected move: keep the search but give it
    /// back its clock
    pub fn ponderhit(&self) {
        self.ponder.store(false, Ordering::Relaxed);
        if self.stop_on_ponderhit.load(Ordering::Relaxed) {
            self.stop();
        }
    }

    /// Block until the current search (if any) has finished
    pub fn wait(&mut self) -> Option<SearchReport> {
        self.handle.take().and_then(|h| h.join().ok()).flatten()
    }

    /// Reset all search state between games
    pub fn clear(&mut self) {
        self.stop();
        self.wait();
        self.tt.clear();
        for tables in self.tables.lock().unwrap().iter_mut() {
            tables.clear();
        }
    }

    /// Start searching. Returns immediately; output is printed by the
    /// coordinator thread and the report is available via `wait`.
    pub fn go(
        &mut self,
        board: Board,
        game_keys: Vec<u64>,
        root_rule50: u32,
        game_ply: i32,
        limits: SearchLimits,
    ) {
        self.stop();
        self.wait();

        self.stop.store(false, Ordering::Release);
        self.ponder.store(limits.ponder, Ordering::Relaxed);
        self.stop_on_ponderhit.store(false, Ordering::Relaxed);
        self.nodes.store(0, Ordering::Relaxed);
        self.tt.new_search();

        {
            let mut tables = self.tables.lock().unwrap();
            tables.resize_with(self.threads, SearchTables::new);
        }

        // Restrict the root when `searchmoves` was given
        let root_moves: Vec<Move> = MoveGen::new_legal(&board)
            .filter(|m| {
                limits.searchmoves.is_empty()
                    || limits.searchmoves.contains(&format_move(*m))
            })
            .collect();

        let ctx = SharedContext {
            tt: Arc::clone(&self.tt),
            stop: Arc::clone(&self.stop),
            ponder: Arc::clone(&self.ponder),
            stop_on_ponderhit: Arc::clone(&self.stop_on_ponderhit),
            nodes: Arc::clone(&self.nodes),
            board,
            game_keys,
            root_rule50,
            game_ply,
            limits,
            multipv: self.multipv,
            nnue: self.nnue.clone(),
            root_moves,
            start: Instant::now(),
        };
        let tables = Arc::clone(&self.tables);
        let threads = self.threads;

        self.handle = Some(thread::spawn(move || coordinate(ctx, tables, threads)));
    }
}

impl Drop for Searcher {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

/// The main search thread: spawns the helpers, searches, picks the best
/// thread and prints `bestmove`
fn coordinate(
    ctx: SharedContext,
    tables: Arc<Mutex<Vec<SearchTables>>>,
    threads: usize,
) -> Option<SearchReport> {
    if let Some(depth) = ctx.limits.perft {
        let nodes = perft::divide(&ctx.board, depth);
        println!("\nNodes searched: {}", nodes);
        flush_stdout();
        return None;
    }

    // Degenerate root: no legal move to report
    if ctx.root_moves.is_empty() {
        let score = if *ctx.board.checkers() != EMPTY {
            Score::mated_in(0)
        } else {
            Score::draw()
        };
        println!("info depth 0 score {}", score);
        println!("bestmove 0000");
        flush_stdout();
        return Some(SearchReport {
            best_move: None,
            ponder: None,
            pv: Vec::new(),
            score,
            depth: Depth::ZERO,
            nodes: 0,
        });
    }

    let mut pool = tables.lock().unwrap();
    debug_assert!(pool.len() >= threads);

    let (completed_depth, root_moves) = thread::scope(|s| {
        let (main_tables, helper_tables) = pool.split_first_mut().expect("tables for every thread");

        let mut handles = Vec::new();
        for (i, tbl) in helper_tables.iter_mut().take(threads - 1).enumerate() {
            let ctx = &ctx;
            handles.push(s.spawn(move || {
                let mut worker = Worker::new(i + 1, tbl, ctx);
                worker.iterative_deepening();
                (worker.completed_depth, worker.root_moves)
            }));
        }

        let mut main_worker = Worker::new(0, main_tables, &ctx);
        main_worker.iterative_deepening();

        // The protocol forbids printing bestmove while pondering or in
        // an infinite search, so wait for the GUI here
        ctx.stop_on_ponderhit.store(true, Ordering::Relaxed);
        while !ctx.stop.load(Ordering::Acquire)
            && (ctx.ponder.load(Ordering::Relaxed) || ctx.limits.infinite)
        {
            thread::sleep(std::time::Duration::from_millis(1));
        }
        ctx.stop.store(true, Ordering::Release);

        let mut best = (main_worker.completed_depth, main_worker.root_moves);
        for handle in handles {
            let (depth, root_moves) = handle.join().expect("worker panicked");

            // Prefer another thread only for a strictly better score
            // backed by equal depth or a proven mate
            if ctx.multipv == 1
                && root_moves[0].score > best.1[0].score
                && (depth >= best.0 || root_moves[0].score >= Score::cp(SCORE_MATE_IN_MAX))
            {
                best = (depth, root_moves);
            }
        }
        best
    });
    drop(pool);

    let best_root = &root_moves[0];
    let best_move = best_root.mv;

    // Report the chosen line and the best move
    let nodes = ctx.nodes.load(Ordering::Relaxed);
    let elapsed = ctx.start.elapsed().as_millis().max(1) as u64;
    let pv: Vec<String> = best_root.pv.iter().map(|&m| format_move(m)).collect();
    println!(
        "info depth {} seldepth {} multipv 1 score {} nodes {} nps {} time {} pv {}",
        completed_depth.raw(),
        best_root.sel_depth,
        best_root.score,
        nodes,
        nodes * 1000 / elapsed,
        elapsed,
        pv.join(" ")
    );

    let ponder = ponder_move(&ctx, best_root);
    match ponder {
        Some(p) => println!("bestmove {} ponder {}", format_move(best_move), format_move(p)),
        None => println!("bestmove {}", format_move(best_move)),
    }
    flush_stdout();

    Some(SearchReport {
        best_move: Some(best_move),
        ponder,
        pv: best_root.pv.clone(),
        score: best_root.score,
        depth: completed_depth,
        nodes,
    })
}

/// Second PV move, falling back to a TT probe of the position after the
/// best move (a stopped fail-high search can leave a one-move PV)
fn ponder_move(ctx: &SharedContext, best: &RootMove) -> Option<Move> {
    if best.pv.len() > 1 {
        return Some(best.pv[1]);
    }
    let after = ctx.board.make_move_new(best.pv[0]);
    let reply = ctx.tt.probe(after.get_hash()).and_then(|e| e.mv)?;
    if after.legal(reply) {
        Some(reply)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn run_search(fen: &str, limits: SearchLimits) -> SearchReport {
        let board = Board::from_str(fen).unwrap();
        let keys = vec![board.get_hash()];
        let mut searcher = Searcher::new(16);
        searcher.go(board, keys, 0, 0, limits);
        searcher.wait().expect("report")
    }

    #[test]
    fn test_reduction_tables_are_monotonic_in_move_count() {
        init_tables();
        let d = Depth::new(12);
        assert!(reduction(false, true, d, 30) >= reduction(false, true, d, 3));
        // PV nodes reduce less than non-PV nodes
        assert!(reduction(true, true, d, 20) <= reduction(false, true, d, 20));
    }

    #[test]
    fn test_futility_move_counts_grow_with_depth() {
        init_tables();
        assert!(futility_move_count(true, Depth::new(8)) > futility_move_count(true, Depth::new(2)));
        assert!(
            futility_move_count(true, Depth::new(5)) > futility_move_count(false, Depth::new(5))
        );
    }

    #[test]
    fn test_finds_mate_in_one() {
        let report = run_search(
            "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5Q2/PPPP1PPP/RNB1K1NR w KQkq - 2 3",
            SearchLimits::depth(4),
        );
        assert_eq!(
            report.best_move.map(crate::uci::format_move).as_deref(),
            Some("f3f7")
        );
        assert!(report.score.is_mate());
        assert_eq!(report.score.mate_distance(), Some(1));
    }

    #[test]
    fn test_stalemate_root_reports_draw() {
        // White to move has no legal moves: g2 pawn covers f1/h1, the
        // black king covers the rest
        let report = run_search("8/8/8/8/8/6k1/6p1/6K1 w - - 0 1", SearchLimits::depth(10));
        assert!(report.best_move.is_none());
        assert_eq!(report.score, Score::draw());
    }

    #[test]
    fn test_depth_one_start_position() {
        let report = run_search(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            SearchLimits::depth(1),
        );
        let best = report.best_move.expect("a legal best move");
        let board = Board::default();
        assert!(MoveGen::new_legal(&board).any(|m| m == best));
        assert!(report.score.raw().abs() <= 100);
    }

    #[test]
    fn test_repetition_is_draw() {
        // Shuffling knights back and forth from the start position must
        // read as a repetition draw inside the search path
        let board = Board::default();
        let mut keys = vec![board.get_hash()];
        let moves = ["g1f3", "g8f6", "f3g1", "f6g8"];
        let mut b = board;
        for m in moves {
            let mv = crate::uci::parse_move(&b, m).unwrap();
            b = b.make_move_new(mv);
            keys.push(b.get_hash());
        }
        // Position equals the start position for the second time; one
        // more shuffle is the third occurrence
        let mut searcher = Searcher::new(16);
        searcher.go(b, keys, 4, 4, SearchLimits::depth(6));
        let report = searcher.wait().expect("report");
        // The engine must not think it is winning anything here
        assert!(report.score.raw().abs() < 200);
    }

    #[test]
    fn test_stop_is_prompt() {
        let board = Board::default();
        let mut searcher = Searcher::new(16);
        searcher.go(
            board,
            vec![board.get_hash()],
            0,
            0,
            SearchLimits::infinite(),
        );
        std::thread::sleep(std::time::Duration::from_millis(300));
        let t = Instant::now();
        searcher.stop();
        let report = searcher.wait().expect("report");
        assert!(t.elapsed().as_millis() < 1000, "stop took too long");
        assert!(report.best_move.is_some());
    }

    #[test]
    fn test_two_threads_complete() {
        let board = Board::default();
        let mut searcher = Searcher::new(16);
        searcher.set_threads(2);
        searcher.go(
            board,
            vec![board.get_hash()],
            0,
            0,
            SearchLimits::depth(6),
        );
        let report = searcher.wait().expect("report");
        assert!(report.best_move.is_some());
        assert!(report.depth.raw() >= 1);
    }
}
