//! Quiescence search: resolve captures (and early checks) so the static
//! evaluation is only ever taken on quiet positions.
//!
//! The search keeps descending while forcing moves exist, standing pat
//! on the static evaluation once the side to move is not in check.
//! Futility and SEE pruning discard captures that cannot raise alpha.
//!
//! Node and check status are compile-time parameters so the hot
//! null-window path carries none of the PV bookkeeping.

use crate::types::{
    is_capture, is_advanced_pawn_push, piece_value_eg, Board, Depth, Ply, Score, MAX_PLY,
    SCORE_KNOWN_WIN, SCORE_MATED_IN_MAX, EMPTY,
};
use super::node_types::NodeType;
use super::ordering::{captured_piece, OrderingContext, QMovePicker};
use super::see;
use super::tt::Bound;
use super::Worker;

pub fn qsearch<NT: NodeType, const IN_CHECK: bool>(
    worker: &mut Worker,
    board: &Board,
    ply: Ply,
    mut alpha: Score,
    beta: Score,
    depth: Depth,
) -> Score {
    debug_assert!(IN_CHECK == (*board.checkers() != EMPTY));
    debug_assert!(alpha < beta);
    debug_assert!(NT::PV || alpha == beta - 1);
    debug_assert!(depth.raw() <= 0);

    worker.visit_node();
    if NT::PV {
        worker.sel_depth = worker.sel_depth.max(ply.raw() + 1);
        worker.stack.at_mut(ply).pv.clear();
    }

    let old_alpha = alpha;

    // Draws and the ply horizon
    if worker.is_draw(board) || ply.raw() >= MAX_PLY {
        return if ply.raw() >= MAX_PLY && !IN_CHECK {
            worker.evaluate(board)
        } else {
            Score::draw()
        };
    }

    // Only two depth classes exist down here as far as the TT cares:
    // with and without checking moves
    let tt_depth = if IN_CHECK || depth >= Depth::QS_CHECKS {
        Depth::QS_CHECKS
    } else {
        Depth::QS_NO_CHECKS
    };

    let key = board.get_hash();
    let tte = worker.tt.probe(key);
    let tt_move = tte.and_then(|e| e.mv);
    let tt_value = tte.map(|e| e.value.from_tt(ply.raw()));

    if !NT::PV {
        if let (Some(entry), Some(value)) = (tte, tt_value) {
            if entry.depth >= tt_depth
                && !value.is_none()
                && if value >= beta {
                    entry.bound.is_lower()
                } else {
                    entry.bound.is_upper()
                }
            {
                return value;
            }
        }
    }

    let mut best_value;
    let mut futility_base;

    if IN_CHECK {
        worker.stack.at_mut(ply).static_eval = Score::none();
        best_value = Score::neg_infinity();
        futility_base = Score::neg_infinity();
    } else {
        let static_eval = match tte {
            Some(entry) if !entry.eval.is_none() => entry.eval,
            _ => {
                if worker.stack.at(ply - 1).null_move {
                    -worker.stack.at(ply - 1).static_eval + 2 * crate::eval::TEMPO
                } else {
                    worker.evaluate(board)
                }
            }
        };
        worker.stack.at_mut(ply).static_eval = static_eval;
        best_value = static_eval;

        // A TT value with the right bound is a better stand-pat
        if let (Some(entry), Some(value)) = (tte, tt_value) {
            if !value.is_none()
                && if value > best_value {
                    entry.bound.is_lower()
                } else {
                    entry.bound.is_upper()
                }
            {
                best_value = value;
            }
        }

        // Stand pat
        if best_value >= beta {
            if tte.is_none() {
                worker.tt.store(
                    key,
                    None,
                    best_value.to_tt(ply.raw()),
                    static_eval,
                    Depth::NONE,
                    Bound::Lower,
                );
            }
            return best_value;
        }

        if NT::PV && best_value > alpha {
            alpha = best_value;
        }

        futility_base = best_value + 128;
    }

    let mut picker = {
        let ctx = OrderingContext {
            side: board.side_to_move(),
            tt_move,
            killers: [None; 2],
            counter: None,
            butterfly: &worker.tables.butterfly,
            capture_history: &worker.tables.capture_history,
            cont_history: &worker.tables.cont_history,
            cont_keys: [
                worker.stack.cont_key_behind(ply, 1),
                worker.stack.cont_key_behind(ply, 2),
                worker.stack.cont_key_behind(ply, 4),
            ],
        };
        QMovePicker::new(board, &ctx, depth >= Depth::QS_CHECKS)
    };

    let mut best_move = None;
    let mut move_count = 0;

    while let Some(m) = picker.next() {
        move_count += 1;

        let child = board.make_move_new(m);
        let gives_check = *child.checkers() != EMPTY;

        // Futility pruning for captures that cannot close the gap
        if !IN_CHECK
            && !gives_check
            && futility_base > Score::cp(-SCORE_KNOWN_WIN)
            && !is_advanced_pawn_push(board, m)
        {
            let gain = captured_piece(board, m).map(piece_value_eg).unwrap_or(0);
            let futility_value = futility_base + gain;

            if futility_value <= alpha {
                best_value = best_value.max(futility_value);
                continue;
            }
            if futility_base <= alpha && !see::see_ge(board, m, 1) {
                best_value = best_value.max(futility_base);
                continue;
            }
        }

        // Late quiet evasions that lose material cannot rescue anything
        let evasion_prunable = IN_CHECK
            && (depth != Depth::ZERO || move_count > 2)
            && best_value > Score::cp(SCORE_MATED_IN_MAX)
            && !is_capture(board, m);

        if (!IN_CHECK || evasion_prunable) && !see::see_ge(board, m, 0) {
            continue;
        }

        worker.tt.prefetch(child.get_hash());

        {
            let frame = worker.stack.at_mut(ply);
            frame.current_move = Some(m);
            frame.null_move = false;
            frame.captured = captured_piece(board, m);
            frame.cont_key = Some(super::cont_key_of(board, m));
        }
        worker.push_position(&child, super::resets_rule50(board, m));

        let value = if gives_check {
            -qsearch::<NT, true>(worker, &child, ply.next(), -beta, -alpha, depth - 1)
        } else {
            -qsearch::<NT, false>(worker, &child, ply.next(), -beta, -alpha, depth - 1)
        };

        worker.pop_position();

        if value > best_value {
            best_value = value;

            if value > alpha {
                best_move = Some(m);

                if NT::PV {
                    worker.update_pv(ply, m);
                }
                if NT::PV && value < beta {
                    alpha = value;
                } else {
                    break; // Fail high
                }
            }
        }
    }

    // In check with no legal continuation searched: checkmate
    if IN_CHECK && best_value == Score::neg_infinity() {
        return Score::mated_in(ply.raw());
    }

    let bound = if best_value >= beta {
        Bound::Lower
    } else if NT::PV && best_value > old_alpha {
        Bound::Exact
    } else {
        Bound::Upper
    };
    worker.tt.store(
        key,
        best_move,
        best_value.to_tt(ply.raw()),
        worker.stack.at(ply).static_eval,
        tt_depth,
        bound,
    );

    debug_assert!(best_value.raw().abs() < crate::types::SCORE_INFINITY);
    best_value
}
