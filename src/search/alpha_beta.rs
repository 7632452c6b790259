//! The main alpha-beta search.
//!
//! A fail-soft PVS driver with the full pruning and extension pipeline:
//! mate distance pruning, transposition cutoffs, razoring, reverse
//! futility, null move with verification, ProbCut, internal iterative
//! deepening, singular extensions, shallow-depth move pruning and late
//! move reductions. Node types are compile-time parameters so the
//! null-window path stays free of PV bookkeeping.
//!
//! Step numbers in the comments follow the classic layout of the
//! algorithm so the pipeline stays recognizable.

use crate::types::{
    is_advanced_pawn_push, is_capture_or_promotion, non_pawn_material, non_pawn_material_total,
    Board, Depth, Move, Piece, Ply, Score, MAX_PLY, PAWN_EG, PAWN_MG, SCORE_KNOWN_WIN,
    SCORE_MATED_IN_MAX, SCORE_MATE_IN_MAX, EMPTY,
};
use super::history::{piece_index, stat_bonus, COUNTER_MOVE_PRUNE_THRESHOLD};
use super::node_types::{NodeType, NonPv, Pv};
use super::ordering::{captured_piece, MovePicker, QMovePicker};
use super::qsearch::qsearch;
use super::see;
use super::tt::{encode_move, Bound};
use super::{cont_key_of, futility_move_count, reduction, resets_rule50, Worker};

const RAZOR_MARGIN: i32 = 600;

#[inline]
fn futility_margin(depth: Depth) -> i32 {
    150 * depth.raw()
}

#[inline]
fn is_castle(board: &Board, m: Move) -> bool {
    board.piece_on(m.get_source()) == Some(Piece::King)
        && (m.get_source().get_file().to_index() as i32
            - m.get_dest().get_file().to_index() as i32)
            .abs()
            == 2
}

pub fn search<NT: NodeType>(
    worker: &mut Worker,
    board: &Board,
    ply: Ply,
    mut alpha: Score,
    mut beta: Score,
    depth: Depth,
    cut_node: bool,
    skip_early_pruning: bool,
) -> Score {
    debug_assert!(Score::neg_infinity() <= alpha && alpha < beta && beta <= Score::infinity());
    debug_assert!(NT::PV || alpha == beta - 1);
    debug_assert!(depth.raw() > 0 && depth.raw() < MAX_PLY);
    debug_assert!(!(NT::PV && cut_node));

    let in_check = *board.checkers() != EMPTY;
    let us = board.side_to_move();

    // Step 1. Initialize node
    worker.visit_node();
    {
        let frame = worker.stack.at_mut(ply);
        frame.move_count = 0;
        frame.stat_score = 0;
    }

    if NT::PV {
        worker.sel_depth = worker.sel_depth.max(ply.raw() + 1);
    }

    if !NT::ROOT {
        // Step 2. Aborted search and immediate draw
        if worker.should_stop() || worker.is_draw(board) || ply.raw() >= MAX_PLY {
            return if ply.raw() >= MAX_PLY && !in_check {
                worker.evaluate(board)
            } else {
                Score::draw()
            };
        }

        // Step 3. Mate distance pruning: even an immediate mate here
        // cannot beat a shorter mate already found above us
        alpha = alpha.max(Score::mated_in(ply.raw()));
        beta = beta.min(Score::mate_in(ply.raw() + 1));
        if alpha >= beta {
            return alpha;
        }
    }

    worker.stack.at_mut(ply + 1).excluded_move = None;
    worker.killers.clear_ply(ply + 2);

    let prev_move = worker.stack.at(ply - 1).current_move;
    let prev_sq = prev_move.map(|m| m.get_dest());

    // Step 4. Transposition table lookup. A search with an excluded move
    // must not share its slot with the full-width search of the node.
    let excluded = worker.stack.at(ply).excluded_move;
    let key = board.get_hash() ^ ((encode_move(excluded) as u64) << 16);
    let mut tte = worker.tt.probe(key);
    let tt_value = tte.map(|e| e.value.from_tt(ply.raw()));
    let mut tt_move = if NT::ROOT {
        Some(worker.root_moves[worker.pv_idx].mv)
    } else {
        tte.and_then(|e| e.mv)
    };

    // Step 5. Early TT cutoff at non-PV nodes
    if !NT::PV {
        if let (Some(entry), Some(value)) = (tte, tt_value) {
            if entry.depth >= depth
                && !value.is_none()
                && if value >= beta {
                    entry.bound.is_lower()
                } else {
                    entry.bound.is_upper()
                }
            {
                // Keep the move ordering statistics in sync even when
                // the node is cut off from the table
                if let Some(m) = tt_move {
                    if value >= beta {
                        if !is_capture_or_promotion(board, m) {
                            worker.update_quiet_stats(board, ply, m, &[], stat_bonus(depth));
                        }
                        if worker.stack.at(ply - 1).move_count == 1
                            && worker.stack.at(ply - 1).captured.is_none()
                        {
                            worker.penalize_prior_move(board, ply, prev_sq, stat_bonus(depth + 1));
                        }
                    } else if !is_capture_or_promotion(board, m) {
                        let penalty = -stat_bonus(depth);
                        worker.tables.butterfly.update(us, m, penalty);
                        let (pc, to) = cont_key_of(board, m);
                        worker.update_continuation_histories(ply, pc, to, penalty);
                    }
                }
                return value;
            }
        }
    }

    // Step 6. Static evaluation
    let mut eval = Score::none();
    if in_check {
        worker.stack.at_mut(ply).static_eval = Score::none();
    } else {
        if let Some(entry) = tte {
            let static_eval = if entry.eval.is_none() {
                worker.evaluate(board)
            } else {
                entry.eval
            };
            worker.stack.at_mut(ply).static_eval = static_eval;
            eval = static_eval;

            // The table value is a tighter estimate when its bound fits
            if let Some(value) = tt_value {
                if !value.is_none()
                    && if value > eval {
                        entry.bound.is_lower()
                    } else {
                        entry.bound.is_upper()
                    }
                {
                    eval = value;
                }
            }
        } else {
            let static_eval = if worker.stack.at(ply - 1).null_move {
                -worker.stack.at(ply - 1).static_eval + 2 * crate::eval::TEMPO
            } else {
                worker.evaluate(board)
            };
            worker.stack.at_mut(ply).static_eval = static_eval;
            eval = static_eval;

            // Leave the static eval behind for sibling nodes
            worker
                .tt
                .store(key, None, Score::none(), static_eval, Depth::NONE, Bound::None);
        }

        if !skip_early_pruning && non_pawn_material(board, us) > 0 {
            // Step 7. Razoring: a hopeless eval at low depth drops
            // straight into quiescence for confirmation
            if !NT::PV && depth.raw() < 4 && eval + RAZOR_MARGIN <= alpha {
                if depth.raw() <= 1 {
                    return qsearch::<NonPv, false>(
                        worker,
                        board,
                        ply,
                        alpha,
                        alpha + 1,
                        Depth::ZERO,
                    );
                }
                let ralpha = alpha - RAZOR_MARGIN;
                let v =
                    qsearch::<NonPv, false>(worker, board, ply, ralpha, ralpha + 1, Depth::ZERO);
                if v <= ralpha {
                    return v;
                }
            }

            // Step 8. Futility pruning, child node: the eval is so far
            // above beta that a quiet reply cannot bring it back
            if !NT::ROOT
                && depth.raw() < 7
                && eval - futility_margin(depth) >= beta
                && eval < Score::cp(SCORE_KNOWN_WIN)
            {
                return eval;
            }

            // Step 9. Null move search with verification
            if !NT::PV
                && eval >= beta
                && worker.stack.at(ply).static_eval
                    >= beta - 36 * depth.raw() + 225
                && (ply.raw() >= worker.nmp_ply || ply.raw() % 2 != worker.nmp_odd)
            {
                if let Some(null_board) = board.null_move() {
                    let r = (823 + 67 * depth.raw()) / 256
                        + ((eval - beta).raw() / PAWN_MG).min(3);

                    {
                        let frame = worker.stack.at_mut(ply);
                        frame.current_move = None;
                        frame.null_move = true;
                        frame.captured = None;
                        frame.cont_key = None;
                    }

                    worker.push_position(&null_board, false);
                    let null_value = if depth.raw() - r < 1 {
                        -qsearch::<NonPv, false>(
                            worker,
                            &null_board,
                            ply.next(),
                            -beta,
                            -beta + 1,
                            Depth::ZERO,
                        )
                    } else {
                        -search::<NonPv>(
                            worker,
                            &null_board,
                            ply.next(),
                            -beta,
                            -beta + 1,
                            depth - r,
                            !cut_node,
                            true,
                        )
                    };
                    worker.pop_position();
                    worker.stack.at_mut(ply).null_move = false;

                    if null_value >= beta {
                        // Never return unproven mates
                        let null_value = if null_value >= Score::cp(SCORE_MATE_IN_MAX) {
                            beta
                        } else {
                            null_value
                        };

                        if beta.raw().abs() < SCORE_KNOWN_WIN
                            && (depth.raw() < 12 || worker.nmp_ply != 0)
                        {
                            return null_value;
                        }

                        // Verification search with null move disabled
                        // for our side over the next few plies
                        worker.nmp_ply = ply.raw() + 3 * (depth.raw() - r) / 4;
                        worker.nmp_odd = ply.raw() % 2;

                        let v = if depth.raw() - r < 1 {
                            qsearch::<NonPv, false>(
                                worker,
                                board,
                                ply,
                                beta - 1,
                                beta,
                                Depth::ZERO,
                            )
                        } else {
                            search::<NonPv>(
                                worker, board, ply, beta - 1, beta, depth - r, false, true,
                            )
                        };

                        worker.nmp_ply = 0;
                        worker.nmp_odd = 0;

                        if v >= beta {
                            return null_value;
                        }
                    }
                }
            }

            // Step 10. ProbCut: a good capture clearing beta by a margin
            // at reduced depth almost certainly refutes the prior move
            if !NT::PV && depth.raw() >= 5 && beta.raw().abs() < SCORE_MATE_IN_MAX {
                let rbeta = (beta + 200).min(Score::infinity());
                let threshold = (rbeta - worker.stack.at(ply).static_eval).raw();

                let mut picker = {
                    let ctx = worker.ordering_context(board, ply, tt_move);
                    QMovePicker::new(board, &ctx, false)
                };

                while let Some(m) = picker.next() {
                    if !see::see_ge(board, m, threshold) {
                        continue;
                    }

                    let child = board.make_move_new(m);
                    {
                        let frame = worker.stack.at_mut(ply);
                        frame.current_move = Some(m);
                        frame.null_move = false;
                        frame.captured = captured_piece(board, m);
                        frame.cont_key = Some(cont_key_of(board, m));
                    }
                    worker.push_position(&child, resets_rule50(board, m));
                    let value = -search::<NonPv>(
                        worker,
                        &child,
                        ply.next(),
                        -rbeta,
                        -rbeta + 1,
                        depth - 4,
                        !cut_node,
                        false,
                    );
                    worker.pop_position();

                    if value >= rbeta {
                        return value;
                    }
                }
            }

            // Step 11. Internal iterative deepening when the table has
            // no move to try first
            if depth.raw() >= 6
                && tt_move.is_none()
                && (NT::PV || worker.stack.at(ply).static_eval + 256 >= beta)
            {
                let d = Depth::new(3 * depth.raw() / 4 - 2);
                search::<NT>(worker, board, ply, alpha, beta, d, cut_node, true);

                tte = worker.tt.probe(key);
                tt_move = tte.and_then(|e| e.mv);
            }
        }
    }

    // Step 12. Move loop preparation
    let improving = in_check
        || worker.stack.at(ply - 2).static_eval.is_none()
        || worker.stack.at(ply).static_eval >= worker.stack.at(ply - 2).static_eval;

    let singular_extension_node = !NT::ROOT
        && depth.raw() >= 8
        && tt_move.is_some()
        && tt_value.map_or(false, |v| !v.is_none())
        && excluded.is_none()
        && tte.map_or(false, |e| e.bound.is_lower() && e.depth >= depth - 3);

    let pv_exact = NT::PV && tte.map_or(false, |e| e.bound == Bound::Exact);

    let cont_keys = [
        worker.stack.cont_key_behind(ply, 1),
        worker.stack.cont_key_behind(ply, 2),
        worker.stack.cont_key_behind(ply, 4),
    ];

    let mut picker = {
        let ctx = worker.ordering_context(board, ply, tt_move);
        MovePicker::new(board, &ctx)
    };

    let mut best_value = Score::neg_infinity();
    let mut best_move: Option<Move> = None;
    let mut move_count: u32 = 0;
    let mut skip_quiets = false;
    let mut tt_capture = false;
    let mut quiets_searched: Vec<Move> = Vec::new();
    let mut captures_searched: Vec<Move> = Vec::new();

    while let Some(m) = picker.next(skip_quiets) {
        if Some(m) == excluded {
            continue;
        }

        // At root, honor searchmoves and skip PV lines already settled
        // in this iteration
        if NT::ROOT && !worker.root_move_pending(m) {
            continue;
        }

        move_count += 1;
        worker.stack.at_mut(ply).move_count = move_count;

        if NT::ROOT && worker.is_main && worker.elapsed_ms() > 3000 {
            println!(
                "info depth {} currmove {} currmovenumber {}",
                depth.raw(),
                m,
                move_count as usize + worker.pv_idx
            );
        }

        if NT::PV {
            worker.stack.at_mut(ply + 1).pv.clear();
        }

        let capture_or_promotion = is_capture_or_promotion(board, m);
        let moved_piece = board.piece_on(m.get_source()).unwrap_or(Piece::Pawn);
        let (cont_pc, cont_to) = (piece_index(us, moved_piece), m.get_dest().to_index());

        let child = board.make_move_new(m);
        let gives_check = *child.checkers() != EMPTY;

        let move_count_pruning =
            depth.raw() < 16 && move_count >= futility_move_count(improving, depth);

        // Step 12b. Singular and check extensions
        let mut extension = 0;
        if singular_extension_node && Some(m) == tt_move {
            // If every other move fails well below the table value, the
            // table move is singular and deserves one extra ply
            let rbeta = (tt_value.unwrap() - 2 * depth.raw()).max(-Score::cp(crate::types::SCORE_MATE));
            let d = Depth::new(depth.raw() / 2);
            worker.stack.at_mut(ply).excluded_move = Some(m);
            let value = search::<NonPv>(worker, board, ply, rbeta - 1, rbeta, d, cut_node, true);
            worker.stack.at_mut(ply).excluded_move = None;

            if value < rbeta {
                extension = 1;
            }
        } else if gives_check && !move_count_pruning && see::see_ge(board, m, 0) {
            extension = 1;
        }

        let new_depth = depth - 1 + extension;

        // Step 13. Pruning at shallow depth
        if !NT::ROOT
            && non_pawn_material(board, us) > 0
            && best_value > Score::cp(SCORE_MATED_IN_MAX)
        {
            if !capture_or_promotion
                && !gives_check
                && (!is_advanced_pawn_push(board, m) || non_pawn_material_total(board) >= 5000)
            {
                // Move count based pruning
                if move_count_pruning {
                    skip_quiets = true;
                    continue;
                }

                // Depth this move would be searched at after reduction
                let lmr_depth = (new_depth.raw()
                    - reduction(NT::PV, improving, depth, move_count))
                .max(0);

                // Countermove history pruning
                if lmr_depth < 3
                    && worker.tables.cont_history.get(cont_keys[0], cont_pc, cont_to)
                        < COUNTER_MOVE_PRUNE_THRESHOLD
                    && worker.tables.cont_history.get(cont_keys[1], cont_pc, cont_to)
                        < COUNTER_MOVE_PRUNE_THRESHOLD
                {
                    continue;
                }

                // Futility pruning, parent node
                if lmr_depth < 7
                    && !in_check
                    && worker.stack.at(ply).static_eval + 256 + 200 * lmr_depth <= alpha
                {
                    continue;
                }

                // Prune quiet moves with bad enough SEE
                if lmr_depth < 8 && !see::see_ge(board, m, -35 * lmr_depth * lmr_depth) {
                    continue;
                }
            } else if depth.raw() < 7
                && extension == 0
                && !see::see_ge(board, m, -PAWN_EG * depth.raw())
            {
                continue;
            }
        }

        worker.tt.prefetch(child.get_hash());

        if Some(m) == tt_move && capture_or_promotion {
            tt_capture = true;
        }

        {
            let frame = worker.stack.at_mut(ply);
            frame.current_move = Some(m);
            frame.null_move = false;
            frame.captured = captured_piece(board, m);
            frame.cont_key = Some((cont_pc, cont_to));
        }

        // Step 14. Make the move
        worker.push_position(&child, resets_rule50(board, m));

        let mut value = Score::ZERO;
        let do_full_depth_search;

        // Step 15. Late move reductions; a fail high triggers a
        // re-search at full depth
        if depth.raw() >= 3 && move_count > 1 && (!capture_or_promotion || move_count_pruning) {
            let mut r = reduction(NT::PV, improving, depth, move_count);

            if capture_or_promotion {
                if r > 0 {
                    r -= 1;
                }
            } else {
                // The opponent had many replies: position is messy,
                // reduce less
                if worker.stack.at(ply - 1).move_count > 15 {
                    r -= 1;
                }

                if pv_exact {
                    r -= 1;
                }

                if tt_capture {
                    r += 1;
                }

                if cut_node {
                    r += 2;
                } else if !is_castle(board, m)
                    && !see::see_ge(&child, Move::new(m.get_dest(), m.get_source(), None), 0)
                {
                    // The move steps out of a capture
                    r -= 2;
                }

                let mut stat_score = worker.tables.butterfly.get(us, m) - 4000;
                for key in cont_keys {
                    stat_score += worker.tables.cont_history.get(key, cont_pc, cont_to);
                }
                worker.stack.at_mut(ply).stat_score = stat_score;

                let prev_stat = worker.stack.at(ply - 1).stat_score;
                if stat_score >= 0 && prev_stat < 0 {
                    r -= 1;
                } else if prev_stat >= 0 && stat_score < 0 {
                    r += 1;
                }

                r = (r - stat_score / 20000).max(0);
            }

            let d = Depth::new((new_depth.raw() - r).max(1));
            value = -search::<NonPv>(
                worker,
                &child,
                ply.next(),
                -(alpha + 1),
                -alpha,
                d,
                true,
                false,
            );
            do_full_depth_search = value > alpha && d != new_depth;
        } else {
            do_full_depth_search = !NT::PV || move_count > 1;
        }

        // Step 16. Full-depth null-window search
        if do_full_depth_search {
            value = if new_depth.raw() < 1 {
                if gives_check {
                    -qsearch::<NonPv, true>(
                        worker,
                        &child,
                        ply.next(),
                        -(alpha + 1),
                        -alpha,
                        Depth::ZERO,
                    )
                } else {
                    -qsearch::<NonPv, false>(
                        worker,
                        &child,
                        ply.next(),
                        -(alpha + 1),
                        -alpha,
                        Depth::ZERO,
                    )
                }
            } else {
                -search::<NonPv>(
                    worker,
                    &child,
                    ply.next(),
                    -(alpha + 1),
                    -alpha,
                    new_depth,
                    !cut_node,
                    false,
                )
            };
        }

        // Full PV search on the first move and on fail highs inside the
        // window
        if NT::PV && (move_count == 1 || (value > alpha && (NT::ROOT || value < beta))) {
            worker.stack.at_mut(ply + 1).pv.clear();

            value = if new_depth.raw() < 1 {
                if gives_check {
                    -qsearch::<Pv, true>(worker, &child, ply.next(), -beta, -alpha, Depth::ZERO)
                } else {
                    -qsearch::<Pv, false>(worker, &child, ply.next(), -beta, -alpha, Depth::ZERO)
                }
            } else {
                -search::<NT::Next>(
                    worker,
                    &child,
                    ply.next(),
                    -beta,
                    -alpha,
                    new_depth,
                    false,
                    false,
                )
            };
        }

        // Step 17. Undo
        worker.pop_position();

        debug_assert!(value.raw().abs() < crate::types::SCORE_INFINITY);

        // Step 18. A stopped search cannot trust its value; bail out
        // without touching best move, PV or TT
        if worker.should_stop() {
            return Score::ZERO;
        }

        if NT::ROOT {
            worker.commit_root_move(m, value, move_count, value > alpha, ply);
        }

        if value > best_value {
            best_value = value;

            if value > alpha {
                best_move = Some(m);

                if NT::PV && !NT::ROOT {
                    worker.update_pv(ply, m);
                }

                if NT::PV && value < beta {
                    alpha = value;
                } else {
                    break; // Fail high
                }
            }
        }

        if Some(m) != best_move {
            if capture_or_promotion && captures_searched.len() < 32 {
                captures_searched.push(m);
            } else if !capture_or_promotion && quiets_searched.len() < 64 {
                quiets_searched.push(m);
            }
        }
    }

    // Step 20. Mate and stalemate detection. A singular verification
    // search returns a fail low instead.
    if move_count == 0 {
        best_value = if excluded.is_some() {
            alpha
        } else if in_check {
            Score::mated_in(ply.raw())
        } else {
            Score::draw()
        };
    } else if let Some(bm) = best_move {
        if !is_capture_or_promotion(board, bm) {
            worker.update_quiet_stats(board, ply, bm, &quiets_searched, stat_bonus(depth));
        } else {
            worker.update_capture_stats(board, bm, &captures_searched, stat_bonus(depth));
        }

        // Extra penalty for a quiet move on the previous ply that ran
        // into this refutation as its only try
        if worker.stack.at(ply - 1).move_count == 1
            && worker.stack.at(ply - 1).captured.is_none()
        {
            worker.penalize_prior_move(board, ply, prev_sq, stat_bonus(depth + 1));
        }
    } else if depth.raw() >= 3
        && worker.stack.at(ply - 1).captured.is_none()
        && prev_move.is_some()
    {
        // Reward the move that steered us into this fail low
        worker.reward_prior_move(board, ply, prev_sq, stat_bonus(depth));
    }

    if excluded.is_none() {
        let bound = if best_value >= beta {
            Bound::Lower
        } else if NT::PV && best_move.is_some() {
            Bound::Exact
        } else {
            Bound::Upper
        };
        worker.tt.store(
            key,
            best_move,
            best_value.to_tt(ply.raw()),
            worker.stack.at(ply).static_eval,
            depth,
            bound,
        );
    }

    debug_assert!(best_value.raw().abs() < crate::types::SCORE_INFINITY);
    best_value
}
