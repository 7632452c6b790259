//! Board evaluation module.
//!
//! The classical hand-crafted evaluation is the default. When an NNUE
//! network is loaded, an outer gate decides per position which of the
//! two evaluations the search sees: big material imbalances keep the
//! classical path (it understands won positions better), balanced
//! middlegames prefer the network.

pub mod hce;
pub mod nnue;
pub mod pawns;

use crate::types::{
    non_pawn_material_total, Board, Color, Piece, Score, PAWN_MG, ROOK_MG,
};
use pawns::PawnTable;

/// Bonus for the side to move
pub const TEMPO: i32 = 20;

// Imbalance thresholds for the NNUE gate, in this engine's value scale
const NNUE_THRESHOLD1: i32 = 425;
const NNUE_THRESHOLD2: i32 = 110;

/// Full evaluation entry point, side to move's point of view.
///
/// `rule50` and `nodes` feed the NNUE gate: positions close to the
/// 50-move horizon trust the network more, and a sliver of nodes always
/// takes the classical path so both evaluations keep seeding the search.
pub fn evaluate(
    board: &Board,
    pawn_table: &mut PawnTable,
    model: Option<&nnue::Model>,
    rule50: u32,
    nodes: u64,
) -> Score {
    let net = match model {
        Some(net) => net,
        None => return hce::evaluate(board, pawn_table) + TEMPO,
    };

    let npm = non_pawn_material_total(board);
    let pawn_count = board.pieces(Piece::Pawn).popcnt() as i32;
    let psq_eg = hce::psq_score(board).eg.abs();
    let r50 = 16 + rule50 as i32;

    let large_psq = psq_eg * 16 > (NNUE_THRESHOLD1 + npm / 64) * r50;
    let prefer_classical = large_psq || (psq_eg > PAWN_MG / 4 && nodes & 0xB == 0);

    // Low-material endings where the network is known to misjudge
    // fortress draws
    let strong_classical = npm < 2 * ROOK_MG && pawn_count < 2;

    let adjusted_nnue = |board: &Board| {
        let mat = npm + PAWN_MG * pawn_count;
        Score::cp(net.evaluate(board).raw() * (679 + mat / 32) / 1024 + TEMPO)
    };

    let mut v = if prefer_classical || strong_classical {
        hce::evaluate(board, pawn_table) + TEMPO
    } else {
        adjusted_nnue(board)
    };

    // If the classical eval came out small despite the big imbalance,
    // the imbalance is likely compensated: ask the network after all
    if large_psq && !strong_classical {
        let small = v.raw().abs() * 16 < NNUE_THRESHOLD2 * r50;
        let drawish_bishops = hce::opposite_bishops(board)
            && v.raw().abs() * 16 < (NNUE_THRESHOLD1 + npm / 64) * r50
            && nodes & 0xB == 0;
        if small || drawish_bishops {
            v = adjusted_nnue(board);
        }
    }

    v
}

/// Pretty-printed term breakdown of the classical evaluation
pub fn trace(board: &Board) -> String {
    use hce::term;

    let mut pawn_table = PawnTable::new();
    let pe = pawn_table.probe(board);
    let mut eval = hce::Evaluation::new(board, pe).full();
    let v = eval.value() + TEMPO;
    let white_view = match board.side_to_move() {
        Color::White => v,
        Color::Black => -v,
    };

    let to_cp = |v: i32| v as f64 / 100.0;
    let names = [
        ("Material", term::MATERIAL, false),
        ("Imbalance", term::IMBALANCE, false),
        ("Pawns", term::PAWNS, false),
        ("Knights", term::KNIGHT, true),
        ("Bishops", term::BISHOP, true),
        ("Rooks", term::ROOK, true),
        ("Queens", term::QUEEN, true),
        ("Mobility", term::MOBILITY, true),
        ("King safety", term::KING, true),
        ("Threats", term::THREAT, true),
        ("Passed pawns", term::PASSED, true),
        ("Space", term::SPACE, true),
        ("Initiative", term::INITIATIVE, false),
        ("Total", term::TOTAL, false),
    ];

    let mut out = String::new();
    out.push_str("      Eval term |    White    |    Black    |    Total    \n");
    out.push_str("                |   MG    EG  |   MG    EG  |   MG    EG  \n");
    out.push_str("----------------+-------------+-------------+-------------\n");

    for (name, idx, per_color) in names {
        let w = eval.terms[idx][0];
        let b = eval.terms[idx][1];
        if per_color {
            out.push_str(&format!(
                "{:>15} | {:5.2} {:5.2} | {:5.2} {:5.2} | {:5.2} {:5.2} \n",
                name,
                to_cp(w.mg),
                to_cp(w.eg),
                to_cp(b.mg),
                to_cp(b.eg),
                to_cp(w.mg - b.mg),
                to_cp(w.eg - b.eg),
            ));
        } else {
            out.push_str(&format!(
                "{:>15} |   ---   --- |   ---   --- | {:5.2} {:5.2} \n",
                name,
                to_cp(w.mg),
                to_cp(w.eg),
            ));
        }
    }

    out.push_str(&format!(
        "\nTotal evaluation: {:.2} (white side)\n",
        to_cp(white_view.raw())
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_evaluate_includes_tempo() {
        let board = Board::default();
        let mut table = PawnTable::new();
        let with_tempo = evaluate(&board, &mut table, None, 0, 0);
        let without = hce::evaluate(&board, &mut table);
        assert_eq!(with_tempo.raw(), without.raw() + TEMPO);
    }

    #[test]
    fn test_mirrored_position_negates() {
        // Vertically mirrored position with colors swapped: the score
        // from the mover's view must be identical, so pre-tempo values
        // are exact negations in white terms
        let original = Board::from_str(
            "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 0 1",
        )
        .unwrap();
        let mirrored = Board::from_str(
            "rnbqk2r/pppp1ppp/5n2/2b1p3/4P3/2N5/PPPP1PPP/R1BQKBNR b KQkq - 0 1",
        )
        .unwrap();
        let mut table = PawnTable::new();
        let a = hce::evaluate(&original, &mut table);
        let b = hce::evaluate(&mirrored, &mut table);
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn test_trace_mentions_all_terms() {
        let out = trace(&Board::default());
        for name in ["Material", "Mobility", "King safety", "Passed pawns", "Total"] {
            assert!(out.contains(name), "missing {} in:\n{}", name, out);
        }
    }
}
