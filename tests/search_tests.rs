//! End-to-end search behavior tests driving the public `Searcher` API.

use basalt::eval::hce;
use basalt::eval::pawns::PawnTable;
use basalt::search::{SearchLimits, SearchReport, Searcher};
use basalt::types::{Board, MoveGen};
use basalt::uci::format_move;
use std::str::FromStr;

fn run(fen: &str, limits: SearchLimits) -> SearchReport {
    let board = Board::from_str(fen).expect("valid FEN");
    let mut searcher = Searcher::new(16);
    searcher.go(board, vec![board.get_hash()], 0, 0, limits);
    searcher.wait().expect("search report")
}

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const SCHOLARS: &str = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5Q2/PPPP1PPP/RNB1K1NR w KQkq - 2 3";

#[test]
fn depth_one_gives_a_legal_move_and_sane_score() {
    let report = run(START, SearchLimits::depth(1));
    let best = report.best_move.expect("legal move exists");
    let board = Board::default();
    assert!(MoveGen::new_legal(&board).any(|m| m == best));
    assert!(report.score.raw().abs() <= 100, "score {}", report.score.raw());
    assert!(report.depth.raw() >= 1);
}

#[test]
fn finds_the_scholars_mate() {
    let report = run(SCHOLARS, SearchLimits::depth(5));
    assert_eq!(report.best_move.map(format_move).as_deref(), Some("f3f7"));
    assert!(report.score.is_mate());
}

#[test]
fn go_mate_stops_once_the_mate_is_proven() {
    let limits = SearchLimits {
        mate: Some(2),
        ..Default::default()
    };
    let report = run(SCHOLARS, limits);
    assert_eq!(report.best_move.map(format_move).as_deref(), Some("f3f7"));
    assert!(report.score.is_mate());
}

#[test]
fn stalemate_at_root_scores_zero_without_a_move() {
    let report = run("8/8/8/8/8/6k1/6p1/6K1 w - - 0 1", SearchLimits::depth(20));
    assert!(report.best_move.is_none());
    assert_eq!(report.score.raw(), 0);
}

#[test]
fn node_limit_terminates_the_search() {
    let limits = SearchLimits {
        nodes: Some(20_000),
        ..Default::default()
    };
    let report = run(START, limits);
    assert!(report.best_move.is_some());
    assert!(report.nodes < 2_000_000, "searched {} nodes", report.nodes);
}

#[test]
fn single_thread_search_is_deterministic() {
    let a = run("r2qkbnr/ppp2ppp/2np4/4p2b/2B1P3/2N2N2/PPPP1PPP/R1BQ1RK1 w kq - 0 1",
        SearchLimits::depth(7));
    let b = run("r2qkbnr/ppp2ppp/2np4/4p2b/2B1P3/2N2N2/PPPP1PPP/R1BQ1RK1 w kq - 0 1",
        SearchLimits::depth(7));
    assert_eq!(a.best_move, b.best_move);
    assert_eq!(a.score, b.score);
    assert_eq!(a.nodes, b.nodes);
}

#[test]
fn multipv_search_completes() {
    let board = Board::default();
    let mut searcher = Searcher::new(16);
    searcher.multipv = 3;
    searcher.go(board, vec![board.get_hash()], 0, 0, SearchLimits::depth(5));
    let report = searcher.wait().expect("report");
    assert!(report.best_move.is_some());
}

#[test]
fn pv_replay_stays_legal() {
    let report = run(START, SearchLimits::depth(7));
    // Play the reported line out from the root; every move must be
    // legal in sequence
    assert!(!report.pv.is_empty());
    assert_eq!(report.pv.first().copied(), report.best_move);
    let mut board = Board::default();
    for &m in &report.pv {
        assert!(MoveGen::new_legal(&board).any(|lm| lm == m), "illegal pv move");
        board = board.make_move_new(m);
    }
}

// === evaluation symmetry ===

/// Vertically mirror a FEN, swapping colors. Only valid for positions
/// without en passant rights.
fn mirror_fen(fen: &str) -> String {
    let fields: Vec<&str> = fen.split_whitespace().collect();

    let swap = |c: char| {
        if c.is_ascii_uppercase() {
            c.to_ascii_lowercase()
        } else {
            c.to_ascii_uppercase()
        }
    };

    let board: Vec<String> = fields[0]
        .split('/')
        .rev()
        .map(|rank| rank.chars().map(|c| if c.is_ascii_alphabetic() { swap(c) } else { c }).collect())
        .collect();

    let stm = if fields[1] == "w" { "b" } else { "w" };

    let castling = if fields[2] == "-" {
        "-".to_string()
    } else {
        let mut flipped: Vec<char> = fields[2].chars().map(swap).collect();
        flipped.sort_by_key(|&c| match c {
            'K' => 0,
            'Q' => 1,
            'k' => 2,
            'q' => 3,
            _ => 4,
        });
        flipped.into_iter().collect()
    };

    format!(
        "{} {} {} - {} {}",
        board.join("/"),
        stm,
        castling,
        fields.get(4).unwrap_or(&"0"),
        fields.get(5).unwrap_or(&"1"),
    )
}

#[test]
fn evaluation_is_color_symmetric() {
    let fens = [
        START,
        SCHOLARS,
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        "4rrk1/pp1n3p/3q2pQ/2p1pb2/2PP4/2P3N1/P2B2PP/4RRK1 b - - 0 1",
    ];

    let mut table = PawnTable::new();
    for fen in fens {
        let board = Board::from_str(fen).expect("valid FEN");
        let mirrored = Board::from_str(&mirror_fen(fen)).expect("valid mirrored FEN");
        let a = hce::evaluate(&board, &mut table);
        let b = hce::evaluate(&mirrored, &mut table);
        assert_eq!(a.raw(), b.raw(), "asymmetric eval for {}", fen);
    }
}
