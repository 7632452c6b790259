//! UCI (Universal Chess Interface) protocol handler.
//!
//! This module implements the UCI protocol for communication with chess
//! GUIs. See: http://wbec-ridderkerk.nl/html/UCIProtocol.html

mod parser;
mod handler;

pub use handler::UciHandler;

use crate::types::{Board, Depth, Move, MoveGen};
use std::str::FromStr;

/// UCI engine identification
pub const ENGINE_NAME: &str = "Basalt";
pub const ENGINE_AUTHOR: &str = "the Basalt developers";

/// Parameters of a "go" command
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Search to this depth
    pub depth: Option<Depth>,
    /// Search for this many milliseconds
    pub movetime: Option<u64>,
    /// White time remaining (ms)
    pub wtime: Option<u64>,
    /// Black time remaining (ms)
    pub btime: Option<u64>,
    /// White increment per move (ms)
    pub winc: Option<u64>,
    /// Black increment per move (ms)
    pub binc: Option<u64>,
    /// Moves until next time control
    pub movestogo: Option<u32>,
    /// Infinite search (until "stop")
    pub infinite: bool,
    /// Ponder mode
    pub ponder: bool,
    /// Only search these moves (kept as strings, resolved at the root)
    pub searchmoves: Vec<String>,
    /// Search for mate in N moves
    pub mate: Option<u32>,
    /// Maximum nodes to search
    pub nodes: Option<u64>,
    /// Run perft to this depth
    pub perft: Option<i32>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parse a move string (e.g., "e2e4", "e7e8q") into a legal move for
/// the given board
pub fn parse_move(board: &Board, move_str: &str) -> Option<Move> {
    let move_str = move_str.trim();
    if move_str.len() < 4 {
        return None;
    }

    let from = chess::Square::from_str(&move_str[0..2]).ok()?;
    let to = chess::Square::from_str(&move_str[2..4]).ok()?;

    let promo = if move_str.len() > 4 {
        match move_str.chars().nth(4)? {
            'q' | 'Q' => Some(chess::Piece::Queen),
            'r' | 'R' => Some(chess::Piece::Rook),
            'b' | 'B' => Some(chess::Piece::Bishop),
            'n' | 'N' => Some(chess::Piece::Knight),
            _ => None,
        }
    } else {
        None
    };

    MoveGen::new_legal(board).find(|m| {
        m.get_source() == from && m.get_dest() == to && m.get_promotion() == promo
    })
}

/// Format a move to UCI notation (e.g., "e2e4", "e7e8q")
pub fn format_move(m: Move) -> String {
    let mut s = format!("{}{}", m.get_source(), m.get_dest());
    if let Some(promo) = m.get_promotion() {
        let c = match promo {
            chess::Piece::Queen => 'q',
            chess::Piece::Rook => 'r',
            chess::Piece::Bishop => 'b',
            chess::Piece::Knight => 'n',
            _ => unreachable!(),
        };
        s.push(c);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_round_trip() {
        let board = Board::default();
        let m = parse_move(&board, "e2e4").expect("e2e4 is legal");
        assert_eq!(format_move(m), "e2e4");
        assert!(parse_move(&board, "e2e5").is_none());
        assert!(parse_move(&board, "junk").is_none());
    }

    #[test]
    fn test_parse_promotion() {
        let board =
            Board::from_str("8/4P1k1/8/8/8/8/8/4K3 w - - 0 1").expect("valid fen");
        let m = parse_move(&board, "e7e8q").expect("promotion is legal");
        assert_eq!(m.get_promotion(), Some(chess::Piece::Queen));
        let n = parse_move(&board, "e7e8n").expect("underpromotion is legal");
        assert_eq!(n.get_promotion(), Some(chess::Piece::Knight));
    }
}
