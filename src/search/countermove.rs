//! Counter-move heuristic for move ordering.
//!
//! Tracks which move typically refutes the opponent's previous move.
//! Similar to killer moves but indexed by the opponent's (piece, to)
//! rather than by ply.

use crate::types::Move;
use super::history::PIECE_NB;

/// Counter-move table: [piece][to_sq] -> refutation
#[derive(Clone)]
pub struct CounterMoveTable {
    table: [[Option<Move>; 64]; PIECE_NB],
}

impl CounterMoveTable {
    /// Create a new empty counter-move table
    pub fn new() -> Self {
        Self {
            table: [[None; 64]; PIECE_NB],
        }
    }

    /// Store a counter-move for the opponent's previous (piece, to)
    #[inline]
    pub fn store(&mut self, piece: usize, to: usize, counter: Move) {
        self.table[piece][to] = Some(counter);
    }

    /// Get the counter-move for the opponent's previous (piece, to)
    #[inline]
    pub fn get(&self, piece: usize, to: usize) -> Option<Move> {
        self.table[piece][to]
    }

    /// Clear all counter-moves (on new game, not on new search)
    pub fn clear(&mut self) {
        self.table = [[None; 64]; PIECE_NB];
    }
}

impl Default for CounterMoveTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, Piece, Square};
    use super::super::history::piece_index;

    #[test]
    fn test_store_and_get() {
        let mut counters = CounterMoveTable::new();
        let refutation = Move::new(Square::G8, Square::F6, None);
        let pc = piece_index(Color::White, Piece::Pawn);

        assert_eq!(counters.get(pc, Square::E4.to_index()), None);
        counters.store(pc, Square::E4.to_index(), refutation);
        assert_eq!(counters.get(pc, Square::E4.to_index()), Some(refutation));
    }
}
