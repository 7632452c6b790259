//! Basalt: a UCI chess engine.
//!
//! Lazy-SMP alpha-beta search over a shared lock-free transposition
//! table, with a classical hand-crafted evaluation and an optional NNUE
//! network. Move generation and board representation come from the
//! `chess` crate.

pub mod eval;
pub mod perft;
pub mod search;
pub mod types;
pub mod uci;
