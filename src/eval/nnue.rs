//! NNUE network loading and inference.
//!
//! Architecture: (768 -> HIDDEN)x2 -> SCReLU -> 1, quantized to i16.
//! Input features are piece placement planes (6 pieces x 2 colors x 64
//! squares), mirrored for the black perspective. The file format is a
//! small binary blob parsed with `binread`.
//!
//! The search consumes only the scalar output; the blend against the
//! classical evaluation lives in the parent module.

use crate::types::{Board, Color, Piece, Score};
use binread::{BinRead, BinReaderExt};
use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;

/// Number of input features: 6 piece types x 2 colors x 64 squares
const NUM_FEATURES: usize = 768;

/// Clamp ceiling for the SCReLU activation
const QA: i32 = 255;

/// Output weight quantization factor
const QB: i64 = 64;

/// Shared, thread-safe network handle
pub type Model = Arc<NnueNetwork>;

/// Raw on-disk layout, little-endian with a magic header
#[derive(BinRead)]
#[br(little, magic = b"BSNN")]
struct RawNetwork {
    version: u32,
    hidden_size: u32,
    #[br(count = NUM_FEATURES * hidden_size as usize)]
    ft_weights: Vec<i16>,
    #[br(count = hidden_size as usize)]
    ft_biases: Vec<i16>,
    #[br(count = 2 * hidden_size as usize)]
    output_weights: Vec<i16>,
    output_bias: i16,
}

/// Quantized network weights
pub struct NnueNetwork {
    ft_weights: Vec<i16>,
    ft_biases: Vec<i16>,
    output_weights: Vec<i16>,
    output_bias: i16,
    hidden_size: usize,
}

/// Load a network from a binary file
pub fn load_model(path: &str) -> io::Result<Model> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let raw: RawNetwork = reader
        .read_le()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    if raw.version != 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported network version {}", raw.version),
        ));
    }

    Ok(Arc::new(NnueNetwork {
        ft_weights: raw.ft_weights,
        ft_biases: raw.ft_biases,
        output_weights: raw.output_weights,
        output_bias: raw.output_bias,
        hidden_size: raw.hidden_size as usize,
    }))
}

/// Feature indices of a piece for the white and black perspectives
#[inline]
fn feature_indices(piece: Piece, color: Color, sq: usize) -> (usize, usize) {
    let p = piece.to_index();
    let c = color.to_index();
    let white_view = c * 384 + p * 64 + sq;
    let black_view = (1 - c) * 384 + p * 64 + (sq ^ 56);
    (white_view, black_view)
}

impl NnueNetwork {
    /// Evaluate a position from scratch, side to move's point of view
    pub fn evaluate(&self, board: &Board) -> Score {
        let hs = self.hidden_size;
        let mut white_acc = self.ft_biases.clone();
        let mut black_acc = self.ft_biases.clone();

        for piece in [
            Piece::Pawn,
            Piece::Knight,
            Piece::Bishop,
            Piece::Rook,
            Piece::Queen,
            Piece::King,
        ] {
            for color in [Color::White, Color::Black] {
                let bb = *board.pieces(piece) & *board.color_combined(color);
                for sq in bb {
                    let (wf, bf) = feature_indices(piece, color, sq.to_index());
                    let w_col = &self.ft_weights[wf * hs..(wf + 1) * hs];
                    let b_col = &self.ft_weights[bf * hs..(bf + 1) * hs];
                    for i in 0..hs {
                        white_acc[i] = white_acc[i].wrapping_add(w_col[i]);
                        black_acc[i] = black_acc[i].wrapping_add(b_col[i]);
                    }
                }
            }
        }

        let (us, them) = match board.side_to_move() {
            Color::White => (&white_acc, &black_acc),
            Color::Black => (&black_acc, &white_acc),
        };

        let mut sum: i64 = 0;
        for i in 0..hs {
            let v = (us[i] as i32).clamp(0, QA);
            sum += (v * v) as i64 * self.output_weights[i] as i64;
        }
        for i in 0..hs {
            let v = (them[i] as i32).clamp(0, QA);
            sum += (v * v) as i64 * self.output_weights[hs + i] as i64;
        }

        let qa_sq = (QA as i64) * (QA as i64);
        let cp = (sum / qa_sq + self.output_bias as i64) / QB;
        Score::cp(cp as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a tiny deterministic network in memory
    fn test_network(hidden: usize) -> NnueNetwork {
        let mut seed: u64 = 0x1234_5678_9ABC_DEF0;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 48) as i16) / 256
        };
        NnueNetwork {
            ft_weights: (0..NUM_FEATURES * hidden).map(|_| next()).collect(),
            ft_biases: (0..hidden).map(|_| next()).collect(),
            output_weights: (0..2 * hidden).map(|_| next()).collect(),
            output_bias: 0,
            hidden_size: hidden,
        }
    }

    #[test]
    fn test_evaluate_is_finite_and_deterministic() {
        let net = test_network(32);
        let board = Board::default();
        let a = net.evaluate(&board);
        let b = net.evaluate(&board);
        assert_eq!(a, b);
        assert!(a.raw().abs() < 100_000);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(load_model("no-such-network.bsnn").is_err());
    }
}
