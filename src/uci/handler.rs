//! UCI command handler and main loop.

use super::parser::{parse_command, UciCommand};
use super::{parse_move, SearchParams, ENGINE_AUTHOR, ENGINE_NAME};
use crate::eval::nnue;
use crate::search::{SearchLimits, Searcher};
use crate::types::Board;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

const DEFAULT_HASH_MB: usize = 16;
const DEFAULT_EVAL_FILE: &str = "basalt.bsnn";

/// UCI protocol handler
pub struct UciHandler {
    /// Current board position
    board: Board,
    /// Zobrist keys of every position of the game, current included
    game_keys: Vec<u64>,
    /// Halfmove clock of the current position
    rule50: u32,
    /// Half-moves played from the game start
    game_ply: i32,
    /// Search engine
    searcher: Searcher,
    /// Debug mode enabled
    debug: bool,
    /// Should the engine quit
    quit: bool,
    /// Move overhead in milliseconds (safety buffer for time control)
    move_overhead: u64,
    /// NNUE configuration
    use_nnue: bool,
    eval_file: String,
}

impl Default for UciHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl UciHandler {
    pub fn new() -> Self {
        let board = Board::default();
        Self {
            game_keys: vec![board.get_hash()],
            board,
            rule50: 0,
            game_ply: 0,
            searcher: Searcher::new(DEFAULT_HASH_MB),
            debug: false,
            quit: false,
            move_overhead: 10,
            use_nnue: false,
            eval_file: DEFAULT_EVAL_FILE.to_string(),
        }
    }

    /// Run the UCI main loop (blocking)
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let reader = stdin.lock();

        for line in reader.lines() {
            match line {
                Ok(input) => {
                    if self.debug {
                        eprintln!("< {}", input);
                    }
                    self.handle_input(&input);
                    if self.quit {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }

    /// Handle a single UCI command
    pub fn handle_input(&mut self, input: &str) {
        let cmd = parse_command(input);
        self.handle_command(cmd);
    }

    fn handle_command(&mut self, cmd: UciCommand) {
        match cmd {
            UciCommand::Uci => self.cmd_uci(),
            UciCommand::Debug(on) => self.debug = on,
            UciCommand::IsReady => self.cmd_isready(),
            UciCommand::SetOption { name, value } => self.cmd_setoption(&name, value.as_deref()),
            UciCommand::Register => {}
            UciCommand::UciNewGame => self.cmd_ucinewgame(),
            UciCommand::Position { fen, moves } => self.cmd_position(fen.as_deref(), &moves),
            UciCommand::Go(params) => self.cmd_go(params),
            UciCommand::Stop => self.searcher.stop(),
            UciCommand::PonderHit => self.searcher.ponderhit(),
            UciCommand::Quit => self.cmd_quit(),
            UciCommand::Display => self.cmd_display(),
            UciCommand::Eval => self.cmd_eval(),
            UciCommand::Unknown(s) => {
                if self.debug {
                    eprintln!("Unknown command: {}", s);
                }
            }
        }
    }

    /// Send output to the GUI
    fn send(&self, msg: &str) {
        println!("{}", msg);
        io::stdout().flush().ok();
    }

    // === UCI Commands ===

    fn cmd_uci(&self) {
        self.send(&format!("id name {}", ENGINE_NAME));
        self.send(&format!("id author {}", ENGINE_AUTHOR));

        self.send("option name Hash type spin default 16 min 1 max 16384");
        self.send("option name Threads type spin default 1 min 1 max 256");
        self.send("option name MultiPV type spin default 1 min 1 max 64");
        self.send("option name MoveOverhead type spin default 10 min 0 max 5000");
        self.send("option name Ponder type check default false");
        self.send("option name Use NNUE type check default false");
        self.send(&format!(
            "option name EvalFile type string default {}",
            DEFAULT_EVAL_FILE
        ));

        self.send("uciok");
    }

    fn cmd_isready(&self) {
        self.send("readyok");
    }

    fn cmd_setoption(&mut self, name: &str, value: Option<&str>) {
        match name.to_lowercase().as_str() {
            "hash" => {
                if let Some(mb) = value.and_then(|v| v.parse::<usize>().ok()) {
                    self.searcher.resize_hash(mb.clamp(1, 16384));
                }
            }
            "threads" => {
                if let Some(n) = value.and_then(|v| v.parse::<usize>().ok()) {
                    self.searcher.set_threads(n);
                }
            }
            "multipv" => {
                if let Some(n) = value.and_then(|v| v.parse::<usize>().ok()) {
                    self.searcher.multipv = n.clamp(1, 64);
                }
            }
            "moveoverhead" => {
                if let Some(ms) = value.and_then(|v| v.parse::<u64>().ok()) {
                    self.move_overhead = ms.min(5000);
                }
            }
            "ponder" => {} // The GUI drives pondering through `go ponder`
            "use nnue" => {
                self.use_nnue = value == Some("true");
                self.load_network();
            }
            "evalfile" => {
                if let Some(path) = value {
                    self.eval_file = path.to_string();
                    self.load_network();
                }
            }
            _ => {
                if self.debug {
                    eprintln!("Unknown option: {}", name);
                }
            }
        }
    }

    fn load_network(&mut self) {
        if !self.use_nnue {
            self.searcher.nnue = None;
            return;
        }
        match nnue::load_model(&self.eval_file) {
            Ok(model) => {
                self.send(&format!(
                    "info string NNUE evaluation using {} enabled",
                    self.eval_file
                ));
                self.searcher.nnue = Some(model);
            }
            Err(e) => {
                self.send(&format!(
                    "info string NNUE network {} could not be loaded: {}",
                    self.eval_file, e
                ));
                self.searcher.nnue = None;
            }
        }
    }

    /// The network must actually be loaded when NNUE play was requested
    fn verify_network(&self) -> bool {
        if self.use_nnue && self.searcher.nnue.is_none() {
            self.send(&format!(
                "info string ERROR: Use NNUE is set but the network file {} was not loaded",
                self.eval_file
            ));
            self.send("info string ERROR: the EvalFile option may need the full path");
            self.send("info string ERROR: the engine will be terminated now");
            return false;
        }
        true
    }

    fn cmd_ucinewgame(&mut self) {
        self.searcher.clear();
        self.cmd_position(None, &[]);
    }

    fn cmd_position(&mut self, fen: Option<&str>, moves: &[String]) {
        self.board = match fen {
            Some(f) => Board::from_str(f).unwrap_or_default(),
            None => Board::default(),
        };

        // Halfmove clock and ply come from the FEN tail; the board
        // itself does not carry them
        self.rule50 = fen
            .and_then(|f| f.split_whitespace().nth(4))
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        self.game_ply = fen
            .and_then(|f| f.split_whitespace().nth(5))
            .and_then(|t| t.parse::<i32>().ok())
            .map(|fullmove| (fullmove.max(1) - 1) * 2)
            .unwrap_or(0);

        self.game_keys.clear();
        self.game_keys.push(self.board.get_hash());

        for move_str in moves {
            if let Some(m) = parse_move(&self.board, move_str) {
                if crate::search::resets_rule50(&self.board, m) {
                    self.rule50 = 0;
                } else {
                    self.rule50 += 1;
                }
                self.board = self.board.make_move_new(m);
                self.game_ply += 1;
                self.game_keys.push(self.board.get_hash());
            } else if self.debug {
                eprintln!("Invalid move: {}", move_str);
            }
        }
    }

    fn cmd_go(&mut self, params: SearchParams) {
        if !self.verify_network() {
            self.quit = true;
            std::process::exit(1);
        }

        let limits = SearchLimits {
            depth: params.depth,
            movetime: params.movetime,
            nodes: params.nodes,
            mate: params.mate,
            perft: params.perft,
            wtime: params.wtime,
            btime: params.btime,
            winc: params.winc,
            binc: params.binc,
            movestogo: params.movestogo,
            infinite: params.infinite,
            ponder: params.ponder,
            searchmoves: params.searchmoves,
            move_overhead: self.move_overhead,
        };

        // The search runs on its own threads; the loop stays responsive
        // to "stop" and "ponderhit"
        self.searcher.go(
            self.board,
            self.game_keys.clone(),
            self.rule50,
            self.game_ply,
            limits,
        );
    }

    fn cmd_quit(&mut self) {
        self.searcher.stop();
        self.quit = true;
    }

    fn cmd_display(&self) {
        eprintln!("{}", self.board);
        eprintln!("Side to move: {:?}", self.board.side_to_move());
        eprintln!("Halfmove clock: {}", self.rule50);
    }

    fn cmd_eval(&self) {
        if *self.board.checkers() == chess::EMPTY {
            self.send(&crate::eval::trace(&self.board));
        } else {
            self.send("info string eval unavailable while in check");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_tracks_rule50_and_keys() {
        let mut handler = UciHandler::new();
        handler.cmd_position(None, &["e2e4".into(), "e7e5".into(), "g1f3".into()]);
        // Two pawn moves reset the counter, then a knight move raises it
        assert_eq!(handler.rule50, 1);
        assert_eq!(handler.game_ply, 3);
        assert_eq!(handler.game_keys.len(), 4);
    }

    #[test]
    fn test_position_from_fen_reads_clock() {
        let mut handler = UciHandler::new();
        handler.cmd_position(
            Some("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 37 21"),
            &[],
        );
        assert_eq!(handler.rule50, 37);
        assert_eq!(handler.game_ply, 40);
    }
}
