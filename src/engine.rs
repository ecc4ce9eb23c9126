/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use uci_parser::{UciCommand, UciResponse};

use crate::{
    generate_moves, perft, san, splitperft, Evaluator, Limits, Move, PolyglotBook, Position,
    Scorer, Search, SearchCache, SearchResult, StdoutLogger,
};

/// Anything the engine can be told to do: a UCI command or one of the
/// engine's own REPL commands.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// A standard UCI protocol command.
    Uci(UciCommand),

    /// One of the extra commands from [`ReplCommand`].
    Repl(ReplCommand),
}

/// The engine's own commands, accepted alongside UCI on the same prompt.
#[derive(Debug, Clone, Parser)]
#[command(multicall = true, about, rename_all = "lower")]
pub enum ReplCommand {
    /// Print a visual representation of the current board state.
    #[command(alias = "d")]
    Display,

    /// Print an evaluation of the current position.
    Eval,

    /// Quit the engine.
    #[command(alias = "q")]
    Exit,

    /// Generate and print a FEN string for the current position.
    Fen,

    /// Apply the provided move to the current position, if it is legal.
    Make { mv: String },

    /// Show all legal moves in the current position, in algebraic notation.
    Moves,

    /// Count the move-generation tree's leaves at the provided depth.
    Perft { depth: usize },

    /// Like perft, but with per-root-move counts.
    #[command(alias = "sperft")]
    Splitperft { depth: usize },
}

/// The engine: owns the game state, dispatches commands, and runs searches
/// on a worker thread.
///
/// Input is handled on a dedicated thread so that `stop` and `quit` are
/// seen while a search is running; the search itself is cancelled
/// cooperatively through a shared atomic flag.
pub struct Engine {
    /// The current state of the game, updated by `position` and `make`.
    position: Position,

    /// One half of a channel, responsible for sending commands to the engine.
    sender: Sender<EngineCommand>,

    /// One half of a channel, responsible for receiving commands.
    receiver: Receiver<EngineCommand>,

    /// Raised to ask the running search to wind down at its next poll.
    stop: Arc<AtomicBool>,

    /// Handle to the currently-running search thread, if one exists.
    search_thread: Option<JoinHandle<SearchResult>>,

    /// Killers, history, and PV moves, kept warm across searches.
    cache: Arc<Mutex<SearchCache>>,

    /// The opening book, once one is loaded with `setoption`.
    book: Option<PolyglotBook>,

    /// Whether to consult the book before searching.
    use_book: bool,
}

impl Engine {
    /// Constructs a new [`Engine`] to be executed with [`Engine::run`].
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            position: Position::default(),
            sender,
            receiver,
            stop: Arc::new(AtomicBool::new(true)),
            search_thread: None,
            cache: Arc::default(),
            book: None,
            use_book: true,
        }
    }

    /// Returns a string of the engine's name and current version.
    #[inline(always)]
    pub fn name(&self) -> String {
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    /// Sends an [`EngineCommand`] to be executed.
    pub fn send_command(&self, command: EngineCommand) {
        // The receiver lives as long as the engine, so this cannot fail
        self.sender
            .send(command)
            .expect("Failed to send a command to the engine");
    }

    /// Entrypoint: spawns the input thread, then executes commands in the
    /// order received until told to quit.
    pub fn run(&mut self) -> Result<()> {
        let sender = self.sender.clone();
        thread::spawn(|| {
            if let Err(err) = input_handler(sender) {
                eprintln!("Input thread stopping after fatal error: {err:#}");
            }
        });

        while let Ok(cmd) = self.receiver.recv() {
            match cmd {
                EngineCommand::Uci(uci) => {
                    // The UCI spec says to keep running when a command fails
                    match self.handle_uci_command(uci) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("Error: {e:#}"),
                    }
                }
                EngineCommand::Repl(repl) => {
                    if self.handle_repl_command(repl) {
                        break;
                    }
                }
            }
        }

        self.stop_search();
        Ok(())
    }

    /// Executes one UCI command, returning `true` on `quit`.
    fn handle_uci_command(&mut self, uci: UciCommand) -> Result<bool> {
        use UciCommand::*;
        match uci {
            Uci => {
                println!("id name {}", self.name());
                println!("id author {}", env!("CARGO_PKG_AUTHORS").replace(':', ", "));
                println!("option name OwnBook type check default true");
                println!("option name BookFile type string default <empty>");
                println!("uciok");
            }

            Debug(_) => {}

            IsReady => println!("{}", UciResponse::<&str>::ReadyOk),

            SetOption { name, value } => self.set_option(&name, value)?,

            Register { .. } => println!("{} requires no registration", self.name()),

            UciNewGame => {
                self.stop_search();
                self.position = crate::Position::default();
                self.cache.lock().unwrap().clear();
            }

            Position { fen, moves } => {
                self.stop_search();
                let mut position = match fen {
                    Some(fen) => fen.parse()?,
                    None => crate::Position::default(),
                };
                for mv in moves {
                    let mv = Move::from_uci(&position, &mv)?;
                    position.do_move(mv);
                }
                self.position = position;
            }

            Go(options) => {
                self.stop_search();

                // A book line, if we have one, saves the whole search
                if self.use_book {
                    if let Some(mv) = self.book.as_ref().and_then(|b| b.pick(&self.position)) {
                        let bestmove = Some(mv.to_uci());
                        println!("{}", UciResponse::BestMove { bestmove, ponder: None });
                        return Ok(false);
                    }
                }

                let limits = Limits::from_uci(&options);
                self.start_search(limits);
            }

            Stop => _ = self.stop_search(),

            Quit => return Ok(true),

            _ => bail!("{} does not support UCI command {uci:?}", self.name()),
        }

        Ok(false)
    }

    /// Executes one REPL command, returning `true` on `exit`.
    fn handle_repl_command(&mut self, cmd: ReplCommand) -> bool {
        match cmd {
            ReplCommand::Display => println!("{:?}", self.position),

            ReplCommand::Eval => println!("{}", Evaluator.score(&self.position)),

            ReplCommand::Exit => return true,

            ReplCommand::Fen => println!("{}", self.position.to_fen()),

            ReplCommand::Make { mv } => match self.make_move(&mv) {
                Ok(()) => println!("{:?}", self.position),
                Err(e) => eprintln!("{e:#}"),
            },

            ReplCommand::Moves => {
                let moves = generate_moves(&mut self.position);
                let mut texts: Vec<String> =
                    moves.iter().map(|&mv| san::san(&self.position, mv)).collect();
                texts.sort();
                println!("{}", texts.join(" "));
            }

            ReplCommand::Perft { depth } => {
                println!("{}", perft(&mut self.position, depth));
            }

            ReplCommand::Splitperft { depth } => {
                splitperft(&mut self.position, depth);
            }
        }

        false
    }

    /// Applies a move, UCI or SAN, to the current position if it is legal.
    fn make_move(&mut self, text: &str) -> Result<()> {
        let mv = Move::from_uci(&self.position, text)
            .or_else(|_| san::parse_san(&self.position, text))?;

        if !generate_moves(&mut self.position).contains(&mv) {
            bail!("{text:?} is not legal on {}", self.position.to_fen());
        }

        self.position.do_move(mv);
        Ok(())
    }

    /// Handles `setoption name <name> [value <value>]`.
    fn set_option(&mut self, name: &str, value: Option<String>) -> Result<()> {
        match name.to_ascii_lowercase().as_str() {
            "ownbook" => {
                let value = value.ok_or(anyhow!("OwnBook requires a value"))?;
                self.use_book = value
                    .parse()
                    .map_err(|_| anyhow!("OwnBook must be true or false. Got {value:?}"))?;
            }

            "bookfile" => {
                let path = value.ok_or(anyhow!("BookFile requires a path"))?;
                let book = PolyglotBook::load(&path)?;
                println!("info string loaded book with {} positions", book.len());
                self.book = Some(book);
            }

            _ => bail!("{} has no option named {name:?}", self.name()),
        }
        Ok(())
    }

    /// Spawns the search thread over a copy of the current position.
    fn start_search(&mut self, limits: Limits) {
        self.stop.store(false, Ordering::Relaxed);

        let position = self.position.clone();
        let stop = Arc::clone(&self.stop);
        let cache = Arc::clone(&self.cache);

        self.search_thread = Some(thread::spawn(move || {
            let mut cache = cache.lock().unwrap();
            Search::new(position, limits, stop, &Evaluator, &StdoutLogger, &mut cache).run()
        }));
    }

    /// Raises the stop flag and waits for the search thread, returning its
    /// result if one was running.
    fn stop_search(&mut self) -> Option<SearchResult> {
        self.stop.store(true, Ordering::Relaxed);

        let result = self
            .search_thread
            .take()?
            .join()
            .expect("Search thread panicked");
        Some(result)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads lines from stdin, parses each as UCI first and as a REPL command
/// second, and forwards them over the channel.
fn input_handler(sender: Sender<EngineCommand>) -> Result<()> {
    let mut buffer = String::with_capacity(2048);

    loop {
        buffer.clear();
        let bytes = io::stdin()
            .read_line(&mut buffer)
            .context("Failed to read line of input")?;

        // Ctrl+D; quit cleanly
        if bytes == 0 {
            sender
                .send(EngineCommand::Uci(UciCommand::Quit))
                .context("Failed to send 'quit' after end of input")?;
            return Ok(());
        }

        let line = buffer.trim();
        if line.is_empty() {
            continue;
        }

        let cmd = if let Ok(uci) = line.parse::<UciCommand>() {
            EngineCommand::Uci(uci)
        } else {
            match ReplCommand::try_parse_from(line.split_whitespace()) {
                Ok(repl) => EngineCommand::Repl(repl),
                Err(err) => {
                    eprintln!("{err}");
                    continue;
                }
            }
        };

        sender.send(cmd).context("Failed to send command")?;
    }
}
