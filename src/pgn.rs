use crate::encoder::{LegalMoveEncoder, MoveEncoder};
use crate::games::GameRow;
use pgn_reader::{RawComment, RawTag, Reader, SanPlus, Skip, Visitor};
use std::io::BufRead;
use std::ops::ControlFlow;
use tracing::warn;

/// How a streaming pass over one source file ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Captures headers and encodes moves for one game at a time. A bad move
/// token records a diagnostic on the row and stops encoding; the remaining
/// tokens of that game are skipped.
pub struct GameVisitor<E: MoveEncoder> {
    headers: Vec<(String, String)>,
    encoder: E,
    failed: Option<String>,
    pub current_game: Option<GameRow>,
}

impl<E: MoveEncoder> GameVisitor<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            headers: Vec::new(),
            encoder,
            failed: None,
            current_game: None,
        }
    }

    fn header(&self, key: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn finalize(&mut self, parse_error: Option<String>) {
        self.current_game = Some(GameRow {
            event: self.header("Event"),
            site: self.header("Site"),
            date: self.header("Date").or_else(|| self.header("UTCDate")),
            round: self.header("Round"),
            white: self.header("White"),
            black: self.header("Black"),
            result: self.header("Result"),
            eco: self.header("ECO"),
            opening: self.header("Opening"),
            moves: self.encoder.take(),
            parse_error,
        });
    }

    pub fn finalize_with_error(&mut self, message: String) {
        let recorded = self.failed.take().unwrap_or(message);
        self.finalize(Some(recorded));
    }
}

impl<E: MoveEncoder> Visitor for GameVisitor<E> {
    type Tags = ();
    type Movetext = ();
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.headers.clear();
        self.encoder.reset();
        self.failed = None;
        self.current_game = None;
        ControlFlow::Continue(())
    }

    fn tag(
        &mut self,
        _: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let key = String::from_utf8_lossy(key).to_string();
        let value = String::from_utf8_lossy(value.as_bytes()).to_string();
        self.headers.push((key, value));
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, _: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        if self.failed.is_none() {
            if let Err(err) = self.encoder.push(&san) {
                self.failed = Some(err.to_string());
            }
        }
        ControlFlow::Continue(())
    }

    fn comment(&mut self, _: &mut Self::Movetext, _: RawComment<'_>) -> ControlFlow<Self::Output> {
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, _: Self::Movetext) -> Self::Output {
        let failure = self.failed.take();
        self.finalize(failure);
    }
}

/// Streams one PGN file, delivering each parsed game to a callback. Reads
/// are line-buffered; the cancel hook is polled with the consumed byte
/// offset after every read, never mid-game-record write.
pub struct GameStream<R: BufRead> {
    reader: R,
    bytes_total: u64,
    bytes_done: u64,
    game_buffer: String,
    line_buffer: Vec<u8>,
    visitor: GameVisitor<LegalMoveEncoder>,
}

impl<R: BufRead> GameStream<R> {
    pub fn new(reader: R, bytes_total: u64) -> Self {
        Self {
            reader,
            bytes_total,
            bytes_done: 0,
            game_buffer: String::new(),
            line_buffer: Vec::new(),
            visitor: GameVisitor::new(LegalMoveEncoder::new()),
        }
    }

    /// Drive the whole file. `cancel` receives `(bytes_done, bytes_total)`
    /// and returns `false` to abort; `on_game` returns a failure message to
    /// abort after a delivery (e.g. a storage insert refused the row).
    pub fn run(
        mut self,
        cancel: &mut dyn FnMut(u64, u64) -> bool,
        mut on_game: impl FnMut(GameRow) -> Result<(), String>,
    ) -> StreamOutcome {
        loop {
            self.line_buffer.clear();
            let n = match self.reader.read_until(b'\n', &mut self.line_buffer) {
                Ok(n) => n,
                Err(err) => return StreamOutcome::Failed(format!("read error: {err}")),
            };
            if n == 0 {
                break;
            }
            self.bytes_done += n as u64;
            if !cancel(self.bytes_done, self.bytes_total) {
                return StreamOutcome::Cancelled;
            }

            let line = String::from_utf8_lossy(&self.line_buffer).into_owned();
            let starts_new_game = line.trim_start().starts_with("[Event ");
            if starts_new_game && !self.game_buffer.is_empty() {
                if let Some(row) = self.parse_buffered_game() {
                    if let Err(message) = on_game(row) {
                        return StreamOutcome::Failed(message);
                    }
                }
                self.game_buffer.clear();
            }
            self.game_buffer.push_str(&line);
        }

        // Last game in the file has no following [Event to close it.
        if !self.game_buffer.is_empty() {
            if let Some(row) = self.parse_buffered_game() {
                if let Err(message) = on_game(row) {
                    return StreamOutcome::Failed(message);
                }
            }
            self.game_buffer.clear();
        }
        StreamOutcome::Completed
    }

    fn parse_buffered_game(&mut self) -> Option<GameRow> {
        let mut reader = Reader::new(self.game_buffer.as_bytes());
        match reader.read_game(&mut self.visitor) {
            Ok(Some(())) => self.visitor.current_game.take(),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "malformed game record");
                self.visitor.finalize_with_error(format!("parse error: {err}"));
                self.visitor.current_game.take()
            }
        }
    }
}
