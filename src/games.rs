/// One parsed game: seven-tag-roster headers, the encoded move blob and an
/// optional parse diagnostic. Identity is positional within a list; two rows
/// with equal fields are still distinct games.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRow {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub round: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub eco: Option<String>,
    pub opening: Option<String>,
    /// Opaque move-sequence encoding, one byte per half-move.
    pub moves: Vec<u8>,
    /// Set when the movetext could not be fully parsed; the blob is
    /// truncated at the first bad token.
    pub parse_error: Option<String>,
}

impl GameRow {
    pub fn white_label(&self) -> &str {
        self.white.as_deref().unwrap_or("?")
    }

    pub fn black_label(&self) -> &str {
        self.black.as_deref().unwrap_or("?")
    }
}

/// Capability required by the popularity sort: expose the encoded move
/// sequence of a game.
pub trait MoveBlob {
    fn move_blob(&self) -> &[u8];
}

impl MoveBlob for GameRow {
    fn move_blob(&self) -> &[u8] {
        &self.moves
    }
}
