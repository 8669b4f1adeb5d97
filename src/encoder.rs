use shakmaty::{san::SanPlus, Chess, Position};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("illegal or ambiguous move {0}")]
    Illegal(String),
}

/// Produces the opaque per-game move blob consumed by the store and the
/// popularity sort. Implementations must be deterministic: the same move
/// sequence always yields the same bytes.
pub trait MoveEncoder {
    /// Forget any game in progress and start from the initial position.
    fn reset(&mut self);
    /// Append one half-move to the blob under construction.
    fn push(&mut self, san: &SanPlus) -> Result<(), EncodeError>;
    /// Take the finished blob, leaving the encoder ready for `reset`.
    fn take(&mut self) -> Vec<u8>;
}

/// Encodes each half-move as its index within the legal-move list of the
/// position it was played from. Any legal position has at most 218 legal
/// moves, so one byte per half-move always suffices.
pub struct LegalMoveEncoder {
    pos: Chess,
    blob: Vec<u8>,
}

impl LegalMoveEncoder {
    pub fn new() -> Self {
        Self {
            pos: Chess::default(),
            blob: Vec::new(),
        }
    }
}

impl MoveEncoder for LegalMoveEncoder {
    fn reset(&mut self) {
        self.pos = Chess::default();
        self.blob.clear();
    }

    fn push(&mut self, san: &SanPlus) -> Result<(), EncodeError> {
        let m = san
            .san
            .to_move(&self.pos)
            .map_err(|_| EncodeError::Illegal(san.to_string()))?;
        let index = self
            .pos
            .legal_moves()
            .iter()
            .position(|legal| *legal == m)
            .ok_or_else(|| EncodeError::Illegal(san.to_string()))?;
        self.blob.push(index as u8);
        self.pos.play_unchecked(m);
        Ok(())
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(sans: &[&str]) -> Vec<u8> {
        let mut encoder = LegalMoveEncoder::new();
        encoder.reset();
        for token in sans {
            let san: SanPlus = token.parse().expect("valid SAN");
            encoder.push(&san).expect("legal move");
        }
        encoder.take()
    }

    #[test]
    fn same_moves_same_blob() {
        let a = encode(&["e4", "e5", "Nf3", "Nc6"]);
        let b = encode(&["e4", "e5", "Nf3", "Nc6"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn diverging_first_move_differs_at_byte_zero() {
        let a = encode(&["e4"]);
        let b = encode(&["d4"]);
        assert_ne!(a[0], b[0]);
    }

    #[test]
    fn shared_prefix_shares_bytes() {
        let a = encode(&["d4", "Nf6", "c4"]);
        let b = encode(&["d4", "Nf6", "e4"]);
        assert_eq!(a[..2], b[..2]);
        assert_ne!(a[2], b[2]);
    }

    #[test]
    fn illegal_move_is_rejected() {
        let mut encoder = LegalMoveEncoder::new();
        encoder.reset();
        let san: SanPlus = "Ke2".parse().expect("parses as SAN");
        assert!(encoder.push(&san).is_err());
    }

    #[test]
    fn reset_starts_over() {
        let mut encoder = LegalMoveEncoder::new();
        encoder.reset();
        let san: SanPlus = "e4".parse().unwrap();
        encoder.push(&san).unwrap();
        encoder.reset();
        let san: SanPlus = "e4".parse().unwrap();
        encoder.push(&san).unwrap();
        assert_eq!(encoder.take().len(), 1);
    }
}
