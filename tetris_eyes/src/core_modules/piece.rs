// The seven piece colors and the per-tick reading of one slot.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Piece {
    Red,
    Orange,
    Yellow,
    Green,
    Cyan,
    Blue,
    Purple,
}

impl Piece {
    /// Fixed order used for template lookup and tie-breaking.
    pub const ALL: [Piece; 7] = [
        Piece::Red,
        Piece::Orange,
        Piece::Yellow,
        Piece::Green,
        Piece::Cyan,
        Piece::Blue,
        Piece::Purple,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Piece::Red => "red",
            Piece::Orange => "orange",
            Piece::Yellow => "yellow",
            Piece::Green => "green",
            Piece::Cyan => "cyan",
            Piece::Blue => "blue",
            Piece::Purple => "purple",
        }
    }

    /// Single-letter code used on the wire: the first letter of the name.
    pub fn code(self) -> char {
        match self {
            Piece::Red => 'r',
            Piece::Orange => 'o',
            Piece::Yellow => 'y',
            Piece::Green => 'g',
            Piece::Cyan => 'c',
            Piece::Blue => 'b',
            Piece::Purple => 'p',
        }
    }

    pub fn from_code(code: char) -> Option<Piece> {
        Piece::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Display color for debug overlays.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Piece::Red => [220, 40, 40],
            Piece::Orange => [240, 140, 30],
            Piece::Yellow => [235, 215, 40],
            Piece::Green => [60, 200, 70],
            Piece::Cyan => [40, 210, 220],
            Piece::Blue => [50, 80, 220],
            Piece::Purple => [160, 60, 200],
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Code of an optional piece, `'.'` for none.
pub fn code_or_dot(piece: Option<Piece>) -> char {
    piece.map_or('.', Piece::code)
}

/// What the identifier saw in one slot on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PieceReading {
    pub piece: Option<Piece>,
    /// The match was unambiguous enough to overwrite committed state.
    pub locked_in: bool,
}

impl PieceReading {
    pub const EMPTY: PieceReading = PieceReading {
        piece: None,
        locked_in: false,
    };

    pub fn new(piece: Piece, locked_in: bool) -> Self {
        Self {
            piece: Some(piece),
            locked_in,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.piece.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_and_are_unique() {
        for piece in Piece::ALL {
            assert_eq!(Piece::from_code(piece.code()), Some(piece));
            assert_eq!(piece.name().chars().next(), Some(piece.code()));
        }
        assert_eq!(Piece::from_code('x'), None);
    }

    #[test]
    fn empty_reading_is_never_locked_in() {
        assert!(PieceReading::EMPTY.is_empty());
        assert!(!PieceReading::EMPTY.locked_in);
        assert_eq!(code_or_dot(None), '.');
        assert_eq!(code_or_dot(Some(Piece::Cyan)), 'c');
    }
}
