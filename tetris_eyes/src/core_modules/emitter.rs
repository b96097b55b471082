// The line protocol spoken on standard output. One block per state change,
// each block ending with a blank line so a reader can split on it.

use std::fmt;
use std::io::Write;

use crate::core_modules::board::BoardGrid;
use crate::core_modules::piece::{Piece, code_or_dot};
use crate::core_modules::tracker::QueueState;
use crate::error::Result;

/// Everything a consumer learns when the game moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub presented: Option<Piece>,
    pub queue: QueueState,
    pub board: BoardGrid,
    pub hold: Option<Piece>,
    pub just_swapped: bool,
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "presented")?;
        writeln!(f, "{}", code_or_dot(self.presented))?;
        writeln!(f, "queue")?;
        writeln!(f, "{}", self.queue.codes())?;
        writeln!(f, "board")?;
        for row in self.board.rows() {
            let line: String = row.iter().map(|&c| if c { 'x' } else { '.' }).collect();
            writeln!(f, "{line}")?;
        }
        writeln!(f, "in_hold")?;
        writeln!(f, "{}", code_or_dot(self.hold))?;
        writeln!(f, "just_swapped")?;
        writeln!(f, "{}", self.just_swapped)?;
        writeln!(f)
    }
}

/// Writes protocol output and flushes after every message.
pub struct StateEmitter<W: Write> {
    out: W,
}

impl<W: Write> StateEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn emit(&mut self, change: &StateChange) -> Result<()> {
        write!(self.out, "{change}")?;
        self.out.flush()?;
        Ok(())
    }

    /// Echo of an unrecognized command.
    pub fn echo(&mut self, token: &str) -> Result<()> {
        writeln!(self.out, "!{token}!")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Piece::*;

    #[test]
    fn block_layout_matches_protocol() {
        let mut board = BoardGrid::default();
        board.set(19, 0, true);
        board.set(19, 9, true);
        let change = StateChange {
            presented: Some(Red),
            queue: QueueState::from_pieces([Orange, Yellow, Green, Blue, Purple, Purple]),
            board,
            hold: None,
            just_swapped: false,
        };
        let mut emitter = StateEmitter::new(Vec::new());
        emitter.emit(&change).unwrap();
        let text = String::from_utf8(emitter.into_inner()).unwrap();

        let mut expected = String::from("presented\nr\nqueue\noygbpp\nboard\n");
        for _ in 0..19 {
            expected.push_str("..........\n");
        }
        expected.push_str("x........x\n");
        expected.push_str("in_hold\n.\njust_swapped\nfalse\n\n");
        assert_eq!(text, expected);
    }

    #[test]
    fn echo_wraps_token() {
        let mut emitter = StateEmitter::new(Vec::new());
        emitter.echo("hello").unwrap();
        assert_eq!(emitter.into_inner(), b"!hello!\n");
    }
}
