// THEORY:
// The `tracker` module adds memory to piece identification. Individual
// readings are noisy: a slot can be misread on any one tick, or come back
// ambiguous while the game animates. The `QueueHoldTracker` keeps the
// committed queue and hold across ticks and decides when the game has
// actually moved on.
//
// Key rules:
// 1.  **Carry-forward**: a committed reading that was locked in survives a
//     new reading that is not. Ambiguity never erases confident knowledge.
// 2.  **Baseline**: the first fully-populated queue is committed silently;
//     there is no earlier state to compare it with.
// 3.  **Validity**: after the baseline, a merged queue with any empty slot is
//     deferred and nothing is committed.
// 4.  **Shift**: the queue has advanced when enough slots differ from the
//     committed queue; exact equality is not required because any single
//     slot may be misread. The piece that left is the old first slot.
// 5.  **Swap**: the hold label changed. Without a concurrent shift, the piece
//     that left is the old hold.
// 6.  **Atomic commit**: queue and hold are committed together on the same
//     tick, so swap and shift timing always refer to the same reading.

use crate::config::TrackerConfig;
use crate::core_modules::piece::{Piece, PieceReading, code_or_dot};

/// Number of visible queue slots.
pub const QUEUE_LEN: usize = 6;

/// The six queue readings, nearest-next first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueState {
    slots: [PieceReading; QUEUE_LEN],
}

impl QueueState {
    pub fn new(slots: [PieceReading; QUEUE_LEN]) -> Self {
        Self { slots }
    }

    /// A queue of locked-in readings, for fixtures and replays.
    pub fn from_pieces(pieces: [Piece; QUEUE_LEN]) -> Self {
        Self {
            slots: pieces.map(|p| PieceReading::new(p, true)),
        }
    }

    pub fn slots(&self) -> &[PieceReading; QUEUE_LEN] {
        &self.slots
    }

    pub fn first(&self) -> Option<Piece> {
        self.slots[0].piece
    }

    pub fn is_fully_populated(&self) -> bool {
        self.slots.iter().all(|s| !s.is_empty())
    }

    /// Number of slots whose labels differ.
    pub fn differing_slots(&self, other: &QueueState) -> usize {
        self.slots
            .iter()
            .zip(&other.slots)
            .filter(|(a, b)| a.piece != b.piece)
            .count()
    }

    /// The six piece codes, `'.'` for an empty slot.
    pub fn codes(&self) -> String {
        self.slots.iter().map(|s| code_or_dot(s.piece)).collect()
    }
}

/// The hold slot reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HoldState {
    pub reading: PieceReading,
}

impl HoldState {
    pub fn piece(&self) -> Option<Piece> {
        self.reading.piece
    }
}

/// Events raised by a committing tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerEvents {
    pub queue_changed: bool,
    pub just_swapped: bool,
}

impl TrackerEvents {
    pub fn any(&self) -> bool {
        self.queue_changed || self.just_swapped
    }
}

/// Result of feeding one stable tick to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerOutcome {
    /// The reading was incomplete; committed state is unchanged.
    Deferred,
    /// The first complete reading was committed as the baseline.
    Baseline,
    /// The reading was committed on top of an existing baseline.
    Committed(TrackerEvents),
}

/// Keeps a committed reading unless it was confident and the new one is not.
fn merge(previous: PieceReading, current: PieceReading) -> PieceReading {
    if previous.locked_in && !current.locked_in {
        previous
    } else {
        current
    }
}

#[derive(Debug, Clone)]
pub struct QueueHoldTracker {
    shift_threshold: usize,
    committed: Option<(QueueState, HoldState)>,
    presented: Option<Piece>,
}

impl QueueHoldTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            shift_threshold: config.shift_threshold,
            committed: None,
            presented: None,
        }
    }

    pub fn update(&mut self, queue: &[PieceReading; QUEUE_LEN], hold: PieceReading) -> TrackerOutcome {
        let Some((previous_queue, previous_hold)) = self.committed else {
            let baseline = QueueState::new(*queue);
            if !baseline.is_fully_populated() {
                return TrackerOutcome::Deferred;
            }
            self.committed = Some((baseline, HoldState { reading: hold }));
            return TrackerOutcome::Baseline;
        };

        let mut merged = previous_queue.slots;
        for (slot, current) in merged.iter_mut().zip(queue) {
            *slot = merge(*slot, *current);
        }
        let merged_queue = QueueState::new(merged);
        let merged_hold = HoldState {
            reading: merge(previous_hold.reading, hold),
        };

        if !merged_queue.is_fully_populated() {
            return TrackerOutcome::Deferred;
        }

        let events = TrackerEvents {
            queue_changed: previous_queue.differing_slots(&merged_queue) >= self.shift_threshold,
            just_swapped: merged_hold.piece() != previous_hold.piece(),
        };
        if events.queue_changed {
            self.presented = previous_queue.first();
        } else if events.just_swapped {
            self.presented = previous_hold.piece();
        }

        self.committed = Some((merged_queue, merged_hold));
        TrackerOutcome::Committed(events)
    }

    pub fn queue(&self) -> Option<&QueueState> {
        self.committed.as_ref().map(|(queue, _)| queue)
    }

    pub fn hold(&self) -> Option<&HoldState> {
        self.committed.as_ref().map(|(_, hold)| hold)
    }

    /// The piece that most recently left the queue or the hold.
    pub fn presented(&self) -> Option<Piece> {
        self.presented
    }
}
