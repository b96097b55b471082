// THEORY:
// The stabilizer debounces the three tracked pictures (hold, board, queue).
// For each one it keeps a sliding window of "change magnitudes": how many
// mask pixels differ from the previous tick. A picture is stable when the
// window is full and the newest magnitude is not much larger than the
// window's median. A single blurred or glitched frame spikes above the
// median and is ignored; a real change, once it has settled, drops back to
// the median and is accepted.
//
// The comparison is `<=`, not `<`: after a long still stretch the median is
// zero and a zero reading must still count as stable.

use std::collections::VecDeque;

use crate::config::StabilityConfig;

/// Bounded history of readings for one tracked picture.
#[derive(Debug, Clone)]
pub struct StabilityHistory {
    readings: VecDeque<f64>,
    capacity: usize,
    allowable_ratio: f64,
}

impl StabilityHistory {
    pub fn new(capacity: usize, allowable_ratio: f64) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity + 1),
            capacity,
            allowable_ratio,
        }
    }

    /// Records `reading` and returns whether the picture is stable.
    pub fn observe(&mut self, reading: f64) -> bool {
        self.readings.push_back(reading);
        if self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
        if !self.is_full() {
            return false;
        }
        reading <= self.median() * self.allowable_ratio
    }

    pub fn is_full(&self) -> bool {
        self.readings.len() >= self.capacity
    }

    fn median(&self) -> f64 {
        let mut sorted: Vec<f64> = self.readings.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

/// Per-picture stability of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StabilityVerdict {
    pub hold: bool,
    pub board: bool,
    pub queue: bool,
}

impl StabilityVerdict {
    /// All three pictures are stable.
    pub fn all(&self) -> bool {
        self.hold && self.board && self.queue
    }
}

/// The three independent histories of a session.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    hold: StabilityHistory,
    board: StabilityHistory,
    queue: StabilityHistory,
}

impl Stabilizer {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            hold: StabilityHistory::new(config.history_len, config.hold_ratio),
            board: StabilityHistory::new(config.history_len, config.board_ratio),
            queue: StabilityHistory::new(config.history_len, config.queue_ratio),
        }
    }

    pub fn observe(&mut self, hold_change: usize, board_change: usize, queue_change: usize) -> StabilityVerdict {
        StabilityVerdict {
            hold: self.hold.observe(hold_change as f64),
            board: self.board.observe(board_change as f64),
            queue: self.queue.observe(queue_change as f64),
        }
    }
}
