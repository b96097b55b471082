// THEORY:
// The `pipeline` module is the top-level per-frame API of the perception
// engine. A `GameSession` owns every piece of per-game memory (classifier
// calibration, stability histories, previous masks, committed queue and
// hold) and turns one frame at a time into a `Report`.
//
// Stages of one tick:
// 1.  **Extraction**: the frame is cut into the hold, board and queue images.
// 2.  **Classification**: the queue image feeds the classifier's calibration,
//     then all three images become occupancy masks.
// 3.  **Stability**: each mask is diffed against the previous tick's and the
//     change magnitudes go through the stabilizer.
// 4.  **Identification**: only when all three pictures are stable, the hold
//     and the six queue slots are matched against the templates and the
//     tracker decides whether the game has moved on.
// 5.  **Board**: the board mask is reduced to a cell grid and reconstructed
//     from the floor on every tick, so the debug view always has a board.
//
// A session is disposable. Starting a new game means building a new one.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EyesConfig;
use crate::core_modules::board::{BoardGrid, flood_fill};
use crate::core_modules::classifier::{CellClassifier, ClusterStats};
use crate::core_modules::emitter::StateChange;
use crate::core_modules::identifier::{PieceIdentifier, SlotRole, TemplateLibrary, TemplateMasks};
use crate::core_modules::mask::OccupancyMask;
use crate::core_modules::piece::{Piece, PieceReading};
use crate::core_modules::region::{Frame, RegionExtractor, extract_all};
use crate::core_modules::stabilizer::{StabilityVerdict, Stabilizer};
use crate::core_modules::tracker::{QUEUE_LEN, QueueHoldTracker, QueueState, TrackerOutcome};
use crate::error::Result;

/// What the session saw on one tick, whether or not anything was emitted.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub board: BoardGrid,
    pub queue: Option<QueueState>,
    pub hold: Option<Piece>,
    pub verdict: StabilityVerdict,
}

impl FrameAnalysis {
    /// The pictures were not all stable, so nothing was identified.
    pub fn obscured(&self) -> bool {
        !self.verdict.all()
    }
}

/// The primary output of the session for a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    NoSignificantChange,
    /// The first complete queue was committed; nothing is emitted for it.
    Baseline,
    StateChanged(StateChange),
}

#[derive(Debug, Clone)]
pub struct Tick {
    pub report: Report,
    pub analysis: FrameAnalysis,
}

/// Masks of the previous tick.
#[derive(Debug, Clone)]
struct PreviousMasks {
    hold: OccupancyMask,
    board: OccupancyMask,
    queue: OccupancyMask,
}

/// Per-game state of the perception pipeline.
pub struct GameSession {
    config: Arc<EyesConfig>,
    templates: Arc<TemplateLibrary>,
    classifier: CellClassifier,
    identifier: PieceIdentifier,
    stabilizer: Stabilizer,
    tracker: QueueHoldTracker,
    previous: Option<PreviousMasks>,
    template_masks: Option<(Option<ClusterStats>, TemplateMasks)>,
    frame_count: u64,
}

impl GameSession {
    pub fn new(config: Arc<EyesConfig>, templates: Arc<TemplateLibrary>) -> Self {
        Self {
            classifier: CellClassifier::new(&config.classifier),
            identifier: PieceIdentifier::new(config.identifier),
            stabilizer: Stabilizer::new(&config.stability),
            tracker: QueueHoldTracker::new(&config.tracker),
            previous: None,
            template_masks: None,
            frame_count: 0,
            config,
            templates,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn committed_queue(&self) -> Option<&QueueState> {
        self.tracker.queue()
    }

    pub fn committed_hold(&self) -> Option<Piece> {
        self.tracker.hold().and_then(|h| h.piece())
    }

    /// The classifier's current cluster statistics.
    pub fn cluster_stats(&self) -> Option<ClusterStats> {
        self.classifier.cluster_stats()
    }

    /// The statistics the cached template masks were classified with.
    pub fn template_stats(&self) -> Option<ClusterStats> {
        self.template_masks.as_ref().and_then(|(stats, _)| *stats)
    }

    pub fn process<E: RegionExtractor + ?Sized>(&mut self, frame: &Frame, extractor: &E) -> Result<Tick> {
        self.frame_count += 1;

        // --- 1. Extraction ---
        let regions = extract_all(extractor, frame, &self.config.region_sizes)?;

        // --- 2. Classification ---
        self.classifier.observe(&regions.queue, self.frame_count);
        let masks = PreviousMasks {
            hold: self.classifier.classify(&regions.hold),
            board: self.classifier.classify(&regions.board),
            queue: self.classifier.classify(&regions.queue),
        };

        // --- 3. Stability ---
        let (hold_change, board_change, queue_change) = match &self.previous {
            Some(previous) => (
                masks.hold.diff_count(&previous.hold),
                masks.board.diff_count(&previous.board),
                masks.queue.diff_count(&previous.queue),
            ),
            None => (masks.hold.area(), masks.board.area(), masks.queue.area()),
        };
        let verdict = self.stabilizer.observe(hold_change, board_change, queue_change);
        debug!(
            frame = self.frame_count,
            hold_change, board_change, queue_change,
            stable = verdict.all(),
            "frame classified"
        );

        // --- 4. Identification ---
        let outcome = if verdict.all() {
            let (queue, hold) = self.identify(&masks);
            Some(self.tracker.update(&queue, hold))
        } else {
            None
        };

        // --- 5. Board ---
        let board = flood_fill::reconstruct(&BoardGrid::from_mask(
            &masks.board,
            self.config.board.cell_fill_threshold,
        ));
        self.previous = Some(masks);

        let report = match outcome {
            Some(TrackerOutcome::Baseline) => {
                info!(
                    frame = self.frame_count,
                    queue = %self.tracker.queue().map(|q| q.codes()).unwrap_or_default(),
                    "baseline committed"
                );
                Report::Baseline
            }
            Some(TrackerOutcome::Committed(events)) if events.any() => match self.tracker.queue() {
                Some(queue) => Report::StateChanged(StateChange {
                    presented: self.tracker.presented(),
                    queue: *queue,
                    board,
                    hold: self.committed_hold(),
                    just_swapped: events.just_swapped,
                }),
                None => Report::NoSignificantChange,
            },
            _ => Report::NoSignificantChange,
        };

        Ok(Tick {
            report,
            analysis: FrameAnalysis {
                board,
                queue: self.tracker.queue().copied(),
                hold: self.committed_hold(),
                verdict,
            },
        })
    }

    /// Reads the six queue slots and the hold slot.
    fn identify(&mut self, masks: &PreviousMasks) -> ([PieceReading; QUEUE_LEN], PieceReading) {
        let stats = self.classifier.cluster_stats();
        let stale = self.template_masks.as_ref().is_none_or(|(cached, _)| *cached != stats);
        if stale {
            self.template_masks = Some((stats, self.templates.masks(&self.classifier)));
        }
        let Some((_, templates)) = &self.template_masks else {
            return ([PieceReading::EMPTY; QUEUE_LEN], PieceReading::EMPTY);
        };

        let hold = self.identifier.identify(&masks.hold, templates.for_role(SlotRole::Large));
        let mut queue = [PieceReading::EMPTY; QUEUE_LEN];
        for (index, slot) in masks.queue.split_rows(QUEUE_LEN as u32).iter().enumerate() {
            let role = if index == 0 { SlotRole::Large } else { SlotRole::Small };
            queue[index] = self.identifier.identify(slot, templates.for_role(role));
        }
        (queue, hold)
    }
}
