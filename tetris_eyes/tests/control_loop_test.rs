mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{EMPTY_ROW, RecordingSink, Scene, ScriptedSource, SinkEvent, config, templates};
use image::RgbImage;
use tetris_eyes::control::signal_channel;
use tetris_eyes::core_modules::piece::Piece::*;
use tetris_eyes::core_modules::region::{CropExtractor, Frame};
use tetris_eyes::{ControlLoop, ControlSignal, ControlState, ExitReason, Result, spawn_renderer};

fn shift_frames() -> Vec<Frame> {
    let before = Scene {
        hold: None,
        queue: [Red, Orange, Yellow, Green, Blue, Purple],
        board: vec![(19, 9)],
    }
    .render();
    let after = Scene {
        hold: None,
        queue: [Orange, Yellow, Green, Blue, Purple, Purple],
        board: vec![(19, 9)],
    }
    .render();
    vec![before.clone(), before.clone(), before, after.clone(), after]
}

fn expected_shift_block() -> String {
    let mut block = String::from("presented\nr\nqueue\noygbpp\nboard\n");
    for _ in 0..19 {
        block.push_str(EMPTY_ROW);
        block.push('\n');
    }
    block.push_str(".........x\n");
    block.push_str("in_hold\n.\njust_swapped\nfalse\n\n");
    block
}

struct Run {
    outcome: Result<ExitReason>,
    output: String,
    events: Vec<SinkEvent>,
    served: usize,
    released: bool,
    seen_states: Vec<ControlState>,
    final_state: ControlState,
}

impl Run {
    fn reason(&self) -> ExitReason {
        *self.outcome.as_ref().expect("control loop failed")
    }
}

fn run(commands: &str, source: ScriptedSource, signals: tokio::sync::mpsc::UnboundedReceiver<ControlSignal>) -> Run {
    let config = config();
    let extractor = CropExtractor::new(&config.calibration, config.region_sizes).unwrap();
    let sink = RecordingSink::default();
    let events = sink.events.clone();
    let renderer = spawn_renderer(sink, &config.renderer).unwrap();
    let served = source.served.clone();
    let released = source.released.clone();
    let observer = source.observer.clone();
    let seen_states = source.seen_states.clone();

    let mut output = Vec::new();
    let control = ControlLoop::new(
        Arc::new(config),
        Arc::new(templates()),
        source,
        extractor,
        commands.as_bytes(),
        &mut output,
        signals,
        renderer,
    );
    let state = control.watch_state();
    *observer.lock().unwrap() = Some(control.watch_state());
    let outcome = control.run();
    let events = events.lock().unwrap().clone();
    let seen_states = seen_states.lock().unwrap().clone();
    let final_state = *state.borrow();
    Run {
        outcome,
        output: String::from_utf8(output).unwrap(),
        events,
        served: served.load(Ordering::SeqCst),
        released: released.load(Ordering::SeqCst),
        seen_states,
        final_state,
    }
}

#[test]
fn echoes_then_plays_until_the_source_runs_out() {
    let (_signals_tx, signals) = signal_channel();
    let result = run("hello\n\nplay\n", ScriptedSource::new(shift_frames()), signals);

    assert_eq!(result.reason(), ExitReason::SourceExhausted);
    assert_eq!(result.output, format!("!hello!\n{}", expected_shift_block()));
    assert_eq!(result.served, 5);
    assert!(result.released);

    let presented: Vec<_> = result
        .events
        .iter()
        .filter_map(|e| match e {
            SinkEvent::Present { frame_index, obscured } => Some((*frame_index, *obscured)),
            _ => None,
        })
        .collect();
    assert_eq!(presented, vec![(1, true), (2, true), (3, false), (4, true), (5, false)]);
    assert_eq!(result.events.first(), Some(&SinkEvent::Begin));
    assert_eq!(&result.events[result.events.len() - 2..], &[SinkEvent::End, SinkEvent::Close]);
}

#[test]
fn interrupt_pauses_and_commands_resume() {
    let (signals_tx, signals) = signal_channel();
    let source = ScriptedSource::new(shift_frames()).interrupt_after(2, signals_tx);
    let result = run("play\nstatus\nexit\n", source, signals);

    assert_eq!(result.reason(), ExitReason::Exit);
    assert_eq!(result.output, "!status!\n");
    assert_eq!(result.seen_states, vec![ControlState::Playing; 2]);
    assert_eq!(result.final_state, ControlState::Paused);
    assert_eq!(result.served, 2);
    assert!(result.released);
    assert_eq!(
        result.events,
        vec![
            SinkEvent::Begin,
            SinkEvent::Present { frame_index: 1, obscured: true },
            SinkEvent::Present { frame_index: 2, obscured: true },
            SinkEvent::End,
            SinkEvent::Close,
        ]
    );
}

#[test]
fn second_play_starts_a_fresh_session() {
    let (signals_tx, signals) = signal_channel();
    let source = ScriptedSource::new(shift_frames()).interrupt_after(3, signals_tx);
    // The first session commits the baseline from frames 1-3. The second
    // starts over from frame 4 and never sees a change, so nothing is emitted.
    let result = run("play\nplay\n", source, signals);

    assert_eq!(result.reason(), ExitReason::SourceExhausted);
    assert_eq!(result.output, "");
    let begins = result.events.iter().filter(|e| **e == SinkEvent::Begin).count();
    assert_eq!(begins, 2);
    let last_index = result.events.iter().rev().find_map(|e| match e {
        SinkEvent::Present { frame_index, .. } => Some(*frame_index),
        _ => None,
    });
    assert_eq!(last_index, Some(2), "frame counter restarts with the session");
}

#[test]
fn stale_interrupts_are_drained_on_play() {
    let (signals_tx, signals) = signal_channel();
    signals_tx.send(ControlSignal::Interrupt).unwrap();
    let result = run("play\n", ScriptedSource::new(shift_frames()), signals);

    assert_eq!(result.reason(), ExitReason::SourceExhausted);
    assert_eq!(result.served, 5);
    assert_eq!(result.output, expected_shift_block());
}

#[test]
fn end_of_input_while_paused_closes_cleanly() {
    let (_signals_tx, signals) = signal_channel();
    let result = run("", ScriptedSource::new(shift_frames()), signals);

    assert_eq!(result.reason(), ExitReason::InputClosed);
    assert_eq!(result.output, "");
    assert_eq!(result.served, 0);
    assert!(result.released);
    assert_eq!(result.events, vec![SinkEvent::Close]);
}

#[test]
fn pass_through_keeps_surrounding_spaces() {
    let (_signals_tx, signals) = signal_channel();
    let result = run("  foo \r\nexit\n", ScriptedSource::new(shift_frames()), signals);

    assert_eq!(result.reason(), ExitReason::Exit);
    assert_eq!(result.output, "!  foo !\n");
    assert!(result.seen_states.is_empty());
    assert_eq!(result.final_state, ControlState::Paused);
}

#[test]
fn session_failure_still_cleans_up() {
    let (_signals_tx, signals) = signal_channel();
    // Smaller than every calibrated region.
    let source = ScriptedSource::new(vec![RgbImage::new(10, 10)]);
    let result = run("play\n", source, signals);

    assert!(result.outcome.is_err());
    assert!(result.released);
    assert_eq!(result.served, 1);
    assert_eq!(result.output, "");
    // No session end: the failure skips the pause, only the shutdown closes the sink.
    assert_eq!(result.events, vec![SinkEvent::Begin, SinkEvent::Close]);
}
