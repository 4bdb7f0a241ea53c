//! Poll loop behaviour against a scripted frame source

mod common;

use common::{fast_options, Counters, Reaction, ScriptedDisplay, ScriptedSource, Step};
use rtsp_viewer::bus::{BusEvent, RuntimeError};
use rtsp_viewer::session::{Session, StopReason};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn source_error() -> RuntimeError {
    RuntimeError::new("source", "Could not open resource for reading and writing.")
        .with_debug("gstrtspsrc.c(8146): Failed to connect.")
}

fn session(steps: Vec<Step>) -> (Session<ScriptedSource>, Counters) {
    let (source, counters) = ScriptedSource::new(steps);
    (Session::new(source, fast_options()), counters)
}

#[test]
fn end_of_stream_on_first_bus_check_stops_after_one_iteration() {
    let (session, counters) = session(vec![Step::timeout().with_event(BusEvent::EndOfStream)]);
    let mut display = ScriptedDisplay::continuing();

    let report = session.run(&mut display);

    assert_eq!(report.reason, StopReason::EndOfStream);
    assert_eq!(report.reason.exit_code(), 0);
    assert_eq!(report.iterations, 1);
    assert_eq!(counters.pulls(), 1);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn error_event_stops_in_the_same_iteration() {
    let (session, counters) = session(vec![
        Step::frame(),
        Step::frame().with_event(BusEvent::Error(source_error())),
        Step::frame(),
    ]);
    let mut display = ScriptedDisplay::continuing();

    let report = session.run(&mut display);

    assert_eq!(report.reason, StopReason::Error(source_error()));
    assert_ne!(report.reason.exit_code(), 0);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.frames, 2);
    assert_eq!(counters.pulls(), 2);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn quit_and_error_in_the_same_iteration_are_both_handled() {
    let (session, counters) = session(vec![
        Step::frame(),
        Step::frame(),
        Step::frame()
            .with_event(BusEvent::Other("Latency".into()))
            .with_event(BusEvent::Error(source_error())),
    ]);
    let mut display = ScriptedDisplay::new(vec![
        Reaction::Continue,
        Reaction::Continue,
        Reaction::Quit,
    ]);

    let report = session.run(&mut display);

    // Quit did not skip the drain: the error was still seen and reported
    assert_eq!(report.reason, StopReason::Error(source_error()));
    assert_eq!(report.iterations, 3);
    assert_eq!(display.shown.len(), 3);
    assert_eq!(counters.pending(), 0);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn quit_request_stops_cleanly() {
    let (session, counters) = session(vec![Step::frame(), Step::frame(), Step::frame()]);
    let mut display = ScriptedDisplay::new(vec![Reaction::Continue, Reaction::Quit]);

    let report = session.run(&mut display);

    assert_eq!(report.reason, StopReason::UserQuit);
    assert_eq!(report.reason.exit_code(), 0);
    assert_eq!(report.frames, 2);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn timeouts_never_stop_the_loop() {
    let mut steps: Vec<Step> = (0..5).map(|_| Step::timeout()).collect();
    steps.push(Step::frame().with_event(BusEvent::EndOfStream));
    let (session, counters) = session(steps);
    let mut display = ScriptedDisplay::continuing();

    let report = session.run(&mut display);

    assert_eq!(report.reason, StopReason::EndOfStream);
    assert_eq!(report.iterations, 6);
    assert_eq!(report.frames, 1);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn bus_is_drained_on_timeout_iterations() {
    let (mut session, counters) = session(vec![Step::timeout()
        .with_event(BusEvent::Other("StateChanged".into()))
        .with_event(BusEvent::Other("StreamStart".into()))]);
    let mut display = ScriptedDisplay::continuing();

    let iteration = session.poll_once(&mut display);

    assert!(iteration.timed_out);
    assert!(!iteration.displayed);
    assert_eq!(iteration.events, 2);
    assert_eq!(counters.pending(), 0);
    assert!(session.run_state().is_running());
}

#[test]
fn drain_is_exhaustive_and_keeps_order() {
    let (mut session, counters) = session(vec![Step::frame()
        .with_event(BusEvent::EndOfStream)
        .with_event(BusEvent::Error(source_error()))
        .with_event(BusEvent::Other("Eos".into()))]);
    let mut display = ScriptedDisplay::continuing();

    let iteration = session.poll_once(&mut display);

    assert!(iteration.displayed);
    assert_eq!(iteration.events, 3);
    assert_eq!(counters.pending(), 0);
    assert_eq!(
        session.run_state().reason(),
        Some(&StopReason::Error(source_error()))
    );
}

#[test]
fn frames_are_only_borrowed_during_display() {
    let (session, counters) = session(vec![
        Step::frame(),
        Step::frame(),
        Step::frame().with_event(BusEvent::EndOfStream),
    ]);
    let mut display = ScriptedDisplay::continuing().watching(&counters);

    let report = session.run(&mut display);

    assert_eq!(report.frames, 3);
    assert!(!counters.is_mapped());
    let sequences: Vec<u64> = display.shown.iter().map(|(_, _, seq)| *seq).collect();
    assert_eq!(sequences, [0, 1, 2]);
}

#[test]
fn display_failure_releases_frame_and_stops() {
    let (session, counters) = session(vec![Step::frame(), Step::frame()]);
    let mut display = ScriptedDisplay::new(vec![Reaction::Fail]).watching(&counters);

    let report = session.run(&mut display);

    assert!(matches!(report.reason, StopReason::DisplayFailed(_)));
    assert_ne!(report.reason.exit_code(), 0);
    assert!(!counters.is_mapped());
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn malformed_samples_are_skipped() {
    let (session, counters) = session(vec![
        Step::malformed(),
        Step::frame().with_event(BusEvent::EndOfStream),
    ]);
    let mut display = ScriptedDisplay::continuing();

    let report = session.run(&mut display);

    assert_eq!(report.reason, StopReason::EndOfStream);
    assert_eq!(report.iterations, 2);
    assert_eq!(report.frames, 1);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn interrupt_stops_before_the_next_pull() {
    let (source, counters) = ScriptedSource::new(vec![Step::frame(), Step::frame()]);
    let interrupt = Arc::new(AtomicBool::new(false));
    let mut session = Session::new(source, fast_options()).with_interrupt(interrupt.clone());
    let mut display = ScriptedDisplay::continuing();

    session.poll_once(&mut display);
    interrupt.store(true, Ordering::Relaxed);
    let report = session.run(&mut display);

    assert_eq!(report.reason, StopReason::Interrupted);
    assert_eq!(report.reason.exit_code(), 0);
    assert_eq!(counters.pulls(), 1);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn stall_watchdog_stops_when_enabled() {
    let (source, counters) = ScriptedSource::new(Vec::new());
    let mut options = fast_options();
    options.stall_timeout = Some(Duration::from_millis(20));
    let session = Session::new(source, options);
    let mut display = ScriptedDisplay::continuing();

    let report = session.run(&mut display);

    assert_eq!(
        report.reason,
        StopReason::Stalled(Duration::from_millis(20))
    );
    assert!(report.iterations >= 1);
    assert_eq!(report.frames, 0);
    assert_eq!(counters.teardowns(), 1);
}

#[test]
fn stall_watchdog_is_off_by_default() {
    let (mut session, _counters) = session(Vec::new());
    let mut display = ScriptedDisplay::continuing();

    for _ in 0..20 {
        session.poll_once(&mut display);
    }

    assert!(session.run_state().is_running());
}
