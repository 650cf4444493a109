// Full conversion lifecycle against stand-in ffmpeg/ffprobe scripts.
// Spawns real processes through SystemLauncher, so these only run on unix.
#![cfg(unix)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hdr2sdr::engine::{
    CommandBuilder, FfprobeProbe, FilterKind, Platform, ProcessSupervisor, SupervisorState,
    SystemLauncher, TerminalState,
};

use crate::common::ffmpeg_runner::*;
use crate::common::helpers::*;

const SETTLE: Duration = Duration::from_secs(20);

fn supervisor(
    tools: &FakeTools,
    ffmpeg_body: &str,
) -> ProcessSupervisor<FfprobeProbe, SystemLauncher> {
    let ffmpeg = tools.ffmpeg("ffmpeg", ffmpeg_body);
    let probe = FfprobeProbe::new(tools.ffprobe());
    ProcessSupervisor::new(
        probe,
        CommandBuilder::new(ffmpeg, Platform::Linux),
        SystemLauncher,
    )
}

#[test]
fn test_cuda_failure_falls_back_to_cpu_and_completes() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let output = tools.path().join("movie.sdr.mp4");
    let mut sup = supervisor(&tools, FFMPEG_CUDA_FAILS);

    let mut req = request(&input, &output);
    req.use_gpu = true;
    let first = sup.start(req).expect("start");

    let mut obs = RecordingObserver::default();
    dispatch_until_settled(&mut sup, &mut obs, SETTLE);

    let terminals = obs.terminals();
    assert_eq!(terminals.len(), 2, "{:?}", obs.events);
    let next = match &terminals[0] {
        (id, TerminalState::Retrying { next }) if *id == first => *next,
        other => panic!("expected Retrying for the GPU job, got {:?}", other),
    };
    assert_ne!(next, first);
    assert_eq!(
        terminals[1],
        (next, TerminalState::Completed { output: output.clone() })
    );

    assert_eq!(obs.progress(), vec![25.0, 50.0]);
    assert!(obs.lines().iter().any(|l| l.contains("libcuda")));
    assert_eq!(sup.state(), SupervisorState::Completed);
}

#[test]
fn test_plain_failure_reports_exit_code_and_diagnostics() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let mut sup = supervisor(&tools, FFMPEG_FAILS);

    let id = sup
        .start(request(&input, tools.path().join("out.mp4")))
        .expect("start");
    let mut obs = RecordingObserver::default();
    dispatch_until_settled(&mut sup, &mut obs, SETTLE);

    match obs.terminals().as_slice() {
        [(job, TerminalState::Failed { code, diagnostics })] => {
            assert_eq!(*job, id);
            assert_eq!(*code, Some(1));
            assert!(diagnostics.iter().any(|l| l.contains("Permission denied")));
        }
        other => panic!("expected a single Failed, got {:?}", other),
    }
    assert_eq!(sup.state(), SupervisorState::Failed);
}

#[test]
fn test_cancel_stops_a_hanging_conversion() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let mut sup = supervisor(&tools, FFMPEG_HANGS);

    let id = sup
        .start(request(&input, tools.path().join("out.mp4")))
        .expect("start");

    // Wait for the first progress line so the process is really running
    let mut obs = RecordingObserver::default();
    let deadline = std::time::Instant::now() + SETTLE;
    while obs.progress().is_empty() {
        assert!(std::time::Instant::now() < deadline, "no progress reported");
        sup.wait_and_dispatch(&mut obs, Duration::from_millis(50));
    }

    assert!(sup.cancel());
    assert!(!sup.cancel(), "second cancel must be a no-op");
    dispatch_until_settled(&mut sup, &mut obs, SETTLE);

    assert_eq!(obs.terminals(), vec![(id, TerminalState::Cancelled)]);
    assert!(matches!(
        obs.events.last(),
        Some(Event::Terminal(_, TerminalState::Cancelled))
    ));
    assert_eq!(sup.state(), SupervisorState::Cancelled);
}

#[test]
fn test_interrupt_from_another_thread_cancels_the_conversion() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let mut sup = supervisor(&tools, FFMPEG_HANGS);

    let id = sup
        .start(request(&input, tools.path().join("out.mp4")))
        .expect("start");

    let mut obs = RecordingObserver::default();
    let deadline = std::time::Instant::now() + SETTLE;
    while obs.progress().is_empty() {
        assert!(std::time::Instant::now() < deadline, "no progress reported");
        sup.wait_and_dispatch(&mut obs, Duration::from_millis(50));
    }

    // Stands in for the Ctrl-C handler
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    let signaller = std::thread::spawn(move || flag.store(true, Ordering::SeqCst));
    signaller.join().expect("signaller thread");

    let started = std::time::Instant::now();
    sup.drive_until_settled(&mut obs, Duration::from_millis(50), &interrupt);

    // The stand-in sleeps for 30s; settling early means it was terminated
    assert!(started.elapsed() < SETTLE);
    assert_eq!(obs.terminals(), vec![(id, TerminalState::Cancelled)]);
    assert!(matches!(
        obs.events.last(),
        Some(Event::Terminal(_, TerminalState::Cancelled))
    ));
    assert_eq!(sup.state(), SupervisorState::Cancelled);
    assert!(!sup.is_busy());
}

#[test]
fn test_dynamic_conversion_uses_probed_max_fall() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let args_log = tools.path().join("ffmpeg-args.log");
    let body = format!("echo \"$@\" > '{}'\nexit 0\n", args_log.display());
    let mut sup = supervisor(&tools, &body);

    let mut req = request(&input, tools.path().join("out.mp4"));
    req.filter_kind = FilterKind::Dynamic;
    sup.start(req).expect("start");

    let mut obs = RecordingObserver::default();
    dispatch_until_settled(&mut sup, &mut obs, SETTLE);

    let recorded = std::fs::read_to_string(&args_log).expect("ffmpeg ran");
    assert!(recorded.contains("zscale=t=linear:npl=350.0"), "{}", recorded);
    assert!(recorded.contains("scale=1920:1080[vout]"), "{}", recorded);
    assert!(matches!(
        obs.terminals().as_slice(),
        [(_, TerminalState::Completed { .. })]
    ));
}

#[test]
fn test_missing_input_never_spawns() {
    let tools = FakeTools::new();
    let marker = tools.path().join("spawned");
    let body = format!("touch '{}'\nexit 0\n", marker.display());
    let mut sup = supervisor(&tools, &body);

    let err = sup
        .start(request(tools.path().join("absent.mkv"), tools.path().join("out.mp4")))
        .unwrap_err();
    assert!(err.to_string().contains("absent.mkv"), "{}", err);
    assert!(!marker.exists());
    assert!(!sup.is_busy());
}
