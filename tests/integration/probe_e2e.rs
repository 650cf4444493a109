// ffprobe invocation and parsing through stand-in scripts
#![cfg(unix)]

use hdr2sdr::engine::{FfprobeProbe, MediaProbe, ProbeError};

use crate::common::ffmpeg_runner::*;
use crate::common::helpers::touch_input;

#[test]
fn test_probe_reads_streams_and_format() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let props = FfprobeProbe::new(tools.ffprobe()).probe(&input).expect("probe");

    assert_eq!((props.width, props.height), (1920, 1080));
    assert_eq!(props.codec_name, "hevc");
    assert_eq!(props.frame_rate, 24.0);
    assert_eq!(props.duration, 20.0);
    assert_eq!(props.bit_rate, 8_000_000);
    assert_eq!(props.audio_codec, "aac");
    assert_eq!(props.subtitle_streams.len(), 1);
    assert_eq!(props.subtitle_streams[0].language.as_deref(), Some("eng"));
    assert_eq!(props.max_frame_average_light, None);
}

#[test]
fn test_max_fall_probe() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let probe = FfprobeProbe::new(tools.ffprobe());
    assert_eq!(probe.probe_max_frame_average_light(&input), 350.0);
}

#[test]
fn test_max_fall_defaults_when_probe_fails() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let failing = tools.ffmpeg("ffprobe-broken", "exit 1\n");
    let probe = FfprobeProbe::new(failing);
    assert_eq!(probe.probe_max_frame_average_light(&input), 100.0);
}

#[test]
fn test_probe_failure_reports_exit_status() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let failing = tools.ffmpeg("ffprobe-broken", "echo 'Invalid data found' >&2\nexit 1\n");

    match FfprobeProbe::new(failing).probe(&input) {
        Err(ProbeError::ExitStatus { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert_eq!(stderr, "Invalid data found");
        }
        other => panic!("expected ExitStatus, got {:?}", other),
    }
}

#[test]
fn test_missing_ffprobe_is_a_spawn_error() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let probe = FfprobeProbe::new(tools.path().join("does-not-exist"));
    assert!(matches!(probe.probe(&input), Err(ProbeError::Spawn(_))));
}
