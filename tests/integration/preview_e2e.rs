// Single-frame preview extraction against stand-in tools
#![cfg(unix)]

use std::path::PathBuf;

use hdr2sdr::engine::{
    ExtractionError, FfprobeProbe, FilterKind, FramePreviewPipeline, TonemapOperator,
    gamma_adjust,
};
use image::{Rgb, RgbImage};

use crate::common::ffmpeg_runner::*;
use crate::common::helpers::touch_input;

fn sample_png(tools: &FakeTools) -> PathBuf {
    let path = tools.path().join("frame.png");
    let mut img = RgbImage::new(4, 2);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = Rgb([(x * 60) as u8, (y * 120) as u8, 64]);
    }
    img.save(&path).expect("write sample png");
    path
}

fn pipeline(tools: &FakeTools) -> (FramePreviewPipeline<FfprobeProbe>, PathBuf) {
    let png = sample_png(tools);
    let ffmpeg = tools.ffmpeg_emitting_png(&png);
    let probe = FfprobeProbe::new(tools.ffprobe());
    (FramePreviewPipeline::new(ffmpeg, probe), png)
}

#[test]
fn test_extract_frame_defaults_to_a_third_of_the_duration() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let (pipeline, png) = pipeline(&tools);

    let frame = pipeline.extract_frame(&input, None).expect("frame");
    let expected = image::open(&png).unwrap().to_rgb8();
    assert_eq!(frame, expected);

    let recorded = tools.recorded_preview_args();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].contains("-ss 6.666666666666667 -i"), "{}", recorded[0]);
    assert!(!recorded[0].contains("-vf"), "{}", recorded[0]);
    assert!(recorded[0].ends_with("-frames:v 1 -f image2pipe -c:v png -"));
}

#[test]
fn test_converted_frame_keeps_native_size_and_uses_max_fall() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let (pipeline, _) = pipeline(&tools);

    pipeline
        .extract_frame_with_conversion(
            &input,
            1.5,
            FilterKind::Dynamic,
            TonemapOperator::Hable,
            Some(4.0),
        )
        .expect("frame");

    let recorded = tools.recorded_preview_args();
    assert!(recorded[0].contains("-ss 4.0 -i"), "{}", recorded[0]);
    assert!(
        recorded[0].contains(
            "-vf zscale=t=linear:npl=350.0,tonemap=hable,zscale=t=bt709:m=bt709:r=tv:p=bt709,eq=gamma=1.5,scale=iw:ih"
        ),
        "{}",
        recorded[0]
    );
}

#[test]
fn test_preview_pair_extracts_both_frames_at_one_position() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let (pipeline, _) = pipeline(&tools);

    let pair = pipeline
        .preview_pair(&input, FilterKind::Static, TonemapOperator::Reinhard, Some(12.5))
        .expect("pair");
    assert_eq!(pair.timestamp, 12.5);
    assert_eq!(pair.original.dimensions(), (4, 2));

    let recorded = tools.recorded_preview_args();
    assert_eq!(recorded.len(), 2);
    assert!(!recorded[0].contains("-vf"));
    assert!(recorded[1].contains("eq=gamma=1.0,scale=iw:ih"), "{}", recorded[1]);
    assert!(recorded.iter().all(|r| r.contains("-ss 12.5 -i")));

    // Gamma slider is applied locally without another extraction
    let brighter = gamma_adjust(&pair.converted, 2.0);
    assert!(brighter.get_pixel(1, 0)[0] >= pair.converted.get_pixel(1, 0)[0]);
    assert_eq!(tools.recorded_preview_args().len(), 2);
}

#[test]
fn test_colorspace_failure_is_classified() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let ffmpeg = tools.ffmpeg("ffmpeg-colorspace", FFMPEG_COLORSPACE);
    let pipeline = FramePreviewPipeline::new(ffmpeg, FfprobeProbe::new(tools.ffprobe()));

    let err = pipeline.extract_frame(&input, Some(1.0)).unwrap_err();
    assert!(matches!(err, ExtractionError::ColorspaceMismatch), "{:?}", err);
}

#[test]
fn test_other_failures_keep_exit_status() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let ffmpeg = tools.ffmpeg("ffmpeg-fails", FFMPEG_FAILS);
    let pipeline = FramePreviewPipeline::new(ffmpeg, FfprobeProbe::new(tools.ffprobe()));

    match pipeline.extract_frame(&input, Some(1.0)) {
        Err(ExtractionError::ExitStatus { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("Permission denied"));
        }
        other => panic!("expected ExitStatus, got {:?}", other),
    }
}

#[test]
fn test_zero_duration_is_rejected_before_extraction() {
    let tools = FakeTools::new();
    let input = touch_input(tools.path(), "movie.mkv");
    let png = sample_png(&tools);
    let ffmpeg = tools.ffmpeg_emitting_png(&png);
    let pipeline = FramePreviewPipeline::new(ffmpeg, FfprobeProbe::new(tools.ffprobe_zero_duration()));

    let err = pipeline.extract_frame(&input, None).unwrap_err();
    assert!(matches!(err, ExtractionError::InvalidDuration(d) if d == 0.0), "{:?}", err);
    assert!(tools.recorded_preview_args().is_empty());
}
