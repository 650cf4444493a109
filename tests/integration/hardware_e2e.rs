// GPU availability checks against stand-in nvidia-smi/ffmpeg
#![cfg(unix)]

use hdr2sdr::engine::{ToolPaths, downgrade_unavailable_gpu, gpu_report, probe_gpu_availability};

use crate::common::ffmpeg_runner::*;
use crate::common::helpers::request;

fn tools(fake: &FakeTools, gpu_exit: i32, with_nvenc: bool) -> ToolPaths {
    ToolPaths {
        ffmpeg: fake.ffmpeg("ffmpeg-encoders", &encoders_listing(with_nvenc)),
        ffprobe: fake.ffprobe(),
        gpu_query: fake.gpu_query(gpu_exit),
    }
}

fn gpu_request() -> hdr2sdr::engine::ConversionRequest {
    let mut req = request("/in/movie.mkv", "/out/movie_sdr.mkv");
    req.use_gpu = true;
    req
}

#[test]
fn test_gpu_request_kept_when_gpu_is_available() {
    let fake = FakeTools::new();
    let tools = tools(&fake, 0, true);
    assert!(probe_gpu_availability(&tools));

    let mut req = gpu_request();
    assert!(downgrade_unavailable_gpu(&mut req, &tools));
    assert!(req.use_gpu);
}

#[test]
fn test_failing_gpu_tool_falls_back_to_cpu() {
    let fake = FakeTools::new();
    let tools = tools(&fake, 1, true);

    let mut req = gpu_request();
    assert!(!downgrade_unavailable_gpu(&mut req, &tools));
    assert!(!req.use_gpu);
    // Only the GPU flag changes
    assert_eq!(req, gpu_request().cpu_fallback());
}

#[test]
fn test_missing_encoder_falls_back_to_cpu() {
    let fake = FakeTools::new();
    let tools = tools(&fake, 0, false);

    let mut req = gpu_request();
    assert!(!downgrade_unavailable_gpu(&mut req, &tools));

    let report = gpu_report(&tools);
    assert!(report.gpu_tool_ok);
    assert!(!report.encoder_ok);
    assert_eq!(report.gpu_model.as_deref(), Some("NVIDIA GeForce RTX 4070"));
}
