// Conversion engine - independent of the CLI

pub mod core;
pub mod error;
pub mod hardware;
pub mod preview;
pub mod probe;
pub mod process;
pub mod supervisor;
pub mod validate;
pub mod worker;

pub use core::*;
pub use error::{ExtractionError, ProbeError, SpawnError, StartError, ValidationError};
pub use hardware::{
    GpuReport, ToolPaths, downgrade_unavailable_gpu, gpu_report, probe_gpu_availability,
};
pub use preview::{FramePreviewPipeline, PreviewPair, frame_position, gamma_adjust};
pub use probe::{FfprobeProbe, MediaProbe};
pub use process::{ProcessLauncher, SystemLauncher};
pub use supervisor::{
    ConversionJob, ConversionObserver, ProcessSupervisor, SupervisorState, TerminalState,
};
pub use validate::{check_overwrite, default_output_path, validate_request};
pub use worker::{Waker, WorkerMessage};
