//! Tonemapping filter chains shared by full conversions and frame previews.

use super::types::{FilterKind, TonemapOperator};

/// MaxFALL assumed when the source carries no mastering-display metadata
pub const DEFAULT_MAX_FALL: f64 = 100.0;

/// Output dimensions of the chain's final `scale` step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Probed target dimensions (real conversion)
    Target { width: u32, height: u32 },
    /// Keep source-native dimensions (`iw:ih`, preview)
    Native,
}

impl Scale {
    fn render(&self) -> String {
        match self {
            Scale::Target { width, height } => format!("{}:{}", width, height),
            Scale::Native => "iw:ih".to_string(),
        }
    }
}

/// Fully resolved inputs of a filter chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterChain {
    pub kind: FilterKind,
    pub tonemap: TonemapOperator,
    pub gamma: f64,
    pub scale: Scale,
    /// Only read by the Dynamic variant; `None` renders [`DEFAULT_MAX_FALL`]
    pub max_fall: Option<f64>,
}

impl FilterChain {
    pub fn new(kind: FilterKind, tonemap: TonemapOperator, gamma: f64, scale: Scale) -> Self {
        Self {
            kind,
            tonemap,
            gamma,
            scale,
            max_fall: None,
        }
    }

    pub fn with_max_fall(mut self, max_fall: Option<f64>) -> Self {
        self.max_fall = max_fall;
        self
    }

    /// `npl` argument: measured values keep one decimal (`350.0`), the
    /// fallback is written as the bare integer `100`
    fn peak_luminance(&self) -> String {
        match self.max_fall {
            Some(value) => format_number(value),
            None => format!("{}", DEFAULT_MAX_FALL),
        }
    }

    /// Render the ffmpeg filter descriptor
    pub fn render(&self) -> String {
        let tonemap = self.tonemap.ffmpeg_name();
        let gamma = format_number(self.gamma);
        let scale = self.scale.render();

        match self.kind {
            FilterKind::Static => format!(
                "zscale=primaries=bt709:transfer=bt709:matrix=bt709,tonemap={},eq=gamma={},scale={}",
                tonemap, gamma, scale
            ),
            FilterKind::Dynamic => format!(
                "zscale=t=linear:npl={},tonemap={},zscale=t=bt709:m=bt709:r=tv:p=bt709,eq=gamma={},scale={}",
                self.peak_luminance(),
                tonemap,
                gamma,
                scale
            ),
        }
    }
}

/// Format a float for ffmpeg arguments, keeping one decimal for whole numbers
/// (`1.0`, `23.976023976023978`)
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
