/// Case-insensitive substrings that mark a CUDA/NVENC failure in ffmpeg's log
pub const HARDWARE_FAILURE_SIGNATURES: &[&str] = &["cuda", "nvcuda.dll"];

/// Parse an ffmpeg `HH:MM:SS.ff` timestamp into seconds
pub fn parse_time(time_str: &str) -> Option<f64> {
    let mut parts = time_str.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// The first well-formed `HH:MM:SS.ff` value following a `time=` in a status line
fn find_time_field(line: &str) -> Option<&str> {
    line.match_indices("time=")
        .filter_map(|(idx, key)| time_value(&line[idx + key.len()..]))
        .next()
}

fn time_value(rest: &str) -> Option<&str> {
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == ':' || c == '.'))
        .unwrap_or(rest.len());
    let value = &rest[..end];

    // Require the full d+:d+:d+.d+ shape; "time=N/A" and friends are skipped
    let mut fields = value.split(':');
    let ok = fields.next().is_some_and(is_digits)
        && fields.next().is_some_and(is_digits)
        && fields.next().is_some_and(|s| {
            s.split_once('.')
                .is_some_and(|(int, frac)| is_digits(int) && is_digits(frac))
        })
        && fields.next().is_none();
    ok.then_some(value)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// True when the line carries one of the hardware-failure signatures.
/// Substring matching is a heuristic: informational lines that merely
/// mention CUDA count too.
pub fn is_hardware_failure_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    HARDWARE_FAILURE_SIGNATURES
        .iter()
        .any(|sig| lower.contains(sig))
}

/// Parser for ffmpeg's diagnostic (stderr) output
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_s: f64,
    pub elapsed_s: Option<f64>,
    hardware_failure_seen: bool,
}

impl ProgressParser {
    pub fn new(duration_s: f64) -> Self {
        Self {
            duration_s,
            elapsed_s: None,
            hardware_failure_seen: false,
        }
    }

    /// Parse a single diagnostic line. Returns the progress percentage,
    /// clamped to `[0, 100]`, when the line carries a `time=` field and the
    /// duration is known.
    pub fn parse_line(&mut self, line: &str) -> Option<f64> {
        if is_hardware_failure_line(line) {
            self.hardware_failure_seen = true;
        }

        let elapsed = find_time_field(line).and_then(parse_time)?;
        self.elapsed_s = Some(elapsed);
        self.progress_pct(elapsed)
    }

    fn progress_pct(&self, elapsed_s: f64) -> Option<f64> {
        if self.duration_s > 0.0 && self.duration_s.is_finite() {
            Some((elapsed_s / self.duration_s * 100.0).clamp(0.0, 100.0))
        } else {
            None
        }
    }

    pub fn hardware_failure_seen(&self) -> bool {
        self.hardware_failure_seen
    }
}
