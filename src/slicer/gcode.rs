//! Best-effort extraction of print estimates from G-code comment metadata.
//!
//! Slicers write their estimates as `;`-prefixed comments near the top of the
//! file, with wording that differs between vendors and versions. Nothing in
//! here returns an error: missing or unreadable metadata degrades to
//! conservative non-zero defaults.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

/// Metadata lives in the header; never read further than this.
pub const METADATA_SCAN_LINES: usize = 100;
/// Used when no duration could be read.
pub const DEFAULT_PRINT_MINUTES: u32 = 60;
/// Used when no filament mass could be read.
pub const DEFAULT_FILAMENT_GRAMS: f64 = 20.0;

const TIME_MARKERS: [&str; 3] = [
    "; estimated printing time",
    "; print time",
    "; total estimated time",
];
const FILAMENT_MARKERS: [&str; 2] = ["; filament used", "; material volume"];

static NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(estimated|printing|time|:)").unwrap());
static DAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)d").unwrap());
static HOUR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)h").unwrap());
static MINUTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)m").unwrap());
static BARE_INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());
static WEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*g").unwrap());
static BRACKET_WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[g\]\s*[=:]\s*(\d+\.?\d*)").unwrap());

/// Print duration and filament mass read from a G-code header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcodeMetadata {
    pub print_time_minutes: u32,
    pub filament_weight_grams: f64,
}

impl GcodeMetadata {
    pub fn fallback() -> Self {
        Self {
            print_time_minutes: DEFAULT_PRINT_MINUTES,
            filament_weight_grams: DEFAULT_FILAMENT_GRAMS,
        }
    }
}

/// Convert a duration string such as `"2h 30m"`, `"1d 2h 3m 4s"` or `"90"` to minutes.
///
/// Never returns less than one minute: unparseable or zero input yields
/// [`DEFAULT_PRINT_MINUTES`].
pub fn parse_time_string(time_str: &str) -> u32 {
    let cleaned = NOISE_RE.replace_all(time_str, "").trim().to_lowercase();

    let capture = |re: &Regex| -> Option<u32> {
        re.captures(&cleaned)
            .and_then(|cap| cap[1].parse::<u32>().ok())
    };

    let days = capture(&DAY_RE);
    let hours = capture(&HOUR_RE);
    let minutes = capture(&MINUTE_RE);

    let total = if days.is_none() && hours.is_none() && minutes.is_none() {
        // Bare number, e.g. "90"
        capture(&BARE_INT_RE).unwrap_or(0)
    } else {
        days.unwrap_or(0)
            .saturating_mul(24 * 60)
            .saturating_add(hours.unwrap_or(0).saturating_mul(60))
            .saturating_add(minutes.unwrap_or(0))
    };

    if total == 0 {
        DEFAULT_PRINT_MINUTES
    } else {
        total
    }
}

/// Extract a gram value from a filament usage comment.
///
/// Accepts `"filament used: 12.5g"` style as well as the bracketed
/// `"filament used [g] = 12.5"` style.
pub fn parse_filament_weight(line: &str) -> Option<f64> {
    if let Some(cap) = BRACKET_WEIGHT_RE.captures(line) {
        return cap[1].parse::<f64>().ok();
    }
    if !line.to_lowercase().contains('g') {
        return None;
    }
    WEIGHT_RE
        .captures(line)
        .and_then(|cap| cap[1].parse::<f64>().ok())
}

/// Scan the header of a G-code file. Unreadable files yield [`GcodeMetadata::fallback`].
pub fn parse_gcode_metadata(path: &Path) -> GcodeMetadata {
    match File::open(path) {
        Ok(file) => parse_gcode_reader(BufReader::new(file)),
        Err(e) => {
            warn!("Could not open G-code {:?}: {}, using fallback estimate", path, e);
            GcodeMetadata::fallback()
        }
    }
}

/// Scan up to [`METADATA_SCAN_LINES`] lines of G-code text.
pub fn parse_gcode_reader<R: BufRead>(reader: R) -> GcodeMetadata {
    let mut print_time: Option<u32> = None;
    let mut grams: Option<f64> = None;

    for line in reader.lines().take(METADATA_SCAN_LINES) {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Could not read G-code metadata: {}, using fallback estimate", e);
                return GcodeMetadata::fallback();
            }
        };
        let lower = line.to_lowercase();

        if TIME_MARKERS.iter().any(|m| lower.contains(m)) {
            let time_part = line.rsplit(':').next().unwrap_or(&line);
            print_time = Some(parse_time_string(time_part.trim()));
        } else if FILAMENT_MARKERS.iter().any(|m| lower.contains(m)) {
            if let Some(weight) = parse_filament_weight(&line) {
                grams = Some(weight);
            }
        }
    }

    let metadata = GcodeMetadata {
        print_time_minutes: print_time.unwrap_or(DEFAULT_PRINT_MINUTES),
        filament_weight_grams: grams
            .filter(|g| g.is_finite() && *g > 0.0)
            .unwrap_or(DEFAULT_FILAMENT_GRAMS),
    };
    debug!(
        "Parsed G-code metadata: {}min, {:.1}g",
        metadata.print_time_minutes, metadata.filament_weight_grams
    );
    metadata
}
