//! Progress extraction from yt-dlp output
//!
//! yt-dlp prints lines such as
//! `[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10`.
//! Only the percentage is required; size, speed and ETA are picked up when present.

use lazy_regex::regex_captures;

/// Progress snapshot parsed from one yt-dlp line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// 0.0 - 100.0
    pub percent: f64,
    pub total_bytes: Option<u64>,
    pub speed_bytes_per_sec: Option<u64>,
    pub eta_seconds: Option<u64>,
}

/// Parses progress from a single yt-dlp output line.
///
/// Lines that are not progress lines (`[download] Destination: ...`, warnings, merger
/// output) yield `None`.
pub fn parse_progress(line: &str) -> Option<ProgressInfo> {
    let (_, percent) = regex_captures!(r"\[download\]\s+(\d+(?:\.\d+)?)%", line)?;
    // Clamp so garbage never shows more than 100%
    let percent = percent.parse::<f64>().ok()?.clamp(0.0, 100.0);

    let mut total_bytes = None;
    let mut speed_bytes_per_sec = None;
    let mut eta_seconds = None;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        let Some(next) = parts.get(i + 1) else {
            break;
        };
        match *part {
            // "of 10.00MiB" or "of ~10.00MiB" (estimated)
            "of" => total_bytes = parse_size(next.trim_start_matches('~')),
            "at" => speed_bytes_per_sec = parse_size(next.trim_end_matches("/s")),
            "ETA" => eta_seconds = parse_eta(next),
            _ => {}
        }
    }

    log::trace!("Parsed progress {}% from: {}", percent, line);

    Some(ProgressInfo {
        percent,
        total_bytes,
        speed_bytes_per_sec,
        eta_seconds,
    })
}

/// Parses sizes like "10.00MiB", "500.00KiB", "1.2GiB" or "512B"
fn parse_size(size_str: &str) -> Option<u64> {
    let units: [(&str, f64); 4] = [
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("B", 1.0),
    ];
    for (suffix, multiplier) in units {
        if let Some(number) = size_str.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| (n * multiplier) as u64);
        }
    }
    None
}

/// Parses ETA like "00:10", "1:23" or "01:02:03"
fn parse_eta(eta_str: &str) -> Option<u64> {
    eta_str
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .try_fold((0u64, 0usize), |(acc, n), part| Some((acc * 60 + part?, n + 1)))
        .filter(|(_, n)| (2..=3).contains(n))
        .map(|(secs, _)| secs)
}

/// Incremental parser that survives lines split across read boundaries.
///
/// Both `\n` and `\r` terminate a line, since yt-dlp redraws progress with carriage
/// returns when `--newline` is not honoured.
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: String,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of output and returns the progress found in every line it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<ProgressInfo> {
        self.pending.push_str(chunk);

        let Some(last_terminator) = self.pending.rfind(['\n', '\r']) else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_terminator + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(['\n', '\r'])
            .filter(|line| !line.is_empty())
            .inspect(|line| log::debug!("yt-dlp: {}", line))
            .filter_map(parse_progress)
            .collect()
    }

    /// Flushes a trailing line that never got a terminator.
    pub fn finish(&mut self) -> Option<ProgressInfo> {
        let line = std::mem::take(&mut self.pending);
        parse_progress(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_progress_line() {
        let info = parse_progress("[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10").unwrap();
        assert!((info.percent - 45.2).abs() < f64::EPSILON);
        assert_eq!(info.total_bytes, Some(10 * 1024 * 1024));
        assert_eq!(info.speed_bytes_per_sec, Some(500 * 1024));
        assert_eq!(info.eta_seconds, Some(10));
    }

    #[test]
    fn test_parse_percent_only() {
        let info = parse_progress("[download] 100%").unwrap();
        assert_eq!(info.percent, 100.0);
        assert_eq!(info.total_bytes, None);
        assert_eq!(info.eta_seconds, None);
    }

    #[test]
    fn test_parse_estimated_size_and_unknown_eta() {
        let info = parse_progress("[download]   3.0% of ~ 1.20GiB at  2.00MiB/s ETA Unknown").unwrap();
        assert_eq!(info.percent, 3.0);
        // "~ 1.20GiB" has a space after the tilde, so the size is not picked up
        assert_eq!(info.total_bytes, None);
        assert_eq!(info.speed_bytes_per_sec, Some(2 * 1024 * 1024));
        assert_eq!(info.eta_seconds, None);
    }

    #[test]
    fn test_non_progress_lines() {
        assert!(parse_progress("[download] Destination: /tmp/abc.mp4").is_none());
        assert!(parse_progress("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress("WARNING: 50% of nothing").is_none());
        assert!(parse_progress("").is_none());
    }

    #[test]
    fn test_parse_eta_formats() {
        assert_eq!(parse_eta("00:10"), Some(10));
        assert_eq!(parse_eta("1:23"), Some(83));
        assert_eq!(parse_eta("01:02:03"), Some(3723));
        assert_eq!(parse_eta("10"), None);
        assert_eq!(parse_eta("Unknown"), None);
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("1.5KiB"), Some(1536));
        assert_eq!(parse_size("512B"), Some(512));
        assert_eq!(parse_size("N/A"), None);
    }

    #[test]
    fn test_parser_joins_split_lines() {
        let mut parser = ProgressParser::new();
        assert!(parser.push("[download]  4").is_empty());
        let found = parser.push("2.5% of 1.00MiB\n[download]  50.0%");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].percent, 42.5);

        let found = parser.push("\r");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].percent, 50.0);
    }

    #[test]
    fn test_parser_multiple_lines_in_one_chunk() {
        let mut parser = ProgressParser::new();
        let found = parser.push("[download]  10.0%\n[info] something\n[download]  20.0%\r\n");
        let percents: Vec<f64> = found.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![10.0, 20.0]);
    }

    #[test]
    fn test_parser_finish_flushes_tail() {
        let mut parser = ProgressParser::new();
        assert!(parser.push("[download]  99.9%").is_empty());
        assert_eq!(parser.finish().map(|p| p.percent), Some(99.9));
        assert!(parser.finish().is_none());
    }
}
