//! Chrony status source
//!
//! Runs `chronyc -ncm tracking sources` and parses its CSV output:
//!
//! - **Line 0**: the tracking record (14 columns)
//! - **Following lines**: one source record each, keyed by source name
//!
//! chronyc prints the mode and state indicators of a source as two separate
//! columns (`^,*,GPS,...`); the fused form (`^*,GPS,...`) is accepted too.
//! Lines with fewer than eight logical columns are skipped.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::status::{ChronyStatus, SourceMode, SourceRecord, SourceState};

/// Default chronyc binary
pub const DEFAULT_CHRONYC: &str = "chronyc";

/// Numeric, CSV, multi-command invocation
const CHRONYC_ARGS: [&str; 3] = ["-ncm", "tracking", "sources"];

/// Minimum logical columns of a source line (mode, state and six fields)
const MIN_SOURCE_COLUMNS: usize = 8;

/// Polls the local chrony daemon
#[derive(Clone, Debug)]
pub struct ChronySource {
    program: String,
    args: Vec<String>,
}

impl ChronySource {
    /// Query chrony through `program` with the standard arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: CHRONYC_ARGS.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// Query chrony through an arbitrary command line
    pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the query once and parse its output
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChronyCommandError`] if the command cannot be run or
    /// exits unsuccessfully, and [`Error::ChronyParseError`] if the output is
    /// malformed.
    #[instrument(skip(self), fields(program = %self.program))]
    pub async fn poll(&self) -> Result<ChronyStatus> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                Error::ChronyCommandError(format!("failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(Error::ChronyCommandError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| Error::ChronyCommandError(format!("output is not UTF-8: {}", e)))?;

        debug!("Received update from Chrony: {:?}", stdout);

        parse_chrony_output(&stdout)
    }
}

impl Default for ChronySource {
    fn default() -> Self {
        Self::new(DEFAULT_CHRONYC)
    }
}

/// Parse the combined tracking and sources CSV output
pub fn parse_chrony_output(output: &str) -> Result<ChronyStatus> {
    let mut lines = output.lines();

    let tracking = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| Error::chrony_parse(0, "missing tracking record"))?;

    let mut status = parse_tracking(tracking)?;

    for (index, line) in lines.enumerate() {
        if let Some((name, record)) = parse_source(index + 1, line)? {
            status.sources.insert(name, record);
        }
    }

    Ok(status)
}

/// Parse the tracking record into a status without sources
pub fn parse_tracking(line: &str) -> Result<ChronyStatus> {
    let cols: Vec<&str> = line.split(',').map(str::trim).collect();

    let [ref_id, ref_name, stratum, ref_time, current_correction, last_offset, rms_offset, freq_ppm, resid_freq_ppm, skew_ppm, root_delay, root_dispersion, last_update_interval, leap_status, ..] =
        cols.as_slice()
    else {
        return Err(Error::chrony_parse(
            0,
            format!("expected 14 tracking columns, got {}", cols.len()),
        ));
    };

    let ref_id = u32::from_str_radix(ref_id, 16)
        .map_err(|e| Error::chrony_parse(0, format!("invalid ref_id {:?}: {}", ref_id, e)))?;

    let ref_time = timestamp(number(0, "ref_time", ref_time)?)
        .ok_or_else(|| Error::chrony_parse(0, format!("ref_time {:?} out of range", ref_time)))?;

    Ok(ChronyStatus {
        ref_id,
        ref_name: ref_name.to_string(),
        stratum: number(0, "stratum", stratum)?,
        ref_time,
        current_correction: number(0, "current_correction", current_correction)?,
        last_offset: number(0, "last_offset", last_offset)?,
        rms_offset: number(0, "rms_offset", rms_offset)?,
        freq_ppm: number(0, "freq_ppm", freq_ppm)?,
        resid_freq_ppm: number(0, "resid_freq_ppm", resid_freq_ppm)?,
        skew_ppm: number(0, "skew_ppm", skew_ppm)?,
        root_delay: number(0, "root_delay", root_delay)?,
        root_dispersion: number(0, "root_dispersion", root_dispersion)?,
        last_update_interval: number(0, "last_update_interval", last_update_interval)?,
        leap_status: leap_status.to_lowercase(),
        sources: BTreeMap::new(),
    })
}

/// Parse one source line
///
/// Returns `Ok(None)` for lines too short to be a source record.
pub fn parse_source(line_no: usize, line: &str) -> Result<Option<(String, SourceRecord)>> {
    let cols: Vec<&str> = line.split(',').map(str::trim).collect();

    let (mode, state, rest): (Option<char>, Option<char>, &[&str]) = match cols.split_first() {
        Some((first, rest)) if first.chars().count() == 2 => {
            let mut symbols = first.chars();
            (symbols.next(), symbols.next(), rest)
        }
        Some((first, rest)) => match rest.split_first() {
            Some((second, rest)) => (first.chars().next(), second.chars().next(), rest),
            None => return Ok(None),
        },
        None => return Ok(None),
    };

    if rest.len() + 2 < MIN_SOURCE_COLUMNS {
        return Ok(None);
    }

    let [name, stratum, poll, reach, last_rx, last_sample, ..] = rest else {
        return Ok(None);
    };

    let reach = u16::from_str_radix(reach, 8)
        .map_err(|e| Error::chrony_parse(line_no, format!("invalid reach {:?}: {}", reach, e)))?;

    let last_rx = match *last_rx {
        "-" | "" => None,
        value => Some(number(line_no, "last_rx", value)?),
    };

    let record = SourceRecord {
        mode: mode.map(SourceMode::from_symbol).unwrap_or(SourceMode::Unknown),
        state: state
            .map(SourceState::from_symbol)
            .unwrap_or(SourceState::Unknown),
        stratum: number(line_no, "stratum", stratum)?,
        poll: number(line_no, "poll", poll)?,
        reach,
        last_rx,
        last_sample: number(line_no, "last_sample", last_sample)?,
    };

    Ok(Some((name.to_string(), record)))
}

fn number<T>(line_no: usize, field: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| Error::chrony_parse(line_no, format!("invalid {} {:?}: {}", field, value, e)))
}

/// Convert fractional seconds since the Unix epoch
///
/// An f64 holds current epoch seconds to roughly 0.2µs, so the fraction is
/// rounded to whole microseconds.
fn timestamp(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 || secs > i64::MAX as f64 {
        return None;
    }
    let whole = secs.trunc();
    let micros = ((secs - whole) * 1e6).round().min(999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, micros * 1_000).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{derive, LeapStatus, Synced};

    const TRACKING: &str = "C001,PPS0,1,1612345678.123,1e-9,2e-7,3e-7,0.01,0.02,0.03,1e-4,2e-4,64,N";

    const FULL_OUTPUT: &str = "\
50505330,PPS0,1,1612345678.500000000,0.000000012,-0.000000034,0.000000101,-12.345,-0.001,0.012,0.000000001,0.000011000,16.1,Normal
#,*,PPS0,0,4,377,10,-0.000000021,-0.000000034,0.000000105
#,-,GPS,0,4,377,12,0.012345,0.012340,0.000200
^,+,ptbtime1.ptb.de,1,6,377,33,0.000123,0.000120,0.004000
^,?,ntp1.oma.be,0,6,0,-,0.0,0.0,0.0
";

    #[test]
    fn test_parse_tracking_line() {
        let status = parse_tracking(TRACKING).unwrap();

        assert_eq!(status.ref_id, 0xC001);
        assert_eq!(status.ref_name, "PPS0");
        assert_eq!(status.stratum, 1);
        assert_eq!(status.leap_status, "n");
        assert_eq!(status.leap(), LeapStatus::Normal);
        assert_eq!(status.ref_time.timestamp(), 1_612_345_678);
        assert_eq!(status.ref_time.timestamp_subsec_millis(), 123);
        assert_eq!(status.current_correction, 1e-9);
        assert_eq!(status.root_dispersion, 2e-4);
        assert_eq!(status.last_update_interval, 64.0);
        assert!(status.sources.is_empty());
    }

    #[test]
    fn test_parse_fused_source_line() {
        let (name, record) = parse_source(1, "^*,GPS,1,6,377,10,0.000012").unwrap().unwrap();

        assert_eq!(name, "GPS");
        assert_eq!(record.mode, SourceMode::Server);
        assert_eq!(record.state, SourceState::Synced);
        assert_eq!(record.stratum, 1);
        assert_eq!(record.poll, 6);
        assert_eq!(record.reach, 255);
        assert_eq!(record.last_rx, Some(10));
        assert_eq!(record.last_sample, 0.000012);
    }

    #[test]
    fn test_parse_full_output() {
        let status = parse_chrony_output(FULL_OUTPUT).unwrap();

        assert_eq!(status.ref_id, 0x5050_5330);
        assert_eq!(status.leap_status, "normal");
        assert_eq!(status.sources.len(), 4);

        let pps = &status.sources["PPS0"];
        assert_eq!(pps.mode, SourceMode::RefClock);
        assert_eq!(pps.state, SourceState::Synced);

        assert_eq!(status.sources["GPS"].state, SourceState::Excluded);
        assert_eq!(status.sources["ptbtime1.ptb.de"].mode, SourceMode::Server);
        assert_eq!(status.sources["ptbtime1.ptb.de"].state, SourceState::Combined);

        let lost = &status.sources["ntp1.oma.be"];
        assert_eq!(lost.state, SourceState::Lost);
        assert_eq!(lost.reach, 0);
        assert_eq!(lost.last_rx, None);

        assert_eq!(status.sync_source(), Some("PPS0"));
        assert_eq!(derive(Some(&status)), Synced::True);
    }

    #[test]
    fn test_symbol_mapping() {
        let cases = [
            ("=x", SourceMode::Peer, SourceState::False),
            ("#~", SourceMode::RefClock, SourceState::TooVariable),
            ("^-", SourceMode::Server, SourceState::Excluded),
            ("!!", SourceMode::Unknown, SourceState::Unknown),
        ];

        for (symbols, mode, state) in cases {
            let line = format!("{},src,2,6,17,3,0.1", symbols);
            let (_, record) = parse_source(1, &line).unwrap().unwrap();
            assert_eq!(record.mode, mode, "mode for {}", symbols);
            assert_eq!(record.state, state, "state for {}", symbols);
        }
    }

    #[test]
    fn test_short_lines_are_skipped() {
        assert_eq!(parse_source(1, "").unwrap(), None);
        assert_eq!(parse_source(1, "^,*,GPS,1,6").unwrap(), None);
        assert_eq!(parse_source(1, "^*,GPS,1,6,377,10").unwrap(), None);

        let output = format!("{}\n\n^,*,GPS\n", TRACKING);
        let status = parse_chrony_output(&output).unwrap();
        assert!(status.sources.is_empty());
        assert_eq!(derive(Some(&status)), Synced::False);
    }

    #[test]
    fn test_malformed_output_is_an_error() {
        assert!(matches!(
            parse_chrony_output(""),
            Err(Error::ChronyParseError { line: 0, .. })
        ));
        assert!(matches!(
            parse_chrony_output("506F6F6C,pool,2"),
            Err(Error::ChronyParseError { line: 0, .. })
        ));
        assert!(parse_tracking(&TRACKING.replace("C001", "XYZ")).is_err());
        assert!(parse_tracking(&TRACKING.replace(",1,", ",one,")).is_err());

        let output = format!("{}\n^,*,GPS,one,6,377,10,0.1\n", TRACKING);
        assert!(matches!(
            parse_chrony_output(&output),
            Err(Error::ChronyParseError { line: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_poll_runs_command() {
        let script = format!("printf '%s\\n%s\\n' '{}' '^*,GPS,1,6,377,10,0.000012'", TRACKING);
        let source = ChronySource::with_args("sh", vec!["-c".to_string(), script]);

        let status = source.poll().await.unwrap();
        assert_eq!(status.ref_name, "PPS0");
        assert_eq!(status.sources["GPS"].state, SourceState::Synced);
    }

    #[tokio::test]
    async fn test_poll_command_failures() {
        let missing = ChronySource::new("/nonexistent/chronyc");
        assert!(matches!(
            missing.poll().await,
            Err(Error::ChronyCommandError(_))
        ));

        let failing = ChronySource::with_args(
            "sh",
            vec!["-c".to_string(), "echo '506 Cannot talk to daemon' >&2; exit 1".to_string()],
        );
        match failing.poll().await {
            Err(Error::ChronyCommandError(msg)) => {
                assert!(msg.contains("Cannot talk to daemon"), "{}", msg)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
