//! Pure parsers for probe command output. No I/O happens here.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ProbeError;

/// Parses a percentage such as `87%` into `87.0`. A value without the `%`
/// suffix is rejected.
pub fn parse_percent(metric: &'static str, raw: &str) -> Result<f64, ProbeError> {
    let trimmed = raw.trim();
    let number = trimmed
        .strip_suffix('%')
        .ok_or_else(|| ProbeError::parse(metric, format!("expected a percentage, got {:?}", trimmed)))?;
    number
        .trim()
        .parse::<f64>()
        .map_err(|e| ProbeError::parse(metric, format!("{:?}: {}", trimmed, e)))
}

/// Memory usage from `free` output: used / total of the `Mem:` row.
///
/// ```text
///               total        used        free      shared  buff/cache   available
/// Mem:        8048064     2391828      301540      152388     5354696     5206728
/// ```
pub fn parse_free(raw: &str) -> Result<f64, ProbeError> {
    let row = raw
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Mem:"))
        .ok_or_else(|| ProbeError::parse("memory", "no Mem: row"))?;

    let fields: Vec<&str> = row.split_whitespace().collect();
    let total = parse_number::<f64>("memory", fields.get(1).copied())?;
    let used = parse_number::<f64>("memory", fields.get(2).copied())?;
    if total <= 0.0 {
        return Err(ProbeError::parse("memory", "total memory is zero"));
    }
    Ok(used / total * 100.0)
}

/// CPU usage from one `top` snapshot: 100 minus the idle share.
///
/// Accepts procps (`%Cpu(s):  1.6 us, ... 97.9 id, ...`) and BusyBox
/// (`CPU:   2% usr   1% sys ... 96% idle ...`) summaries.
pub fn parse_top_idle(raw: &str) -> Result<f64, ProbeError> {
    static IDLE: OnceLock<Regex> = OnceLock::new();
    let idle_re = IDLE.get_or_init(|| {
        Regex::new(r"(\d+(?:[.,]\d+)?)\s*%?\s*id(?:le)?\b").expect("idle pattern is valid")
    });

    let summary = raw
        .lines()
        .find(|line| {
            let line = line.trim_start();
            line.starts_with("%Cpu") || line.starts_with("Cpu(s)") || line.starts_with("CPU:")
        })
        .ok_or_else(|| ProbeError::parse("cpu", "no CPU summary line"))?;

    let idle = idle_re
        .captures(summary)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ProbeError::parse("cpu", format!("no idle value in {:?}", summary.trim())))?
        .as_str()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|e| ProbeError::parse("cpu", e.to_string()))?;

    Ok(100.0 - idle)
}

/// Usage percentage for the filesystem row of `df -P` or `df -P -i`.
///
/// The fifth column is `Capacity` for blocks and `IUse%` for inodes.
pub fn parse_df_percent(metric: &'static str, raw: &str) -> Result<f64, ProbeError> {
    let row = raw
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .last()
        .ok_or_else(|| ProbeError::parse(metric, "no filesystem row"))?;

    let column = row
        .split_whitespace()
        .nth(4)
        .ok_or_else(|| ProbeError::parse(metric, format!("short row {:?}", row.trim())))?;

    parse_percent(metric, column)
}

/// Descriptor usage from `/proc/sys/fs/file-nr`: allocated / max, or 0.0 when
/// the kernel reports no maximum.
pub fn parse_file_nr(raw: &str) -> Result<f64, ProbeError> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(ProbeError::parse("fd", format!("expected 3 fields, got {:?}", raw.trim())));
    }
    let allocated = parse_number::<f64>("fd", Some(fields[0]))?;
    let max = parse_number::<f64>("fd", Some(fields[2]))?;
    Ok(ratio_percent(allocated, max))
}

/// Unit names from `systemctl ... --no-legend --plain` listings.
pub fn parse_unit_names(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let first = tokens.next()?;
            // Older systemd prints a status bullet even with --plain.
            if first == "●" || first == "*" {
                tokens.next()
            } else {
                Some(first)
            }
        })
        .map(str::to_string)
        .collect()
}

/// Log lines from a `journalctl` tail, without trailing blanks or the
/// placeholder journalctl prints for an empty result.
pub fn parse_log_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && *line != "-- No entries --")
        .map(str::to_string)
        .collect()
}

/// Process rows from `ps` output: header skipped, rows trimmed, first `limit`.
pub fn parse_process_rows(raw: &str, limit: usize) -> Vec<String> {
    raw.lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// `part / whole * 100`, or 0.0 when `whole` is zero.
pub fn ratio_percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        100.0 * part / whole
    }
}

fn parse_number<T: std::str::FromStr>(metric: &'static str, field: Option<&str>) -> Result<T, ProbeError>
where
    T::Err: std::fmt::Display,
{
    let field = field.ok_or_else(|| ProbeError::parse(metric, "missing column"))?;
    field
        .parse::<T>()
        .map_err(|e| ProbeError::parse(metric, format!("{:?}: {}", field, e)))
}
