//! Built-in parsers for common diagnostic tool output
//!
//! Every parser accepts the raw, untouched command output and looks for the
//! line it needs. Column positions, spacing and trailing punctuation vary
//! between procps-ng, legacy procps and busybox builds, so fields are located
//! by label wherever the tool prints one.

use super::MetricParser;
use crate::error::ParseError;

pub const CPU_IDLE: &str = "cpu-idle";
pub const MEM_USED: &str = "mem-used";
pub const SWAP_USED: &str = "swap-used";
pub const DISK_USED: &str = "disk-used";
pub const PERCENT: &str = "percent";

/// Read a number out of a column, ignoring punctuation and unit suffixes
/// (`95.8,` `37%` `8062340k` `0.0.`)
pub(crate) fn parse_number(field: &'static str, raw: &str) -> Result<f64, ParseError> {
    let cleaned = raw
        .trim()
        .trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '-' || c == '.'))
        .trim_end_matches(|c: char| !c.is_ascii_digit());

    cleaned.parse::<f64>().map_err(|_| ParseError::NotANumber {
        field,
        raw: raw.to_string(),
    })
}

/// Turn list commas into spaces; a comma between two digits is a decimal
/// separator (`95,8 id` under a comma locale) and becomes a dot
fn split_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c != ',' {
                return c;
            }
            let digit_before = i > 0 && chars[i - 1].is_ascii_digit();
            let digit_after = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if digit_before && digit_after {
                '.'
            } else {
                ' '
            }
        })
        .collect()
}

/// Clamp into 0..=100 and keep two decimals
pub(crate) fn as_percent(value: f64) -> f64 {
    (value.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

fn ratio_percent(field: &'static str, used: f64, total: f64) -> Result<f64, ParseError> {
    if total <= 0.0 {
        return Err(ParseError::ZeroTotal(field));
    }
    Ok(as_percent(used / total * 100.0))
}

/// CPU usage as `100 - idle` from the top summary line
///
/// ```text
/// %Cpu(s):  3.1 us,  1.0 sy,  0.0 ni, 95.8 id,  0.0 wa   (procps-ng)
/// Cpu(s):  3.1%us,  1.0%sy,  0.0%ni, 95.8%id,  0.0%wa    (legacy procps)
/// CPU:   2% usr   0% sys   0% nic  97% idle   0% io      (busybox)
/// ```
#[derive(Debug, Default)]
pub struct CpuIdleParser;

impl MetricParser for CpuIdleParser {
    fn parse(&self, raw: &str) -> Result<f64, ParseError> {
        let line = raw
            .lines()
            .find(|line| {
                let lower = line.trim_start().to_ascii_lowercase();
                lower.contains("cpu(s)") || lower.starts_with("cpu:")
            })
            .ok_or(ParseError::MissingLine("Cpu(s)"))?;

        let body = line.split_once(':').map(|(_, rest)| rest).unwrap_or(line);
        let normalized = split_commas(body).replace('%', " ");
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        let idle_at = tokens
            .iter()
            .position(|t| *t == "id" || *t == "idle")
            .ok_or(ParseError::MissingLine("idle"))?;
        if idle_at == 0 {
            return Err(ParseError::NotANumber {
                field: "idle",
                raw: line.to_string(),
            });
        }

        let idle = parse_number("idle", tokens[idle_at - 1])?;
        Ok(as_percent(100.0 - idle))
    }
}

/// `used / total` from a `Mem` or `Swap` row
///
/// Works on `free` (positional columns) as well as on top's summary rows,
/// where each value is followed by its label:
///
/// ```text
/// Mem:        16318412     5030872     8169012      512204     3118528    10442160
/// MiB Mem :  15936.2 total,   7977.4 free,   3912.4 used,   4046.4 buff/cache
/// Mem:   8062340k total,  7844600k used,   217740k free,   193908k buffers
/// Mem: 3035908K used, 4979588K free, 0K shrd, 98240K buff, 1427032K cached
/// ```
///
/// Rows without a `total` (busybox top) use `used + free` as the total.
#[derive(Debug)]
pub struct UsageRowParser {
    row: &'static str,
}

impl UsageRowParser {
    pub fn memory() -> Self {
        Self { row: "Mem" }
    }

    pub fn swap() -> Self {
        Self { row: "Swap" }
    }
}

impl MetricParser for UsageRowParser {
    fn parse(&self, raw: &str) -> Result<f64, ParseError> {
        let body = raw
            .lines()
            .find_map(|line| {
                let (label, rest) = line.split_once(':')?;
                label.trim().ends_with(self.row).then_some(rest)
            })
            .ok_or(ParseError::MissingLine(self.row))?;

        let normalized = split_commas(body);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        let labelled = tokens.iter().any(|t| {
            let label = t.trim_end_matches(|c: char| !c.is_ascii_alphabetic());
            label == "total" || label == "used"
        });

        let (total, used) = if labelled {
            let mut total = None;
            let mut used = None;
            let mut free = None;
            for pair in tokens.windows(2) {
                let label = pair[1].trim_end_matches(|c: char| !c.is_ascii_alphabetic());
                match label {
                    "total" => total = Some(parse_number("total", pair[0])?),
                    "used" => used = Some(parse_number("used", pair[0])?),
                    "free" => free = Some(parse_number("free", pair[0])?),
                    _ => {}
                }
            }
            let used = used.ok_or(ParseError::MissingLine("used"))?;
            let total = match (total, free) {
                (Some(total), _) => total,
                (None, Some(free)) => used + free,
                (None, None) => return Err(ParseError::MissingLine("total")),
            };
            (total, used)
        } else {
            let total = tokens.first().ok_or(ParseError::MissingLine("total"))?;
            let used = tokens.get(1).ok_or(ParseError::MissingLine("used"))?;
            (parse_number("total", total)?, parse_number("used", used)?)
        };

        ratio_percent(self.row, used, total)
    }
}

/// Filesystem usage from `df`
///
/// Uses the `total` row's `Use%` when `df --total` printed one, otherwise
/// sums size and used over every filesystem row. Device names too long for
/// their column (non `-P` output) wrap onto their own line and are rejoined.
#[derive(Debug, Default)]
pub struct DiskUsageParser;

struct DfRow<'a> {
    name: &'a str,
    size: f64,
    used: f64,
    percent: Option<f64>,
}

fn df_row<'a>(tokens: &[&'a str]) -> Option<DfRow<'a>> {
    let pct_at = tokens
        .iter()
        .position(|t| t.ends_with('%') && t.len() > 1)?;
    if pct_at < 3 {
        return None;
    }

    Some(DfRow {
        name: tokens[0],
        size: parse_number("size", tokens[pct_at - 3]).ok()?,
        used: parse_number("used", tokens[pct_at - 2]).ok()?,
        percent: parse_number("use%", tokens[pct_at]).ok(),
    })
}

impl MetricParser for DiskUsageParser {
    fn parse(&self, raw: &str) -> Result<f64, ParseError> {
        let mut wrapped: Option<&str> = None;
        let mut rows = 0usize;
        let mut size_sum = 0.0;
        let mut used_sum = 0.0;

        for line in raw.lines() {
            let mut tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens[0].eq_ignore_ascii_case("filesystem") {
                continue;
            }
            if tokens.len() == 1 {
                wrapped = Some(tokens[0]);
                continue;
            }
            if let Some(name) = wrapped.take() {
                tokens.insert(0, name);
            }

            let Some(row) = df_row(&tokens) else { continue };

            if row.name == "total" {
                return match row.percent {
                    Some(pct) => Ok(as_percent(pct)),
                    None => ratio_percent("df total", row.used, row.size),
                };
            }

            rows += 1;
            size_sum += row.size;
            used_sum += row.used;
        }

        if rows == 0 {
            return Err(ParseError::MissingLine("filesystem"));
        }
        ratio_percent("df", used_sum, size_sum)
    }
}

/// Output already reduced to a single percentage (`35.20`, `37%`)
#[derive(Debug, Default)]
pub struct PercentParser;

impl MetricParser for PercentParser {
    fn parse(&self, raw: &str) -> Result<f64, ParseError> {
        let token = raw.split_whitespace().next().ok_or(ParseError::Empty)?;
        Ok(as_percent(parse_number("percent", token)?))
    }
}
