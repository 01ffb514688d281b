// Advisory resource estimation for submitted python code
//
// The estimate is shown to the approver before they decide; it never
// blocks execution.

use once_cell::sync::Lazy;
use regex::Regex;

static LARGE_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4,}").expect("static pattern"));
static BIG_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"range\(\d{5,}\)").expect("static pattern"));
static ML_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sklearn|tensorflow|torch|keras").expect("static pattern"));
static PLOTTING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"matplotlib|plt\.|seaborn").expect("static pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEstimate {
    pub memory_mb: u32,
    pub cpu_intensive: bool,
    pub warning: Option<String>,
}

/// Coarse memory/CPU estimate from static signals in the code.
pub fn estimate_resources(code: &str) -> ResourceEstimate {
    let has_large_data = LARGE_LITERAL.is_match(code) || BIG_RANGE.is_match(code);
    let has_ml = ML_IMPORT.is_match(code);
    let has_plotting = PLOTTING.is_match(code);

    let mut memory_mb = 128;
    let mut cpu_intensive = false;

    if has_large_data {
        memory_mb = 512;
        cpu_intensive = true;
    }
    if has_ml {
        memory_mb = 1024;
        cpu_intensive = true;
    }
    if has_plotting {
        memory_mb = memory_mb.max(256);
    }

    let warning = (memory_mb > 512).then(|| {
        format!(
            "Estimated {}MB memory. This may take a while.",
            memory_mb
        )
    });

    ResourceEstimate {
        memory_mb,
        cpu_intensive,
        warning,
    }
}
