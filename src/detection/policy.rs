//! Pure detection rules
//!
//! One function per metric family. Every function takes the observed value
//! and the *ready* baseline (`None` while history is insufficient) and
//! returns a [`Verdict`]. Within a rule the CRITICAL checks always run
//! before the WARNING checks and the first match wins.

use super::Verdict;

const MIB: f64 = 1024.0 * 1024.0;
const KIB: f64 = 1024.0;

/// Thresholds for percentage gauges that must never read zero
#[derive(Debug, Clone, Copy)]
pub struct PercentThresholds {
    pub label: &'static str,
    pub warning: f64,
    pub critical: f64,
}

pub const CPU_USAGE: PercentThresholds = PercentThresholds {
    label: "CPU usage",
    warning: 70.0,
    critical: 90.0,
};

pub const MEMORY_USAGE: PercentThresholds = PercentThresholds {
    label: "Memory usage",
    warning: 75.0,
    critical: 90.0,
};

pub const DISK_IOPS_WARNING: f64 = 100.0;
pub const DISK_IOPS_CRITICAL: f64 = 500.0;

/// Thresholds for throughput counters judged by absolute ceilings and by
/// amplification over the baseline
#[derive(Debug, Clone, Copy)]
pub struct ThroughputThresholds {
    pub label: &'static str,
    /// Absolute CRITICAL ceiling, checked before anything else (exclusive)
    pub critical_absolute: f64,
    /// Below this, an unavailable/zero baseline means NORMAL
    pub fallback_floor: f64,
    /// Fallback WARNING floor when no baseline is usable (inclusive)
    pub fallback_warning: f64,
    /// Ratio that yields CRITICAL
    pub critical_ratio: f64,
    /// Ratio that, together with `ratio_warning_floor`, yields WARNING
    pub warning_ratio: f64,
    /// Absolute floor the value must clear for a ratio WARNING
    pub ratio_warning_floor: f64,
    /// Whether `ratio_warning_floor` is inclusive
    pub ratio_warning_inclusive: bool,
}

pub const DISK_BYTES: ThroughputThresholds = ThroughputThresholds {
    label: "Disk I/O",
    critical_absolute: 80.0 * MIB,
    fallback_floor: MIB,
    fallback_warning: 20.0 * MIB,
    critical_ratio: 5.0,
    warning_ratio: 3.0,
    ratio_warning_floor: 20.0 * MIB,
    ratio_warning_inclusive: true,
};

pub const NET_BYTES: ThroughputThresholds = ThroughputThresholds {
    label: "Network",
    critical_absolute: 50.0 * MIB,
    fallback_floor: KIB,
    fallback_warning: 5.0 * MIB,
    critical_ratio: 3.0,
    warning_ratio: 2.0,
    ratio_warning_floor: 5.0 * MIB,
    ratio_warning_inclusive: false,
};

/// Below this, dropped-packet rates are noise
pub const NET_DROPPED_NOISE_FLOOR: f64 = 0.1;

/// Absolute floor used for counters when no baseline is usable
pub const ZERO_BASELINE_FLOOR: f64 = 1.0;

pub const AMPLIFICATION_WARNING: f64 = 2.0;
pub const AMPLIFICATION_CRITICAL: f64 = 3.0;

pub const CONTEXT_SWITCHES_CRITICAL: f64 = 40_000.0;
pub const CONTEXT_SWITCHES_WARNING: f64 = 20_000.0;
pub const CONTEXT_SWITCHES_FALLBACK_FLOOR: f64 = 1_000.0;
pub const CONTEXT_SWITCHES_WARNING_RATIO: f64 = 3.0;

/// A baseline usable as a ratio denominator
fn usable(baseline: Option<f64>) -> Option<f64> {
    baseline.filter(|b| *b != 0.0)
}

fn mib(bytes: f64) -> f64 {
    bytes / MIB
}

/// CPU / memory: absolute thresholds, zero means the collector or host stalled
pub fn percent_gauge(value: f64, thresholds: &PercentThresholds) -> Verdict {
    let label = thresholds.label;

    if value == 0.0 {
        return Verdict::critical(format!(
            "{label} is 0%. The process may be stalled or metric collection may have stopped."
        ));
    }

    if value >= thresholds.critical {
        return Verdict::critical(format!(
            "{label} is {value:.2}%, above the critical threshold ({:.2}%).",
            thresholds.critical
        ));
    }

    if value >= thresholds.warning {
        return Verdict::warning(format!(
            "{label} is {value:.2}%, above the warning threshold ({:.2}%).",
            thresholds.warning
        ));
    }

    Verdict::normal()
}

/// Disk IOPS: absolute thresholds only, idle is normal
pub fn disk_iops(metric_name: &str, value: f64) -> Verdict {
    if value == 0.0 {
        return Verdict::normal();
    }

    if value >= DISK_IOPS_CRITICAL {
        return Verdict::critical(format!(
            "Disk I/O ({metric_name}) is at {value:.2} IOPS, above the critical threshold \
             ({DISK_IOPS_CRITICAL:.2} IOPS). The VM may be hitting its I/O limit."
        ));
    }

    if value >= DISK_IOPS_WARNING {
        return Verdict::warning(format!(
            "Disk I/O ({metric_name}) is at {value:.2} IOPS, above the warning threshold \
             ({DISK_IOPS_WARNING:.2} IOPS). Service load needs monitoring."
        ));
    }

    Verdict::normal()
}

/// Disk and network byte rates: absolute ceiling, then fallback or amplification
pub fn throughput(
    metric_name: &str,
    value: f64,
    baseline: Option<f64>,
    thresholds: &ThroughputThresholds,
) -> Verdict {
    let label = thresholds.label;

    if value > thresholds.critical_absolute {
        return Verdict::critical(format!(
            "{label} ({metric_name}) is {:.2} MB/s, above the critical threshold ({:.2} MB/s).",
            mib(value),
            mib(thresholds.critical_absolute)
        ));
    }

    let Some(baseline) = usable(baseline) else {
        if value < thresholds.fallback_floor {
            return Verdict::normal();
        }
        if value >= thresholds.fallback_warning {
            return Verdict::warning(format!(
                "{label} ({metric_name}) rose to {:.2} MB/s. No baseline yet, \
                 judged against the absolute floor ({:.2} MB/s).",
                mib(value),
                mib(thresholds.fallback_warning)
            ));
        }
        return Verdict::normal();
    };

    let ratio = value / baseline;

    if ratio >= thresholds.critical_ratio {
        return Verdict::critical(format!(
            "{label} ({metric_name}) surged to {:.2}x the baseline ({:.2} MB/s -> {:.2} MB/s), \
             critical ratio {:.2}x.",
            ratio,
            mib(baseline),
            mib(value),
            thresholds.critical_ratio
        ));
    }

    let clears_floor = if thresholds.ratio_warning_inclusive {
        value >= thresholds.ratio_warning_floor
    } else {
        value > thresholds.ratio_warning_floor
    };

    if ratio >= thresholds.warning_ratio && clears_floor {
        return Verdict::warning(format!(
            "{label} ({metric_name}) rose to {:.2}x the baseline ({:.2} MB/s -> {:.2} MB/s), \
             warning at {:.2}x and {:.2} MB/s.",
            ratio,
            mib(baseline),
            mib(value),
            thresholds.warning_ratio,
            mib(thresholds.ratio_warning_floor)
        ));
    }

    Verdict::normal()
}

/// Dropped packets: noise floor, then fallback or amplification
pub fn net_dropped(value: f64, baseline: Option<f64>) -> Verdict {
    if value < NET_DROPPED_NOISE_FLOOR {
        return Verdict::normal();
    }

    let Some(baseline) = usable(baseline) else {
        if value < ZERO_BASELINE_FLOOR {
            return Verdict::normal();
        }
        return Verdict::warning(format!(
            "Network dropped rose to {value:.2}. No baseline yet, judged against the absolute \
             floor ({ZERO_BASELINE_FLOOR:.2})."
        ));
    };

    let ratio = value / baseline;

    if ratio >= AMPLIFICATION_CRITICAL {
        return Verdict::critical(format!(
            "Network dropped surged to {ratio:.2}x the baseline ({baseline:.2} -> {value:.2}), \
             critical ratio {AMPLIFICATION_CRITICAL:.2}x."
        ));
    }

    if ratio >= AMPLIFICATION_WARNING {
        return Verdict::warning(format!(
            "Network dropped rose to {ratio:.2}x the baseline ({baseline:.2} -> {value:.2}), \
             warning ratio {AMPLIFICATION_WARNING:.2}x."
        ));
    }

    Verdict::normal()
}

/// Context switches: absolute ceiling, then fallback or amplification with a floor
pub fn context_switches(value: f64, baseline: Option<f64>) -> Verdict {
    if value > CONTEXT_SWITCHES_CRITICAL {
        return Verdict::critical(format!(
            "Context switches at {value:.0}/s, above the critical threshold \
             ({CONTEXT_SWITCHES_CRITICAL:.0}/s)."
        ));
    }

    let Some(baseline) = usable(baseline) else {
        if value < CONTEXT_SWITCHES_FALLBACK_FLOOR {
            return Verdict::normal();
        }
        if value >= CONTEXT_SWITCHES_WARNING {
            return Verdict::warning(format!(
                "Context switches rose to {value:.0}/s. No baseline yet, judged against the \
                 absolute floor ({CONTEXT_SWITCHES_WARNING:.0}/s)."
            ));
        }
        return Verdict::normal();
    };

    let ratio = value / baseline;

    if ratio >= CONTEXT_SWITCHES_WARNING_RATIO && value > CONTEXT_SWITCHES_WARNING {
        return Verdict::warning(format!(
            "Context switches rose to {ratio:.2}x the baseline ({baseline:.0}/s -> {value:.0}/s), \
             warning at {CONTEXT_SWITCHES_WARNING_RATIO:.2}x and {CONTEXT_SWITCHES_WARNING:.0}/s."
        ));
    }

    Verdict::normal()
}

/// Error counters: a drop to zero from a positive baseline is itself suspicious
pub fn error_amplification(metric_name: &str, value: f64, baseline: Option<f64>) -> Verdict {
    if value == 0.0 {
        if let Some(baseline) = baseline.filter(|b| *b > 0.0) {
            return Verdict::critical(format!(
                "System errors ({metric_name}) dropped to 0 from a baseline of {baseline:.2}. \
                 Possible blackout, lost connectivity or blocked I/O."
            ));
        }
    }

    let Some(baseline) = usable(baseline) else {
        if value < ZERO_BASELINE_FLOOR {
            return Verdict::normal();
        }
        return Verdict::warning(format!(
            "System errors ({metric_name}) rose to {value:.2}. No baseline yet, judged against \
             the absolute floor ({ZERO_BASELINE_FLOOR:.2})."
        ));
    };

    let ratio = value / baseline;

    if ratio >= AMPLIFICATION_CRITICAL {
        return Verdict::critical(format!(
            "System errors ({metric_name}) surged to {ratio:.2}x the baseline \
             ({baseline:.2} -> {value:.2}), critical ratio {AMPLIFICATION_CRITICAL:.2}x."
        ));
    }

    if ratio >= AMPLIFICATION_WARNING {
        return Verdict::warning(format!(
            "System errors ({metric_name}) rose to {ratio:.2}x the baseline \
             ({baseline:.2} -> {value:.2}), warning ratio {AMPLIFICATION_WARNING:.2}x."
        ));
    }

    Verdict::normal()
}
