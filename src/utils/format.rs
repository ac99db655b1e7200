//! Human-readable wall-clock durations for run reports

use std::time::Duration;

/// Format a duration the way run reports print it: `850us`, `12ms`, `4.56s`.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 1.0 {
        if secs < 999.5 {
            format!("{}s", significant(secs, 3))
        } else {
            format!("{:.1}s", secs)
        }
    } else {
        let micros = (secs * 1e6).round();
        if micros < 1000.0 {
            format!("{}us", micros as u64)
        } else {
            let millis = micros / 1000.0;
            let digits = match millis.round() {
                m if m < 100.0 => 2,
                m if m < 1000.0 => 3,
                _ => 4,
            };
            format!("{}ms", significant(millis, digits))
        }
    }
}

/// Round to `digits` significant digits and drop trailing zeros.
fn significant(value: f64, digits: i32) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs().log10().floor() as i32 + 1;
    let decimals = (digits - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
