//! Number formatting for generated configuration files.
//!
//! Downstream tooling compares mesh names and option strings textually, so the
//! representation has to be stable: mesh names use a 6 digit general format
//! (`0.1`, `1e-05`), option values the shortest round-trip form (`1e-09`, `5.0`).

/// split rust's `{:e}` output into mantissa and exponent
fn split_exponent(formatted: &str) -> (&str, i32) {
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse().unwrap_or(0)),
        None => (formatted, 0),
    }
}

fn exponent_suffix(exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("e{sign}{:02}", exponent.abs())
}

fn strip_fraction_zeros(value: &str) -> &str {
    if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.')
    } else {
        value
    }
}

fn non_finite(value: f64) -> Option<String> {
    if value.is_nan() {
        Some("nan".into())
    } else if value.is_infinite() {
        Some(if value > 0.0 { "inf" } else { "-inf" }.into())
    } else {
        None
    }
}

/// general format with six significant digits, trailing zeros removed
pub fn format_general(value: f64) -> String {
    if let Some(special) = non_finite(value) {
        return special;
    }
    if value == 0.0 {
        return "0".into();
    }

    let scientific = format!("{value:.5e}");
    let (mantissa, exponent) = split_exponent(&scientific);

    if (-4..6).contains(&exponent) {
        let fixed = format!("{:.*}", (5 - exponent) as usize, value);
        strip_fraction_zeros(&fixed).to_string()
    } else {
        format!(
            "{}{}",
            strip_fraction_zeros(mantissa),
            exponent_suffix(exponent)
        )
    }
}

/// shortest representation that parses back to `value`, always marked as a float
pub fn format_shortest(value: f64) -> String {
    if let Some(special) = non_finite(value) {
        return special;
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = split_exponent(&scientific);

    if (-4..16).contains(&exponent) {
        let fixed = value.to_string();
        if fixed.contains('.') {
            fixed
        } else {
            format!("{fixed}.0")
        }
    } else {
        format!("{mantissa}{}", exponent_suffix(exponent))
    }
}
