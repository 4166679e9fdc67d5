//! Verdict vocabulary, priority order, and LAPI duration parsing.

use cerberus_common::error::BouncerError;
use cerberus_common::types::VerdictKind;

/// Sort a sequence of kind-bearing tuples by descending verdict
/// priority, stable on ties. Callers pass a key extraction closure so
/// this works for both `DecisionTuple` and ad-hoc pairs.
pub fn sort_by_priority<T>(mut seq: Vec<T>, kind_of: impl Fn(&T) -> VerdictKind) -> Vec<T> {
    seq.sort_by(|a, b| kind_of(b).cmp(&kind_of(a)));
    seq
}

/// Parse a LAPI duration string into a signed integer number of seconds.
///
/// Grammar (matches LAPI's bespoke format, ambiguities preserved rather
/// than "fixed"): optional leading `-`, optional `<n>h`, then `<n>m` —
/// mandatory whenever `h` is present, disallowed otherwise — then a
/// mandatory `<n>[.<frac>]` seconds value, then an optional `m` right
/// before the final `s` to mark the whole sum as milliseconds. The `m`
/// (milliseconds) marker is only accepted when the seconds value
/// carries a decimal point — `500ms` has none and is rejected, while
/// `500.0ms` parses. Sum is `hours*3600 + minutes*60 + seconds`; if the
/// trailing `m` marker is present the sum is multiplied by `0.001`
/// before rounding to the nearest integer (ties to even).
pub fn parse_duration(input: &str) -> Result<i64, BouncerError> {
    let err = || BouncerError::Input(format!("invalid duration: {input}"));

    let (sign, rest) = match input.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, input),
    };

    let mut cursor = rest;
    let mut hours: i64 = 0;
    let mut minutes: i64 = 0;
    let mut have_hours = false;

    if let Some(h_idx) = cursor.find('h') {
        hours = cursor[..h_idx].parse().map_err(|_| err())?;
        have_hours = true;
        cursor = &cursor[h_idx + 1..];

        let m_idx = cursor.find('m').ok_or_else(err)?;
        minutes = cursor[..m_idx].parse().map_err(|_| err())?;
        cursor = &cursor[m_idx + 1..];
    }
    let _ = have_hours;

    let tail = cursor.strip_suffix('s').ok_or_else(err)?;
    let (seconds_str, is_ms) = match tail.strip_suffix('m') {
        Some(stripped) => (stripped, true),
        None => (tail, false),
    };
    if seconds_str.is_empty() {
        return Err(err());
    }
    if is_ms && !seconds_str.contains('.') {
        return Err(err());
    }

    let seconds_value: f64 = seconds_str.parse().map_err(|_| err())?;
    let mut total = (hours * 3600 + minutes * 60) as f64 + seconds_value;
    if is_ms {
        total *= 0.001;
    }

    Ok(sign * total.round_ties_even() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_minutes_seconds() {
        assert_eq!(parse_duration("3h59m58s").unwrap(), 14398);
    }

    #[test]
    fn parses_negative() {
        assert_eq!(parse_duration("-1h0m0s").unwrap(), -3600);
    }

    #[test]
    fn rejects_ms_without_decimal_point() {
        assert!(parse_duration("500ms").is_err());
    }

    #[test]
    fn accepts_fractional_ms_rounding_to_zero() {
        assert_eq!(parse_duration("500.0ms").unwrap(), 0);
    }

    #[test]
    fn rejects_hours_without_minutes() {
        assert!(parse_duration("1h30s").is_err());
    }

    #[test]
    fn rejects_bare_minutes_without_hours() {
        assert!(parse_duration("30m45s").is_err());
    }

    #[test]
    fn sorts_by_descending_priority() {
        let seq = vec![VerdictKind::Bypass, VerdictKind::Ban, VerdictKind::Captcha];
        let sorted = sort_by_priority(seq, |k| *k);
        assert_eq!(
            sorted,
            vec![VerdictKind::Ban, VerdictKind::Captcha, VerdictKind::Bypass]
        );
    }
}
