use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// printf-style float format for table cells: `%.Ng`, `%.Nf` or `%.Ne`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatFormat {
    /// `%.Ng`: N significant digits, trailing zeros trimmed, exponent for
    /// very large or small magnitudes.
    General(usize),
    /// `%.Nf`: N digits after the point.
    Fixed(usize),
    /// `%.Ne`: scientific with N mantissa decimals.
    Exponent(usize),
}

impl Default for FloatFormat {
    fn default() -> Self {
        FloatFormat::General(7)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid float format {0:?} (expected %.Ng, %.Nf or %.Ne)")]
pub struct FloatFormatParseError(pub String);

fn format_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^%(?:\.(\d{1,2}))?([gfe])$").unwrap())
}

impl FromStr for FloatFormat {
    type Err = FloatFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = format_regex()
            .captures(s.trim())
            .ok_or_else(|| FloatFormatParseError(s.to_string()))?;
        // printf default precision is 6
        let precision = caps
            .get(1)
            .map(|m| m.as_str().parse::<usize>().unwrap_or(6))
            .unwrap_or(6);
        match &caps[2] {
            "g" => Ok(FloatFormat::General(precision)),
            "f" => Ok(FloatFormat::Fixed(precision)),
            "e" => Ok(FloatFormat::Exponent(precision)),
            _ => Err(FloatFormatParseError(s.to_string())),
        }
    }
}

impl fmt::Display for FloatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatFormat::General(p) => write!(f, "%.{}g", p),
            FloatFormat::Fixed(p) => write!(f, "%.{}f", p),
            FloatFormat::Exponent(p) => write!(f, "%.{}e", p),
        }
    }
}

impl FloatFormat {
    /// Append `value` to `out` in this format.
    pub fn write_to(&self, out: &mut String, value: f64) {
        if !value.is_finite() {
            out.push_str(if value.is_nan() {
                "nan"
            } else if value > 0.0 {
                "inf"
            } else {
                "-inf"
            });
            return;
        }
        match *self {
            FloatFormat::Fixed(p) => out.push_str(&format!("{:.*}", p, value)),
            FloatFormat::Exponent(p) => {
                let sci = format!("{:.*e}", p, value);
                let (mantissa, exp) = split_exponent(&sci);
                push_c_exponent(out, mantissa, exp);
            }
            FloatFormat::General(p) => write_general(out, value, p.max(1)),
        }
    }

    pub fn format(&self, value: f64) -> String {
        let mut s = String::new();
        self.write_to(&mut s, value);
        s
    }
}

/// C `%g`: pick fixed or scientific from the exponent after rounding to
/// `precision` significant digits, then trim trailing zeros.
fn write_general(out: &mut String, value: f64, precision: usize) {
    if value == 0.0 {
        out.push('0');
        return;
    }
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exp) = split_exponent(&sci);
    if exp < -4 || exp >= precision as i32 {
        push_c_exponent(out, trim_fraction(mantissa), exp);
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        out.push_str(trim_fraction(&format!("{:.*}", decimals, value)));
    }
}

fn split_exponent(s: &str) -> (&str, i32) {
    match s.split_once('e') {
        Some((m, e)) => (m, e.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

/// `e+05` style exponent: explicit sign, at least two digits.
fn push_c_exponent(out: &mut String, mantissa: &str, exp: i32) {
    out.push_str(mantissa);
    out.push('e');
    out.push(if exp < 0 { '-' } else { '+' });
    out.push_str(&format!("{:02}", exp.abs()));
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
