//! Option value parsing
//!
//! Parsers for the values transformation tools accept from flags and
//! environment variables: worker counts, boolean switches, line endings and
//! indentation. Empty input means "not given" wherever that makes sense.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quote a user-supplied value for an error message, escaping control characters.
fn quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Integer literal with optional sign and surrounding whitespace.
fn parse_integer(s: &str) -> Option<i128> {
    s.trim().parse().ok()
}

/// Parse a positive integer; empty input yields `None`.
pub fn parse_positive_integer(s: &str) -> Result<Option<usize>> {
    if s.is_empty() {
        return Ok(None);
    }
    let Some(value) = parse_integer(s) else {
        bail!("expect an integer value, got {}", quoted(s));
    };
    if value <= 0 {
        bail!("expect integer value to be positive, got {}", value);
    }
    match usize::try_from(value) {
        Ok(value) => Ok(Some(value)),
        Err(_) => bail!("integer value out of range, got {}", value),
    }
}

/// Parse a boolean state, case-insensitively.
///
/// * `1`, `yes`, `y`, `true`, `on` are `true`
/// * `0`, `no`, `n`, `false`, `off` are `false`
pub fn parse_boolean_state(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "yes" | "y" | "true" | "on" => Ok(true),
        "0" | "no" | "n" | "false" | "off" => Ok(false),
        _ => bail!("invalid boolean state value {}", quoted(s)),
    }
}

/// Line separator used in generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linesep {
    #[default]
    Lf,
    CrLf,
    Cr,
}

impl Linesep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Linesep::Lf => "\n",
            Linesep::CrLf => "\r\n",
            Linesep::Cr => "\r",
        }
    }
}

impl fmt::Display for Linesep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Linesep {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_linesep(s)? {
            Some(linesep) => Ok(linesep),
            None => bail!("invalid linesep value {}", quoted(s)),
        }
    }
}

/// Parse a line separator: the literal sequence or `lf`/`crlf`/`cr`.
pub fn parse_linesep(s: &str) -> Result<Option<Linesep>> {
    if s.is_empty() {
        return Ok(None);
    }
    let linesep = match s.to_ascii_lowercase().as_str() {
        "\n" | "lf" => Linesep::Lf,
        "\r\n" | "crlf" => Linesep::CrLf,
        "\r" | "cr" => Linesep::Cr,
        _ => bail!("invalid linesep value {}", quoted(s)),
    };
    Ok(Some(linesep))
}

/// Parse an indentation sequence.
///
/// * `t`, `tab` or a tab character mean a tab
/// * a string of spaces is returned as is
/// * a positive integer `n` means `n` spaces
pub fn parse_indentation(s: &str) -> Result<Option<String>> {
    if s.is_empty() {
        return Ok(None);
    }
    let lowered = s.to_ascii_lowercase();
    if matches!(lowered.as_str(), "t" | "tab" | "\t") {
        return Ok(Some("\t".to_string()));
    }
    if s.chars().all(|c| c == ' ') {
        return Ok(Some(s.to_string()));
    }
    match parse_integer(s).map(usize::try_from) {
        Some(Ok(n)) if n > 0 => Ok(Some(" ".repeat(n))),
        _ => bail!("invalid indentation value {}", quoted(s)),
    }
}
