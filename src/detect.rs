//! Source text detection
//!
//! Heuristics used before transforming a file: which line separator and
//! which indentation the original code uses (so generated code blends in), and
//! which encoding a raw byte buffer declares.
//!
//! The text helpers accept anything [`TextSource`] accepts, so a stream passed
//! in is left at the position it was found. Stream bytes are decoded with the
//! encoding the source declares (see [`detect_encoding`]); strings are used as
//! they are.

use crate::options::Linesep;
use crate::text_source::{SourceInput, TextSource};
use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::Encoding;
use regex::bytes::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static CODING_COOKIE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\x0c]*#.*?coding[:=][ \t]*([-\w.]+)").expect("valid regex"));

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\x0c]*(?:[#\r\n]|$)").expect("valid regex"));

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

fn read_text<'a>(input: impl Into<SourceInput<'a>>) -> Result<String> {
    let mut source = TextSource::open(input)?;
    if source.is_stream() {
        decode_source(&source.snapshot_bytes()?)
    } else {
        Ok(source.snapshot()?)
    }
}

/// Split on `\n`, `\r\n` and `\r`, keeping each line's terminator.
fn lines_with_endings(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut start = 0;
    std::iter::from_fn(move || {
        if start >= bytes.len() {
            return None;
        }
        let mut end = start;
        while end < bytes.len() {
            match bytes[end] {
                b'\n' => {
                    end += 1;
                    break;
                }
                b'\r' => {
                    end += if bytes.get(end + 1) == Some(&b'\n') { 2 } else { 1 };
                    break;
                }
                _ => end += 1,
            }
        }
        let line = &text[start..end];
        start = end;
        Some(line)
    })
}

/// Detect the dominant line separator.
///
/// Mixed files vote by occurrence count; ties prefer LF, then CRLF, then CR.
pub fn detect_linesep<'a>(input: impl Into<SourceInput<'a>>) -> Result<Linesep> {
    let text = read_text(input)?;

    let (mut lf, mut crlf, mut cr) = (0usize, 0usize, 0usize);
    for line in lines_with_endings(&text) {
        if line.ends_with("\r\n") {
            crlf += 1;
        } else if line.ends_with('\r') {
            cr += 1;
        } else if line.ends_with('\n') {
            lf += 1;
        }
    }

    let (_, _, linesep) = [(lf, 3, Linesep::Lf), (crlf, 2, Linesep::CrLf), (cr, 1, Linesep::Cr)]
        .into_iter()
        .max_by_key(|(count, priority, _)| (*count, *priority))
        .unwrap_or((0, 0, Linesep::Lf));
    Ok(linesep)
}

/// Display width of leading whitespace, with tabs advancing to multiples of 8.
fn indent_width(indent: &str) -> usize {
    indent.chars().fold(0, |column, c| match c {
        '\t' => (column / 8 + 1) * 8,
        _ => column + 1,
    })
}

/// Bracket, string and backslash state carried from one physical line to the next.
#[derive(Debug, Default)]
struct LineScanner {
    depth: usize,
    /// Open string literal: its quote character and whether it is triple-quoted.
    string: Option<(char, bool)>,
    continued: bool,
}

impl LineScanner {
    /// Whether the next line continues the current logical line.
    fn in_logical_line(&self) -> bool {
        self.depth > 0 || self.string.is_some() || self.continued
    }

    fn scan(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let quote_run = |at: usize, quote: char| {
            chars.get(at..at + 3).is_some_and(|run| run.iter().all(|c| *c == quote))
        };
        self.continued = false;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if let Some((quote, triple)) = self.string {
                match c {
                    // an escaped line ending keeps even a one-line string open
                    '\\' if chars[i + 1..].starts_with(&['\r', '\n']) => i += 2,
                    '\\' => i += 1,
                    '\n' | '\r' if !triple => self.string = None,
                    c if c == quote && !triple => self.string = None,
                    c if c == quote && quote_run(i, quote) => {
                        self.string = None;
                        i += 2;
                    }
                    _ => {}
                }
                i += 1;
                continue;
            }

            match c {
                '#' => break,
                '\'' | '"' => {
                    let triple = quote_run(i, c);
                    self.string = Some((c, triple));
                    if triple {
                        i += 2;
                    }
                }
                '(' | '[' | '{' => self.depth += 1,
                ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                '\\' => {
                    self.continued = chars[i + 1..].iter().all(|c| matches!(c, '\r' | '\n'));
                }
                _ => {}
            }
            i += 1;
        }
    }
}

/// Detect the indentation sequence.
///
/// Every line that opens a deeper block votes for tabs or spaces (lines mixing
/// both are skipped). Spaces win with the narrowest such indent, tabs win with
/// `"\t"`, and a tie falls back to four spaces. Blank and comment-only lines
/// never open a block, and neither do lines continuing an open bracket, a
/// string literal or a backslash-joined line.
pub fn detect_indentation<'a>(input: impl Into<SourceInput<'a>>) -> Result<String> {
    let text = read_text(input)?;

    let mut levels = vec![0usize];
    let (mut spaces, mut tabs) = (0usize, 0usize);
    let mut min_spaces: Option<usize> = None;
    let mut scanner = LineScanner::default();

    for line in lines_with_endings(&text) {
        let continuation = scanner.in_logical_line();
        scanner.scan(line);
        if continuation {
            continue;
        }

        let content = line.trim_start_matches([' ', '\t', '\x0c']);
        let body = content.trim_end_matches(['\r', '\n']);
        if body.is_empty() || body.starts_with('#') {
            continue;
        }

        let indent = &line[..line.len() - content.len()];
        let width = indent_width(indent);
        let current = levels.last().copied().unwrap_or(0);

        if width > current {
            levels.push(width);
            let has_tab = indent.contains('\t');
            let has_space = indent.contains(' ');
            if has_tab && has_space {
                continue;
            }
            if has_tab {
                tabs += 1;
            } else {
                spaces += 1;
                min_spaces = Some(min_spaces.map_or(indent.len(), |m| m.min(indent.len())));
            }
        } else {
            while levels.len() > 1 && width < levels.last().copied().unwrap_or(0) {
                levels.pop();
            }
        }
    }

    Ok(match (spaces.cmp(&tabs), min_spaces) {
        (std::cmp::Ordering::Greater, Some(width)) => " ".repeat(width),
        (std::cmp::Ordering::Less, _) => "\t".to_string(),
        _ => " ".repeat(4),
    })
}

/// Canonical name for the common encoding aliases.
fn normalize_encoding(name: &str) -> String {
    let lowered: String = name.chars().take(12).collect::<String>().to_lowercase().replace('_', "-");
    if lowered == "utf-8" || lowered.starts_with("utf-8-") {
        return "utf-8".to_string();
    }
    for latin in ["latin-1", "iso-8859-1", "iso-latin-1"] {
        if lowered == latin || lowered.starts_with(&format!("{latin}-")) {
            return "iso-8859-1".to_string();
        }
    }
    name.to_string()
}

fn find_cookie(line: &[u8]) -> Result<Option<String>> {
    if std::str::from_utf8(line).is_err() {
        bail!("invalid or missing encoding declaration");
    }
    Ok(CODING_COOKIE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| normalize_encoding(&String::from_utf8_lossy(m.as_bytes()))))
}

/// A codec source bytes can be decoded with
enum Codec {
    Utf8,
    Latin1,
    Other(&'static Encoding),
}

fn lookup_codec(name: &str) -> Option<Codec> {
    match normalize_encoding(name).as_str() {
        "utf-8" => Some(Codec::Utf8),
        "iso-8859-1" => Some(Codec::Latin1),
        other => Encoding::for_label(other.as_bytes())
            .or_else(|| Encoding::for_label(other.replace('_', "-").as_bytes()))
            .map(Codec::Other),
    }
}

/// Decode source bytes with the encoding they declare.
///
/// A UTF-8 BOM is stripped. Bytes that are invalid in the declared encoding
/// are an error rather than replacement characters.
pub fn decode_source(code: &[u8]) -> Result<String> {
    let encoding = detect_encoding(code)?;
    let codec = lookup_codec(&encoding).ok_or_else(|| anyhow!("unknown encoding: {encoding}"))?;
    match codec {
        Codec::Utf8 => {
            let body = code.strip_prefix(UTF8_BOM).unwrap_or(code);
            String::from_utf8(body.to_vec()).with_context(|| format!("source is not valid {encoding}"))
        }
        // ISO-8859-1 maps every byte to the code point of the same value
        Codec::Latin1 => Ok(code.iter().map(|&b| char::from(b)).collect()),
        Codec::Other(codec) => codec
            .decode_without_bom_handling_and_without_replacement(code)
            .map(Cow::into_owned)
            .ok_or_else(|| anyhow!("source is not valid {encoding}")),
    }
}

/// Detect the encoding a source file declares.
///
/// Looks for a UTF-8 BOM and a coding cookie in the first two lines. A BOM
/// yields `utf-8-sig`; a cookie disagreeing with a BOM is an error, and so is
/// a cookie naming an encoding [`decode_source`] cannot handle. Without either
/// the default `utf-8` is returned.
pub fn detect_encoding(code: &[u8]) -> Result<String> {
    let (has_bom, code) = match code.strip_prefix(UTF8_BOM) {
        Some(rest) => (true, rest),
        None => (false, code),
    };
    let default = if has_bom { "utf-8-sig" } else { "utf-8" };

    let mut lines = code.split_inclusive(|b| *b == b'\n').take(2);
    for line_number in 0..2 {
        let Some(line) = lines.next() else {
            break;
        };
        if let Some(encoding) = find_cookie(line)? {
            if lookup_codec(&encoding).is_none() {
                bail!("unknown encoding: {encoding}");
            }
            if has_bom {
                if encoding != "utf-8" {
                    bail!("encoding problem: utf-8");
                }
                return Ok("utf-8-sig".to_string());
            }
            return Ok(encoding);
        }
        if line_number == 0 && !BLANK_LINE.is_match(line) {
            break;
        }
    }

    Ok(default.to_string())
}
