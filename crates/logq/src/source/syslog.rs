//! Syslog — best-effort RFC 5424 / RFC 3164 parser producing [`LogRecord`]s.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use thiserror::Error;

use crate::record::{FieldValue, LogRecord};

/// Highest valid PRI value (facility 23, severity 7).
const MAX_PRIORITY: u8 = 191;

/// Longest RFC 3164 tag we look for before treating the rest as content.
const MAX_TAG_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message is not valid UTF-8")]
    NonUtf8,

    #[error("invalid syslog format: {0}")]
    InvalidFormat(String),
}

/// Parser for syslog messages (RFC 3164 and RFC 5424).
///
/// RFC 5424 is chosen when the header carries version `1`; anything else
/// with a valid `<PRI>` is read as RFC 3164. The `client` field is left to
/// the caller.
pub struct SyslogParser;

impl SyslogParser {
    pub fn parse(&self, raw: &[u8]) -> Result<LogRecord, ParseError> {
        let text = std::str::from_utf8(raw).map_err(|_| ParseError::NonUtf8)?;
        let (priority, rest) = parse_priority(text)?;

        match rest.strip_prefix("1 ") {
            Some(body) => parse_rfc5424(priority, body),
            None => Ok(parse_rfc3164(priority, rest)),
        }
    }
}

fn parse_priority(text: &str) -> Result<(u8, &str), ParseError> {
    let inner = text
        .strip_prefix('<')
        .ok_or_else(|| ParseError::InvalidFormat("missing syslog priority".into()))?;
    let end = inner
        .find('>')
        .filter(|&i| (1..=3).contains(&i))
        .ok_or_else(|| ParseError::InvalidFormat("unterminated priority".into()))?;
    let digits = &inner[..end];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidFormat("invalid priority value".into()));
    }
    let priority: u8 = digits
        .parse()
        .ok()
        .filter(|p| *p <= MAX_PRIORITY)
        .ok_or_else(|| ParseError::InvalidFormat(format!("priority {} out of range", digits)))?;
    Ok((priority, &inner[end + 1..]))
}

fn push_priority(record: &mut LogRecord, priority: u8) {
    record.push("priority", priority);
    record.push("facility", priority >> 3);
    record.push("severity", priority & 0x07);
}

/// `-` is the RFC 5424 nil value.
fn nil_or_text(token: &str) -> FieldValue {
    if token == "-" {
        FieldValue::Null
    } else {
        FieldValue::Text(token.to_string())
    }
}

/// Parse the part after `<PRI>1 `:
/// `TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD [MSG]`.
fn parse_rfc5424(priority: u8, body: &str) -> Result<LogRecord, ParseError> {
    let mut header = body.splitn(6, ' ');
    let mut next = |name: &str| {
        header
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ParseError::InvalidFormat(format!("missing {}", name)))
    };

    let timestamp = next("timestamp")?;
    let hostname = next("hostname")?;
    let app_name = next("app-name")?;
    let proc_id = next("procid")?;
    let msg_id = next("msgid")?;
    let rest = next("structured data")?;

    let timestamp = if timestamp == "-" {
        FieldValue::Null
    } else {
        DateTime::parse_from_rfc3339(timestamp)
            .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
            .map_err(|e| ParseError::InvalidFormat(format!("bad timestamp {:?}: {}", timestamp, e)))?
    };

    let (structured_data, message) = split_structured_data(rest)?;

    let mut record = LogRecord::with_capacity(12);
    push_priority(&mut record, priority);
    record.push("version", 1);
    record.push("timestamp", timestamp);
    record.push("hostname", nil_or_text(hostname));
    record.push("app_name", nil_or_text(app_name));
    record.push("proc_id", nil_or_text(proc_id));
    record.push("msg_id", nil_or_text(msg_id));
    record.push("structured_data", nil_or_text(structured_data));
    record.push("message", strip_bom(message));
    Ok(record)
}

/// Split `SD [SP MSG]` into the structured data (or `-`) and the message.
fn split_structured_data(rest: &str) -> Result<(&str, &str), ParseError> {
    if let Some(msg) = rest.strip_prefix('-') {
        return Ok(("-", msg.strip_prefix(' ').unwrap_or(msg)));
    }
    if !rest.starts_with('[') {
        return Err(ParseError::InvalidFormat("structured data must be '-' or '[...]'".into()));
    }

    // Walk SD-ELEMENTs; `]` inside a quoted PARAM-VALUE may be escaped.
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        let mut in_quotes = false;
        i += 1;
        loop {
            match bytes.get(i) {
                None => return Err(ParseError::InvalidFormat("unterminated structured data".into())),
                Some(b'\\') if in_quotes => i += 2,
                Some(b'"') => {
                    in_quotes = !in_quotes;
                    i += 1;
                }
                Some(b']') if !in_quotes => {
                    i += 1;
                    break;
                }
                Some(_) => i += 1,
            }
        }
    }

    let (sd, msg) = rest.split_at(i.min(rest.len()));
    Ok((sd, msg.strip_prefix(' ').unwrap_or(msg)))
}

fn strip_bom(message: &str) -> &str {
    message.strip_prefix('\u{feff}').unwrap_or(message)
}

/// Parse the part after `<PRI>`: `Mmm dd hh:mm:ss HOSTNAME TAG: CONTENT`.
///
/// Without a recognisable timestamp the current time is used and the
/// hostname is left null.
fn parse_rfc3164(priority: u8, rest: &str) -> LogRecord {
    let (timestamp, hostname, rest) = match parse_bsd_timestamp(rest, Utc::now()) {
        Some((ts, after)) => {
            let after = after.trim_start_matches(' ');
            match after.split_once(' ') {
                Some((host, tail)) => (ts, FieldValue::from(host), tail),
                None => (ts, FieldValue::Null, after),
            }
        }
        None => (Utc::now(), FieldValue::Null, rest),
    };

    let (tag, content) = split_tag(rest);

    let mut record = LogRecord::with_capacity(8);
    push_priority(&mut record, priority);
    record.push("timestamp", timestamp);
    record.push("hostname", hostname);
    record.push("tag", tag);
    record.push("content", content);
    record
}

/// RFC 3164 timestamps carry no year; the current year is assumed.
fn parse_bsd_timestamp(text: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, &str)> {
    let stamp = text.get(..15)?;
    let normalized = stamp.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = format!("{} {}", now.year(), normalized);
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S").ok()?;
    Some((naive.and_utc(), &text[15..]))
}

/// Split `TAG[PID]: CONTENT`. The tag is kept without the pid.
fn split_tag(text: &str) -> (FieldValue, &str) {
    let end = text
        .char_indices()
        .take(MAX_TAG_LEN + 1)
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
        .map(|(i, _)| i);

    match end {
        Some(i) if i > 0 && text[i..].starts_with(['[', ':']) => {
            let tag = &text[..i];
            let after = &text[i..];
            let after = match after.strip_prefix('[') {
                Some(pid) => pid.split_once(']').map(|(_, r)| r).unwrap_or(pid),
                None => after,
            };
            let content = after.strip_prefix(':').unwrap_or(after);
            (FieldValue::from(tag), content.strip_prefix(' ').unwrap_or(content))
        }
        _ => (FieldValue::Null, text),
    }
}
