//! Logging of HTTP exchanges, with credentials redacted
//!
//! Every line goes through [`log::debug!`], prefixed with `>` (outgoing) or `<` (incoming).

use std::borrow::Cow;

const REDACTED: &str = "<redacted>";

/// How much of each exchange gets logged
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    /// Nothing
    None,
    /// Request lines and status lines
    Messages,
    /// ...plus headers
    Headers,
    /// ...plus bodies
    Full,
    /// ...without any redaction. Never use this outside of development.
    FullUnredacted,
}

impl Default for DebugLevel {
    fn default() -> Self {
        DebugLevel::None
    }
}

impl DebugLevel {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => DebugLevel::None,
            1 => DebugLevel::Messages,
            2 => DebugLevel::Headers,
            3 => DebugLevel::Full,
            _ => DebugLevel::FullUnredacted,
        }
    }

    fn redacts(&self) -> bool {
        *self > DebugLevel::None && *self < DebugLevel::FullUnredacted
    }
}

/// Direction of a logged line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    fn marker(&self) -> char {
        match self {
            Direction::Outgoing => '>',
            Direction::Incoming => '<',
        }
    }
}

/// Replaces anything that looks like a secret in a single log line
pub fn redact_line(line: &str) -> Cow<'_, str> {
    if let Some(rest) = strip_prefix_ignore_case(line, "Authorization:") {
        let scheme = rest.trim_start().split_whitespace().next().unwrap_or("");
        return match scheme {
            "GoogleLogin" | "OAuth" | "Bearer" => Cow::Owned(format!("Authorization: {} {}", scheme, REDACTED)),
            _ => Cow::Owned(format!("Authorization: {}", REDACTED)),
        };
    }
    if strip_prefix_ignore_case(line, "Set-Cookie:").is_some() {
        return Cow::Owned(format!("Set-Cookie: {}", REDACTED));
    }
    if strip_prefix_ignore_case(line, "X-GData-Key:").is_some() {
        return Cow::Owned(format!("X-GData-Key: key={}", REDACTED));
    }
    if let Some(uri) = strip_prefix_ignore_case(line, "Location:") {
        return Cow::Owned(format!("Location: {}", redact_form(uri.trim_start(), &["gsessionid"])));
    }
    for prefix in &["SID=", "LSID=", "Auth="] {
        if line.starts_with(prefix) {
            return Cow::Owned(format!("{}{}", prefix, REDACTED));
        }
    }

    let sensitive = ["Email", "Passwd", "oauth_token", "oauth_token_secret"];
    if sensitive.iter().any(|key| line.contains(&format!("{}=", key))) {
        return Cow::Owned(redact_form(line, &sensitive));
    }
    Cow::Borrowed(line)
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line.is_char_boundary(prefix.len()) && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Redacts the values of the given keys in something form-encoded, possibly preceded by a URI path
fn redact_form(text: &str, keys: &[&str]) -> String {
    let (head, query) = match text.find('?') {
        Some(pos) => (&text[..=pos], &text[pos + 1..]),
        None => ("", text),
    };

    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            if pair.contains('=') && keys.contains(&key) {
                format!("{}={}", key, REDACTED)
            } else {
                pair.to_string()
            }
        })
        .collect();
    format!("{}{}", head, pairs.join("&"))
}

/// Logs one HTTP message (request or response) according to `level`
pub fn log_message<'h, H>(level: DebugLevel, direction: Direction, first_line: &str, headers: H, body: Option<&[u8]>)
where
    H: IntoIterator<Item = (&'h str, &'h str)>,
{
    if level == DebugLevel::None || log::log_enabled!(log::Level::Debug) == false {
        return;
    }

    let marker = direction.marker();
    let emit = |line: &str| {
        if level.redacts() {
            log::debug!("{} {}", marker, redact_line(line));
        } else {
            log::debug!("{} {}", marker, line);
        }
    };

    emit(first_line);
    if level < DebugLevel::Headers {
        return;
    }
    for (name, value) in headers {
        emit(&format!("{}: {}", name, value));
    }
    if level < DebugLevel::Full {
        return;
    }
    if let Some(body) = body {
        for line in String::from_utf8_lossy(body).lines() {
            emit(line);
        }
    }
}
