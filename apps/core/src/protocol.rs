use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const INDEXED_TOKEN: &str = ":indexed";
pub const STATUS_SIGIL: char = ':';
pub const FIELD_SEPARATOR: char = '|';
pub const LINE_TERMINATOR: &str = "\n";

pub const STRIPPED_QUERY_CHARS: &[char] = &[
    '[', ']', '~', '`', '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', ';', ':', '"', '\'',
    '<', '>', ',', '?', '/', '+', '=', '-', '_',
];

// Echo text must equal the sent query exactly for its batch to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    IndexedMarker,
    QueryEcho { text: String },
    ResultRecord { name: String, path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    MissingSeparator(String),
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSeparator(line) => {
                write!(f, "result line has no '{FIELD_SEPARATOR}' separator: {line:?}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

pub fn decode_line(raw: &str) -> Result<ProtocolEvent, ProtocolError> {
    let line = strip_line_terminator(raw);

    if line == INDEXED_TOKEN {
        return Ok(ProtocolEvent::IndexedMarker);
    }

    if let Some(text) = line.strip_prefix(STATUS_SIGIL) {
        return Ok(ProtocolEvent::QueryEcho {
            text: text.to_string(),
        });
    }

    let (name, path) = line
        .split_once(FIELD_SEPARATOR)
        .ok_or_else(|| ProtocolError::MissingSeparator(line.to_string()))?;

    Ok(ProtocolEvent::ResultRecord {
        name: name.to_string(),
        path: PathBuf::from(path.trim_end()),
    })
}

pub fn encode_query(query: &str) -> String {
    let mut line = String::with_capacity(query.len() + LINE_TERMINATOR.len());
    line.push_str(query);
    line.push_str(LINE_TERMINATOR);
    line
}

pub fn sanitize_query(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() && !STRIPPED_QUERY_CHARS.contains(c))
        .collect()
}

fn strip_line_terminator(raw: &str) -> &str {
    let line = raw.strip_suffix('\n').unwrap_or(raw);
    line.strip_suffix('\r').unwrap_or(line)
}
