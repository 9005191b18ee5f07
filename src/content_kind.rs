//! The enumerated content kind produced by Workers.

use std::fmt;
use std::str::FromStr;

/// Kind of content a Worker can produce for a Waypoint.
///
/// Extensible: a Worker may declare a kind outside the three built-ins via
/// [`ContentKind::Other`]. Parsing is case-insensitive; display is canonical
/// (uppercase for built-ins, as-given for `Other`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Video,
    Music,
    Text,
    Other(String),
}

impl ContentKind {
    /// Ordering used as the final Selection Policy tie-break: `TEXT < MUSIC < VIDEO`.
    /// `Other` kinds sort after the three built-ins, in lexical order.
    pub fn tie_break_rank(&self) -> (u8, &str) {
        match self {
            ContentKind::Text => (0, ""),
            ContentKind::Music => (1, ""),
            ContentKind::Video => (2, ""),
            ContentKind::Other(name) => (3, name.as_str()),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Video => write!(f, "VIDEO"),
            ContentKind::Music => write!(f, "MUSIC"),
            ContentKind::Text => write!(f, "TEXT"),
            ContentKind::Other(name) => write!(f, "{}", name.to_uppercase()),
        }
    }
}

impl FromStr for ContentKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "VIDEO" => ContentKind::Video,
            "MUSIC" => ContentKind::Music,
            "TEXT" => ContentKind::Text,
            other => ContentKind::Other(other.to_string()),
        })
    }
}
