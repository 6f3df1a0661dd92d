//! Raw header block parsing and lazy lookup
//!
//! Transports hand back headers as a single `name: value` block, one pair
//! per line. `HeaderLookup` keeps that block and parses it on first access.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Parsed headers: lower-cased name → comma-joined value.
pub type ParsedHeaders = BTreeMap<String, String>;

/// Parse a raw header block into a case-insensitive mapping.
///
/// Each line is split at its first colon. Names are trimmed and lower-cased,
/// values trimmed. Lines without a name are skipped. Repeated names are
/// joined in encounter order with `", "`.
pub fn parse_headers(raw: &str) -> ParsedHeaders {
    let mut parsed = ParsedHeaders::new();

    for line in raw.split('\n') {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();

        parsed
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    parsed
}

/// Lazily-parsed view over a raw header block.
///
/// The block is captured when the lookup is created; the parser runs at
/// most once, on the first `get` or `all`. Clones share the parsed map.
#[derive(Clone)]
pub struct HeaderLookup {
    raw: Option<Arc<str>>,
    parsed: Arc<OnceLock<ParsedHeaders>>,
    parser: fn(&str) -> ParsedHeaders,
}

impl HeaderLookup {
    pub fn new(raw: Option<&str>) -> Self {
        Self::with_parser(raw, parse_headers)
    }

    /// A lookup with no headers at all.
    pub fn empty() -> Self {
        Self::new(None)
    }

    pub(crate) fn with_parser(raw: Option<&str>, parser: fn(&str) -> ParsedHeaders) -> Self {
        Self {
            raw: raw.map(Arc::from),
            parsed: Arc::new(OnceLock::new()),
            parser,
        }
    }

    /// Value for `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.all().get(&name.to_lowercase()).map(String::as_str)
    }

    /// The whole parsed mapping.
    pub fn all(&self) -> &ParsedHeaders {
        self.parsed.get_or_init(|| match self.raw.as_deref() {
            Some(raw) => (self.parser)(raw),
            None => ParsedHeaders::new(),
        })
    }

    /// The raw block this lookup was built from.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

impl std::fmt::Debug for HeaderLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderLookup")
            .field("raw", &self.raw)
            .field("parsed", &self.parsed.get().is_some())
            .finish()
    }
}
