//! # Prefix Resolver
//!
//! Maps a station identifier to a geographic entity using the flat entity-block
//! database (`cty.dat` layout):
//!
//! ```text
//! United States:            05:  08:  NA:   37.53:    91.67:     5.0:  K:
//!     AA,AB,AC,K,N,W,=W1AW(5)[8],...;
//! ```
//!
//! The header carries name, CQ zone, ITU zone, continent, latitude, longitude
//! (west positive), UTC offset and primary prefix. The alias list that follows
//! is comma separated and terminated by `;`. Entries starting with `=` only
//! match the full identifier. Override modifiers in `()`, `[]`, `<>`, `{}` and
//! `~~` are stripped.
//!
//! Lookup strips portable suffixes, checks the exact table, then walks the
//! candidate prefixes from longest to shortest. The index is immutable after
//! load and shared behind an `Arc`.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;

/// A geographic/organizational entity (DXCC-style).
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub cq_zone: u8,
    pub itu_zone: u8,
    pub continent: String,
    /// Degrees, north positive.
    pub latitude: f64,
    /// Degrees, east positive.
    pub longitude: f64,
    pub utc_offset: f32,
    pub primary_prefix: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("failed to read prefix database: {0}")]
    Io(#[from] std::io::Error),
    #[error("prefix database contains no entities")]
    Empty,
}

const PORTABLE_SUFFIXES: &[&str] = &["/QRP", "/MM", "/AM", "/P", "/M"];

#[derive(Debug, Default)]
pub struct PrefixIndex {
    entities: Vec<Entity>,
    prefixes: HashMap<String, usize>,
    exact: HashMap<String, usize>,
}

impl PrefixIndex {
    /// Loads and parses a database file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResolverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let index = Self::parse(&text)?;
        info!(
            "🌍 [PrefixIndex] Loaded {} entities, {} prefixes, {} exact calls from {}",
            index.entities.len(),
            index.prefixes.len(),
            index.exact.len(),
            path.display()
        );
        Ok(index)
    }

    /// Parses database text. Malformed blocks are skipped.
    pub fn parse(text: &str) -> Result<Self, ResolverError> {
        let mut index = PrefixIndex::default();
        let mut header: Option<Entity> = None;
        let mut aliases = String::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // Header lines start in column 0, alias lines are indented.
            if !line.starts_with(char::is_whitespace) {
                if header.is_some() {
                    warn!("[PrefixIndex] Block without terminating ';' before '{}'", line.trim());
                    aliases.clear();
                }
                header = parse_header(line);
                if header.is_none() {
                    warn!("[PrefixIndex] Skipping malformed header: {}", line.trim());
                }
                continue;
            }

            if header.is_none() {
                continue;
            }
            aliases.push_str(line.trim());
            if aliases.ends_with(';') {
                if let Some(entity) = header.take() {
                    index.insert_block(entity, &aliases);
                }
                aliases.clear();
            }
        }

        if index.entities.is_empty() {
            return Err(ResolverError::Empty);
        }
        Ok(index)
    }

    fn insert_block(&mut self, entity: Entity, aliases: &str) {
        let idx = self.entities.len();
        self.prefixes.insert(entity.primary_prefix.clone(), idx);

        for raw in aliases.trim_end_matches(';').split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (is_exact, body) = match raw.strip_prefix('=') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let cleaned = strip_modifiers(body);
            if cleaned.is_empty() {
                continue;
            }
            if is_exact {
                self.exact.insert(cleaned, idx);
            } else {
                self.prefixes.insert(cleaned, idx);
            }
        }
        debug!("[PrefixIndex] Indexed entity {}", entity.name);
        self.entities.push(entity);
    }

    /// Resolves a station identifier. Never panics; `None` on no match.
    pub fn resolve(&self, station_id: &str) -> Option<&Entity> {
        let call = clean_identifier(station_id);
        if call.is_empty() || !call.is_ascii() {
            return None;
        }
        if let Some(&idx) = self.exact.get(&call) {
            return self.entities.get(idx);
        }
        (1..=call.len())
            .rev()
            .find_map(|len| self.prefixes.get(&call[..len]))
            .and_then(|&idx| self.entities.get(idx))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Uppercases, trims and strips known portable suffixes.
pub fn clean_identifier(raw: &str) -> String {
    let mut call = raw.trim().to_ascii_uppercase();
    loop {
        match PORTABLE_SUFFIXES.iter().find(|s| call.ends_with(*s)) {
            Some(suffix) => {
                let keep = call.len() - suffix.len();
                call.truncate(keep);
            }
            None => break,
        }
    }
    call
}

fn parse_header(line: &str) -> Option<Entity> {
    let fields: Vec<&str> = line.split(':').map(str::trim).collect();
    // Eight fields plus the empty remainder after the trailing ':'
    if fields.len() < 8 {
        return None;
    }
    let name = fields[0];
    if name.is_empty() {
        return None;
    }
    let primary = fields[7].trim_start_matches('*').to_ascii_uppercase();
    if primary.is_empty() {
        return None;
    }
    Some(Entity {
        name: name.to_string(),
        cq_zone: fields[1].parse().ok()?,
        itu_zone: fields[2].parse().ok()?,
        continent: fields[3].to_string(),
        latitude: fields[4].parse().ok()?,
        longitude: -fields[5].parse::<f64>().ok()?,
        utc_offset: fields[6].parse().ok()?,
        primary_prefix: primary,
    })
}

fn strip_modifiers(entry: &str) -> String {
    let mut out = String::with_capacity(entry.len());
    let mut closing: Option<char> = None;
    for c in entry.chars() {
        if let Some(end) = closing {
            if c == end {
                closing = None;
            }
            continue;
        }
        match c {
            '(' => closing = Some(')'),
            '[' => closing = Some(']'),
            '<' => closing = Some('>'),
            '{' => closing = Some('}'),
            '~' => closing = Some('~'),
            _ => out.push(c.to_ascii_uppercase()),
        }
    }
    out
}
