//! Catalog of media titles and the context builder that renders it for the
//! language model.
//!
//! The catalog is read-only for the lifetime of the process: two JSON lists
//! are loaded at startup, concatenated in fixed order (movies first, films
//! second) and never merged, sorted or deduplicated. [`context_block`] turns
//! the entries into one bounded text line each — the deterministic rendering
//! the prompt assembler embeds verbatim into the system instruction.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Ellipsis marker appended to descriptions cut at the cap.
const ELLIPSIS: &str = "...";

/// One media title record from the static reference data.
///
/// Optional fields stay optional through deserialization; the context builder
/// renders fixed placeholder tokens for them so every line carries the same
/// columns of meaning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogEntry {
    pub title: String,

    /// Original-language title, rendered in parentheses after the main one.
    #[serde(default, rename = "titleOriginal")]
    pub title_original: Option<String>,

    /// Media kind; absent in most cartoon records, hence the default.
    #[serde(default, rename = "type")]
    pub kind: MediaKind,

    #[serde(default)]
    pub year: Option<u32>,

    #[serde(default)]
    pub director: Option<String>,

    #[serde(default)]
    pub description: String,
}

/// What kind of media an entry is.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[serde(alias = "фільм")]
    Film,
    #[serde(alias = "серіал")]
    Series,
    #[default]
    #[serde(alias = "мультфільм")]
    Cartoon,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Film => "фільм",
            Self::Series => "серіал",
            Self::Cartoon => "мультфільм",
        })
    }
}

/// The process-wide, read-only catalog.
///
/// Constructed once at startup and injected into the request handler — never
/// ambient global state, so tests can run against synthetic catalogs.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Load and concatenate the two catalog source files, in that order.
    ///
    /// Any read or parse failure is fatal — a partial catalog is never served.
    pub fn load(movies_path: &Path, films_path: &Path) -> anyhow::Result<Self> {
        let movies = read_list(movies_path)?;
        let films = read_list(films_path)?;

        tracing::info!(
            movies = movies.len(),
            films = films.len(),
            "catalog loaded"
        );

        let mut entries = movies;
        entries.extend(films);
        Ok(Self { entries })
    }

    /// Build a catalog directly from entries (used by tests).
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_list(path: &Path) -> anyhow::Result<Vec<CatalogEntry>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing {} as a catalog list", path.display()))
}

/// Render the catalog as one bounded line per entry, newline-joined.
///
/// Line order equals entry order. Each line contributes a bounded amount of
/// text: the description is cut at `description_cap` characters with an
/// ellipsis marker appended iff it was cut. Missing optional fields render as
/// fixed placeholders (`невідомо` for director, `н/д` for year) rather than
/// being omitted. Pure and deterministic — identical input always yields a
/// byte-identical block.
pub fn context_block(entries: &[CatalogEntry], description_cap: usize) -> String {
    entries
        .iter()
        .map(|entry| render_line(entry, description_cap))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_line(entry: &CatalogEntry, description_cap: usize) -> String {
    let original = entry.title_original.as_deref().unwrap_or("");
    let year = entry
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "н/д".to_string());
    let director = entry.director.as_deref().unwrap_or("невідомо");

    format!(
        "• {} ({}) — {}, {}, реж. {}. {}",
        entry.title,
        original,
        entry.kind,
        year,
        director,
        truncate_description(&entry.description, description_cap),
    )
}

/// Cut a description at `cap` characters, appending the ellipsis marker only
/// when something was actually cut. Counts characters, not bytes — Cyrillic
/// descriptions must not be split mid-codepoint.
fn truncate_description(description: &str, cap: usize) -> String {
    let mut chars = description.chars();
    let head: String = chars.by_ref().take(cap).collect();
    if chars.next().is_some() {
        format!("{head}{ELLIPSIS}")
    } else {
        head
    }
}
