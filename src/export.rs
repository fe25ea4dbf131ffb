//! Encoders for the selected article bag.
//!
//! Every format lists each article once, in selection order:
//! - [`ExportFormat::Csv`] - one double-quoted title per line, `"` doubled
//! - [`ExportFormat::Txt`] - one bare title per line
//! - [`ExportFormat::Wikicode`] - `* [[Title]]` bullets with `|` escaped
//! - [`ExportFormat::Json`] - `[{"id": .., "title": ..}]`

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::selection::ArticleBag;

/// Errors raised while encoding an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The requested format name is not known.
    #[error("unknown export format '{0}'\n  Suggestion: Use one of csv, txt, wikicode, json")]
    UnknownFormat(String),

    /// JSON serialization failed.
    #[error("could not encode articles as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values, one quoted title per row.
    #[default]
    Csv,
    /// Plain text.
    Txt,
    /// MediaWiki bullet list of links.
    Wikicode,
    /// JSON array of `{id, title}` objects.
    Json,
}

impl ExportFormat {
    /// All formats, in display order.
    pub const ALL: [Self; 4] = [Self::Csv, Self::Txt, Self::Wikicode, Self::Json];

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Wikicode => "wikicode",
            Self::Json => "json",
        }
    }

    /// File extension for saved exports.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wikicode => "wiki",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name == "text" {
            return Ok(Self::Txt);
        }
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == name || format.extension() == name)
            .ok_or_else(|| ExportError::UnknownFormat(s.to_string()))
    }
}

/// Encodes `bag` in `format`. Non-empty text formats end with a newline.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if JSON serialization fails.
pub fn encode(bag: &ArticleBag, format: ExportFormat) -> Result<String, ExportError> {
    debug!(format = %format, articles = bag.len(), "encoding export");
    let encoded = match format {
        ExportFormat::Csv => lines(bag, csv_field),
        ExportFormat::Txt => lines(bag, str::to_string),
        ExportFormat::Wikicode => lines(bag, wikicode_item),
        ExportFormat::Json => {
            let mut json = serde_json::to_string_pretty(bag)?;
            json.push('\n');
            json
        }
    };
    Ok(encoded)
}

fn lines(bag: &ArticleBag, render: impl Fn(&str) -> String) -> String {
    bag.titles().fold(String::new(), |mut out, title| {
        out.push_str(&render(title));
        out.push('\n');
        out
    })
}

/// Quotes a CSV field, doubling embedded quotes.
#[must_use]
pub fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Renders a wikicode bullet link; `|` would start a link label, so it is
/// written as its HTML entity.
#[must_use]
pub fn wikicode_item(title: &str) -> String {
    format!("* [[{}]]", title.replace('|', "&#124;"))
}
