//! Display labels and category-title normalization.

/// Namespace used by MediaWiki for category pages.
pub const CATEGORY_NAMESPACE: i64 = 14;

/// Canonical category prefix accepted by every MediaWiki language edition.
pub const CATEGORY_PREFIX: &str = "Category:";

/// Strips a namespace prefix (everything up to and including the first `:`).
///
/// ```
/// use catexplorer_core::tree::strip_namespace;
///
/// assert_eq!(strip_namespace("Category:Birds"), "Birds");
/// assert_eq!(strip_namespace("Birds"), "Birds");
/// assert_eq!(strip_namespace("Kategorie:Vögel: Europa"), "Vögel: Europa");
/// ```
#[must_use]
pub fn strip_namespace(title: &str) -> &str {
    title.split_once(':').map_or(title, |(_, rest)| rest)
}

/// Human-readable title: namespace removed, underscores as spaces.
#[must_use]
pub fn display_title(title: &str) -> String {
    strip_namespace(title).replace('_', " ")
}

/// Builds the node label with its declared counts, e.g. `Birds (3 C, 5 P)`.
#[must_use]
pub fn category_label(title: &str, subcat_count: u64, page_count: u64) -> String {
    format!(
        "{} ({subcat_count} C, {page_count} P)",
        strip_namespace(title)
    )
}

/// Extracts a category title from user input.
///
/// Accepts a bare title (`Birds of Europe`), a prefixed title
/// (`Category:Birds_of_Europe`) or a wiki page URL
/// (`https://en.wikipedia.org/wiki/Category:Birds%20of%20Europe`).
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn normalize_category_input(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let raw_title = match url::Url::parse(trimmed) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            let from_query = parsed
                .query_pairs()
                .find(|(key, _)| key == "title")
                .map(|(_, value)| value.into_owned());
            match from_query {
                Some(title) => title,
                None => {
                    let last = parsed.path_segments()?.next_back()?.to_string();
                    urlencoding::decode(&last).ok()?.into_owned()
                }
            }
        }
        _ => trimmed.to_string(),
    };

    let title = display_title(&raw_title).trim().to_string();
    if title.is_empty() { None } else { Some(title) }
}
