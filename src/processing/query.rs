//! Rendering of search rows into a single LLM context string.

use crate::search::SearchRow;

/// Separator placed between rendered rows.
pub const RESULT_SEPARATOR: &str = "\n------\n";

/// Neighbours requested by a vector query.
pub const DEFAULT_K_NEAREST_NEIGHBORS: usize = 5;

/// Render rows in backend order as `"{token}, source: {source}"`, or `"{token}"` when the row
/// has no source, joined by [`RESULT_SEPARATOR`].
pub fn format_search_results(rows: &[SearchRow]) -> String {
    rows.iter()
        .map(|row| match &row.source_document {
            Some(source) => format!("{}, source: {source}", row.token),
            None => row.token.clone(),
        })
        .collect::<Vec<_>>()
        .join(RESULT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(token: &str, source: Option<&str>) -> SearchRow {
        SearchRow {
            token: token.to_string(),
            source_document: source.map(str::to_string),
        }
    }

    #[test]
    fn rows_are_joined_in_backend_order() {
        let rows = [row("a", Some("a.txt")), row("b", Some("b.txt"))];
        assert_eq!(
            format_search_results(&rows),
            "a, source: a.txt\n------\nb, source: b.txt"
        );
    }

    #[test]
    fn sourceless_rows_render_token_only() {
        let rows = [row("b", None), row("a", Some("a.md"))];
        assert_eq!(format_search_results(&rows), "b\n------\na, source: a.md");
    }

    #[test]
    fn no_rows_render_empty_context() {
        assert_eq!(format_search_results(&[]), "");
    }
}
