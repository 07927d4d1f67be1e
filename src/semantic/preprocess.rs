//! Text preparation for embedding generation.

/// Separator placed between title and description.
const SEPARATOR: &str = ". ";

/// Build the text an item is embedded from: `"<title>. <description>"`.
///
/// A missing description leaves the separator in place (`"Red Umbrella. "`)
/// so that the embedded text depends only on the stored fields.
pub fn embedding_text(title: &str, description: Option<&str>) -> String {
    format!("{}{}{}", title, SEPARATOR, description.unwrap_or_default())
}
