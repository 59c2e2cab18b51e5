//! Catalog lookup for notification text.

use crate::types::Catalog;

pub const UNKNOWN_APPSTORE: &str = "Unknown Appstore";

const URN_SEPARATOR: char = ':';

/// Splits an urn into `(app_id, catalog_slug)`.
///
/// Anything other than exactly one separator yields two empty strings.
pub fn split_urn(urn: &str) -> (&str, &str) {
    let mut parts = urn.split(URN_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(slug), None) => (id, slug),
        _ => ("", ""),
    }
}

/// Returns the catalog an app belongs to, or a placeholder when the
/// server does not list it.
pub fn resolve(urn: &str, catalogs: &[Catalog]) -> Catalog {
    let (_, slug) = split_urn(urn);
    catalogs
        .iter()
        .find(|c| c.slug == slug)
        .cloned()
        .unwrap_or_else(|| Catalog {
            slug: slug.to_string(),
            name: UNKNOWN_APPSTORE.to_string(),
            url: String::new(),
            enabled: true,
        })
}
