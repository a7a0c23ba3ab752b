//! Data model for a single resolution request.
//!
//! All entities here live only for the duration of one resolution call;
//! nothing is persisted or shared across requests.

use serde::{Deserialize, Serialize};

/// Display information for a store product.
///
/// Produced once per resolution by the product metadata lookup and held by
/// the caller; immutable thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Product display title.
    pub name: String,
    /// Publisher display name.
    pub publisher: String,
    /// Product description.
    pub description: String,
    /// Windows Update category identifier; empty when the product has no
    /// packaged (Appx) fulfillment data.
    pub category_id: String,
    /// The store product identifier this record was resolved for.
    pub product_id: String,
}

impl AppInfo {
    /// Creates a partial record carrying only the product id, used when the
    /// catalog lookup does not find the product.
    pub fn for_product(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            ..Self::default()
        }
    }
}

/// One resolved installable artifact.
///
/// Never mutated after creation; collected into an unordered list
/// representing all packages found for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    /// Display file name (package moniker plus extension, or an
    /// installer-derived name).
    pub file_name: String,
    /// Download URL; empty when URL resolution for this artifact failed.
    pub file_link: String,
    /// Human-readable size, or `"Unknown"` when sizing failed.
    pub file_size: String,
}

/// The three collaborator-supplied SOAP body templates.
///
/// The surrounding system owns template storage and retrieval; the core only
/// requires each to be a non-empty string containing the placeholders it
/// substitutes.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    /// Cookie handshake body; sent unmodified.
    pub cookie: String,
    /// File-list request body; takes `{cookie}` / `{categoryId}` / `{ring}`
    /// (or `{1}` / `{2}` / `{3}`).
    pub file_list: String,
    /// Secured-URL request body; takes `{updateID}` / `{revisionNumber}` /
    /// `{ring}` (or `{1}` / `{2}` / `{3}`).
    pub url: String,
}
