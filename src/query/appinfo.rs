//! Product metadata lookup against the StoreEdgeFD catalog.
//!
//! Extracts display information and the WU category id for a product. The
//! category id is buried one level deep: `Payload.Skus[0].FulfillmentData`
//! is itself a JSON document serialized into a string field, and the id
//! lives inside that nested document.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::client::{StoreClient, cancellable};
use crate::error::QueryError;
use crate::model::AppInfo;

// ==================== Catalog Response Types ====================

/// Top-level products response.
#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(rename = "Payload")]
    payload: Option<ProductPayload>,
}

/// The `Payload` object of a products response.
#[derive(Debug, Deserialize)]
struct ProductPayload {
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "PublisherName")]
    publisher_name: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Skus")]
    skus: Option<Vec<ProductSku>>,
}

/// One SKU entry; `FulfillmentData` is a nested JSON document in string form.
#[derive(Debug, Deserialize)]
struct ProductSku {
    #[serde(rename = "FulfillmentData")]
    fulfillment_data: Option<String>,
}

/// The nested document inside `FulfillmentData`.
#[derive(Debug, Deserialize)]
struct FulfillmentData {
    #[serde(rename = "WuCategoryId")]
    wu_category_id: Option<String>,
}

impl StoreClient {
    /// Looks up display info and the WU category id for a product.
    ///
    /// Returns `(false, partial AppInfo)` when the catalog answers with a
    /// non-success status - the product is simply not found, which is not an
    /// error. Absence of `Skus`, of its first entry, or of the nested
    /// category field yields an empty `category_id`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidArgument`] when `product_id`, `market`,
    /// or `locale` is empty, [`QueryError::Transport`] on network failure,
    /// [`QueryError::Parse`] on malformed JSON, and
    /// [`QueryError::Canceled`] on cancellation.
    #[instrument(skip(self, token), fields(product_id, market, locale))]
    pub async fn get_app_info(
        &self,
        product_id: &str,
        market: &str,
        locale: &str,
        token: &CancellationToken,
    ) -> Result<(bool, AppInfo), QueryError> {
        if product_id.trim().is_empty() {
            return Err(QueryError::missing("product_id"));
        }
        if market.trim().is_empty() {
            return Err(QueryError::missing("market"));
        }
        if locale.trim().is_empty() {
            return Err(QueryError::missing("locale"));
        }

        let url = format!(
            "{}/v9.0/products/{product_id}?market={market}&locale={locale}&deviceFamily=Windows.Desktop",
            self.endpoints.store_edge
        );

        let response = cancellable(token, self.http.get(&url).send())
            .await?
            .map_err(|source| QueryError::transport("app-info", source))?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "product not found in catalog");
            return Ok((false, AppInfo::for_product(product_id)));
        }

        let body = cancellable(token, response.text())
            .await?
            .map_err(|source| QueryError::transport("app-info", source))?;

        let parsed: ProductResponse = serde_json::from_str(&body)
            .map_err(|err| QueryError::parse("app-info", err.to_string()))?;

        let mut info = AppInfo::for_product(product_id);
        if let Some(payload) = parsed.payload {
            info.name = payload.title.unwrap_or_default();
            info.publisher = payload.publisher_name.unwrap_or_default();
            info.description = payload.description.unwrap_or_default();
            info.category_id = extract_category_id(payload.skus.as_deref())?;
        }

        debug!(
            name = %info.name,
            has_category = !info.category_id.is_empty(),
            "product metadata resolved"
        );
        Ok((true, info))
    }
}

/// Pulls the WU category id out of the first SKU's nested fulfillment
/// document. Missing pieces yield an empty id; a malformed nested document
/// is a parse error.
fn extract_category_id(skus: Option<&[ProductSku]>) -> Result<String, QueryError> {
    let Some(fulfillment) = skus
        .and_then(<[ProductSku]>::first)
        .and_then(|sku| sku.fulfillment_data.as_deref())
        .filter(|raw| !raw.is_empty())
    else {
        return Ok(String::new());
    };

    let nested: FulfillmentData = serde_json::from_str(fulfillment)
        .map_err(|err| QueryError::parse("app-info", err.to_string()))?;
    Ok(nested.wu_category_id.unwrap_or_default())
}
