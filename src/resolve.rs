//! High-level orchestration of a full resolution request.
//!
//! Chains the protocol steps for one product: metadata lookup, then the
//! WU cookie / file-list / Appx correlation path for packaged apps, plus
//! the package-manifest path for non-packaged installers. Individual step
//! failures degrade the outcome (recorded as error strings, dependent steps
//! skipped) instead of aborting it; cancellation always aborts.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::client::StoreClient;
use crate::error::QueryError;
use crate::model::{AppInfo, DownloadItem, Templates};

/// A full resolution request.
///
/// `product_input` accepts a bare product id or a storefront URL; see
/// [`parse_product_input`]. The remaining fields default to the retail
/// US/English storefront.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Product id or storefront URL.
    pub product_input: String,
    /// Storefront market, e.g. `US`.
    pub market: String,
    /// Display locale, e.g. `en-US`.
    pub locale: String,
    /// WU release ring, e.g. `Retail`, `RP`, `WIF`.
    pub ring: String,
    /// Resolve packaged (APPX/MSIX) artifacts.
    pub include_appx: bool,
    /// Resolve non-packaged (EXE/MSI/MSIX installer) artifacts.
    pub include_non_appx: bool,
}

impl ResolveRequest {
    /// Creates a request for `product_input` with default storefront
    /// settings.
    pub fn new(product_input: impl Into<String>) -> Self {
        Self {
            product_input: product_input.into(),
            ..Self::default()
        }
    }
}

impl Default for ResolveRequest {
    fn default() -> Self {
        Self {
            product_input: String::new(),
            market: "US".to_string(),
            locale: "en-US".to_string(),
            ring: "Retail".to_string(),
            include_appx: true,
            include_non_appx: true,
        }
    }
}

/// The outcome of one resolution request.
///
/// Package lists are unordered sets; `errors` carries human-readable notes
/// for every step that degraded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveOutcome {
    /// The parsed product id the resolution ran for.
    pub product_id: String,
    /// Display information, when the catalog lookup produced any.
    pub app_info: Option<AppInfo>,
    /// Packaged artifacts from the WU path.
    pub appx_packages: Vec<DownloadItem>,
    /// Non-packaged installers from the manifest path.
    pub non_appx_packages: Vec<DownloadItem>,
    /// Notes for steps that failed or were skipped.
    pub errors: Vec<String>,
}

/// Extracts a product id from raw input.
///
/// Storefront URLs keep only the last path segment, and any query string is
/// dropped, so `https://apps.microsoft.com/detail/9WZDNCRFJBH4?hl=en-us`
/// becomes `9WZDNCRFJBH4`. Bare ids pass through unchanged.
#[must_use]
pub fn parse_product_input(input: &str) -> String {
    let mut result = input.trim();
    if result.is_empty() {
        return String::new();
    }
    if let Some(slash) = result.rfind('/') {
        result = &result[slash + 1..];
    }
    if let Some(question) = result.find('?') {
        result = &result[..question];
    }
    result.to_string()
}

/// True for product ids on the non-packaged distribution scheme.
///
/// Unpackaged products carry ids starting with `xp`; they have no WU
/// category, so the SOAP path never applies to them.
fn is_non_appx_id(product_id: &str) -> bool {
    product_id
        .get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("xp"))
}

/// Resolves every requested artifact kind for one product.
///
/// Products with an `xp` id go straight to the package-manifest path: the
/// manifest supplies both display info and installers, and the id is
/// reported uppercase. Everything else starts with the catalog lookup and
/// takes the WU path (plus a best-effort manifest probe).
///
/// Single-shot step failures (cookie, file list, catalog lookup) are
/// recorded in [`ResolveOutcome::errors`] and their dependent steps are
/// skipped, keeping partial results useful.
///
/// # Errors
///
/// Returns [`QueryError::InvalidArgument`] when the parsed product id is
/// empty and [`QueryError::Canceled`] when the token fires; all other step
/// errors degrade into the outcome.
#[instrument(skip(client, templates, token), fields(input = %request.product_input))]
pub async fn resolve_all(
    client: &StoreClient,
    templates: &Templates,
    request: &ResolveRequest,
    token: &CancellationToken,
) -> Result<ResolveOutcome, QueryError> {
    let product_id = parse_product_input(&request.product_input);
    if product_id.is_empty() {
        return Err(QueryError::missing("product_input"));
    }

    let mut outcome = ResolveOutcome {
        product_id: product_id.clone(),
        ..ResolveOutcome::default()
    };

    if is_non_appx_id(&product_id) {
        // Unpackaged products have no catalog entry and no WU category; the
        // package manifest is the sole source of display info and
        // installers. Ids are reported uppercase.
        outcome.product_id = product_id.to_ascii_uppercase();
        if request.include_non_appx {
            match client
                .get_non_appx_details(&product_id, &request.market, token)
                .await
            {
                Ok(Some(details)) => {
                    outcome.app_info = details.app_info;
                    outcome.non_appx_packages = details.packages;
                }
                Ok(None) => outcome.errors.push("non-Appx product not found".to_string()),
                Err(err) => degrade(err, &mut outcome.errors)?,
            }
        }
    } else {
        match client
            .get_app_info(&product_id, &request.market, &request.locale, token)
            .await
        {
            Ok((found, info)) => {
                if !found {
                    outcome.errors.push("product not found in catalog".to_string());
                }
                outcome.app_info = Some(info);
            }
            Err(err) => degrade(err, &mut outcome.errors)?,
        }

        if request.include_appx {
            let category_id = outcome
                .app_info
                .as_ref()
                .map(|info| info.category_id.clone())
                .unwrap_or_default();
            if category_id.is_empty() {
                outcome
                    .errors
                    .push("no WU category id; skipping packaged artifacts".to_string());
            } else {
                resolve_appx_path(client, templates, request, &category_id, &mut outcome, token)
                    .await?;
            }
        }

        if request.include_non_appx {
            match client
                .get_non_appx_packages(&product_id, &request.market, token)
                .await
            {
                Ok(items) => outcome.non_appx_packages = items,
                Err(err) => degrade(err, &mut outcome.errors)?,
            }
        }
    }

    info!(
        product_id = %outcome.product_id,
        appx = outcome.appx_packages.len(),
        non_appx = outcome.non_appx_packages.len(),
        degraded = outcome.errors.len(),
        "resolution complete"
    );
    Ok(outcome)
}

/// Runs cookie -> file list -> Appx correlation, skipping the remainder of
/// the chain as soon as one step degrades.
async fn resolve_appx_path(
    client: &StoreClient,
    templates: &Templates,
    request: &ResolveRequest,
    category_id: &str,
    outcome: &mut ResolveOutcome,
    token: &CancellationToken,
) -> Result<(), QueryError> {
    let cookie = match client.get_cookie(&templates.cookie, token).await {
        Ok(cookie) if !cookie.is_empty() => cookie,
        Ok(_) => {
            outcome
                .errors
                .push("cookie acquisition returned no data; skipping file list".to_string());
            return Ok(());
        }
        Err(err) => return degrade(err, &mut outcome.errors),
    };

    let file_list = match client
        .get_file_list_xml(&cookie, category_id, &request.ring, &templates.file_list, token)
        .await
    {
        Ok(xml) if !xml.is_empty() => xml,
        Ok(_) => {
            outcome
                .errors
                .push("file list retrieval returned no data".to_string());
            return Ok(());
        }
        Err(err) => return degrade(err, &mut outcome.errors),
    };

    match client
        .get_appx_packages(&file_list, &request.ring, &templates.url, token)
        .await
    {
        Ok(items) => outcome.appx_packages = items,
        Err(err) => return degrade(err, &mut outcome.errors),
    }
    Ok(())
}

/// Records a step failure as a degradation note. Cancellation is never
/// degraded; it propagates so callers can tell it apart from "not found".
fn degrade(err: QueryError, errors: &mut Vec<String>) -> Result<(), QueryError> {
    if err.is_canceled() {
        return Err(err);
    }
    warn!(error = %err, "resolution step degraded");
    errors.push(err.to_string());
    Ok(())
}
