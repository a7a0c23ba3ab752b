//! Non-packaged installer resolution via the package-manifest API.
//!
//! Products distributed as plain EXE/MSI/MSIX installers publish a JSON
//! manifest instead of WU metadata. The manifest doubles as the catalog for
//! these products: its first version carries the display info
//! (`DefaultLocale`) alongside the installer list. Each installer is sized
//! with a HEAD request and named from its URL, concurrently.

use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use std::sync::{Arc, Mutex};

use crate::client::{StoreClient, cancellable};
use crate::error::QueryError;
use crate::format::format_bytes;
use crate::model::{AppInfo, DownloadItem};

/// Size shown when the HEAD request fails or reports no length.
const UNKNOWN_SIZE: &str = "Unknown";

// ==================== Manifest Response Types ====================

#[derive(Debug, Deserialize)]
struct ManifestResponse {
    #[serde(rename = "Data")]
    data: Option<ManifestData>,
}

#[derive(Debug, Deserialize)]
struct ManifestData {
    #[serde(rename = "PackageIdentifier")]
    package_identifier: Option<String>,
    #[serde(rename = "Versions")]
    versions: Option<Vec<ManifestVersion>>,
}

#[derive(Debug, Deserialize)]
struct ManifestVersion {
    #[serde(rename = "DefaultLocale")]
    default_locale: Option<ManifestLocale>,
    /// Lenient: a malformed or non-list `Installers` value means "no
    /// installers", not a failed lookup.
    #[serde(rename = "Installers", default, deserialize_with = "lenient_installers")]
    installers: Vec<ManifestInstaller>,
}

#[derive(Debug, Deserialize)]
struct ManifestLocale {
    #[serde(rename = "PackageName")]
    package_name: Option<String>,
    #[serde(rename = "Publisher")]
    publisher: Option<String>,
    #[serde(rename = "ShortDescription")]
    short_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestInstaller {
    #[serde(rename = "InstallerType")]
    installer_type: Option<String>,
    #[serde(rename = "InstallerUrl")]
    installer_url: Option<String>,
    #[serde(rename = "InstallerLocale")]
    installer_locale: Option<String>,
}

fn lenient_installers<'de, D>(deserializer: D) -> Result<Vec<ManifestInstaller>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Everything the package manifest yields for one product: display info
/// from the first version's `DefaultLocale`, plus its resolved installers.
#[derive(Debug, Clone, Default)]
pub struct ManifestDetails {
    /// Manifest-derived display info; `None` when the manifest exists but
    /// lists no versions.
    pub app_info: Option<AppInfo>,
    /// Resolved installers, unordered.
    pub packages: Vec<DownloadItem>,
}

fn manifest_app_info(
    package_identifier: Option<String>,
    requested_id: &str,
    locale: Option<&ManifestLocale>,
) -> AppInfo {
    AppInfo {
        name: locale
            .and_then(|locale| locale.package_name.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        publisher: locale
            .and_then(|locale| locale.publisher.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        description: locale
            .and_then(|locale| locale.short_description.clone())
            .unwrap_or_default(),
        // Unpackaged products carry no WU category.
        category_id: String::new(),
        product_id: package_identifier.unwrap_or_else(|| requested_id.to_ascii_uppercase()),
    }
}

impl StoreClient {
    /// Resolves the non-packaged installers of a product, discarding the
    /// manifest's display info. See [`StoreClient::get_non_appx_details`].
    ///
    /// # Errors
    ///
    /// Same as [`StoreClient::get_non_appx_details`].
    pub async fn get_non_appx_packages(
        &self,
        product_id: &str,
        market: &str,
        token: &CancellationToken,
    ) -> Result<Vec<DownloadItem>, QueryError> {
        Ok(self
            .get_non_appx_details(product_id, market, token)
            .await?
            .map(|details| details.packages)
            .unwrap_or_default())
    }

    /// Resolves the package manifest of a non-packaged product: display
    /// info from the first version's `DefaultLocale` and its installers.
    ///
    /// A non-success manifest response (or a manifest without `Data`)
    /// yields `None`. A manifest with no versions yields details with no
    /// `app_info` and no packages. A non-list `Installers` field means no
    /// installers. Installer sizing failures degrade to `"Unknown"`.
    /// Element order in `packages` is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidArgument`] when `product_id` or
    /// `market` is empty, [`QueryError::Transport`] when the manifest
    /// request itself fails, [`QueryError::Parse`] on malformed JSON, and
    /// [`QueryError::Canceled`] on cancellation.
    #[instrument(skip(self, token), fields(product_id, market))]
    pub async fn get_non_appx_details(
        &self,
        product_id: &str,
        market: &str,
        token: &CancellationToken,
    ) -> Result<Option<ManifestDetails>, QueryError> {
        if product_id.trim().is_empty() {
            return Err(QueryError::missing("product_id"));
        }
        if market.trim().is_empty() {
            return Err(QueryError::missing("market"));
        }

        let url = format!(
            "{}/v9.0/packageManifests/{product_id}?market={market}",
            self.endpoints.store_edge
        );

        let response = cancellable(token, self.http.get(&url).send())
            .await?
            .map_err(|source| QueryError::transport("package-manifest", source))?;

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "package manifest not found");
            return Ok(None);
        }

        let body = cancellable(token, response.text())
            .await?
            .map_err(|source| QueryError::transport("package-manifest", source))?;

        let manifest: ManifestResponse = serde_json::from_str(&body)
            .map_err(|err| QueryError::parse("package-manifest", err.to_string()))?;

        let Some(ManifestData { package_identifier, versions }) = manifest.data else {
            debug!("package manifest carries no data");
            return Ok(None);
        };
        let Some(version) = versions.and_then(|versions| versions.into_iter().next()) else {
            return Ok(Some(ManifestDetails::default()));
        };

        let app_info =
            manifest_app_info(package_identifier, product_id, version.default_locale.as_ref());
        let installers = version.installers;
        debug!(installer_count = installers.len(), "package manifest resolved");

        let results = Arc::new(Mutex::new(Vec::with_capacity(installers.len())));
        let mut handles = Vec::with_capacity(installers.len());

        for installer in installers {
            let Some(installer_url) = installer
                .installer_url
                .clone()
                .filter(|value| !value.is_empty())
            else {
                continue;
            };
            let client = self.clone();
            let token = token.clone();
            let results = Arc::clone(&results);

            handles.push(tokio::spawn(async move {
                let file_size = match client.head_content_length(&installer_url, &token).await {
                    Ok(Some(length)) => format_bytes(length),
                    Ok(None) => UNKNOWN_SIZE.to_string(),
                    Err(QueryError::Canceled) => return,
                    Err(err) => {
                        warn!(url = %installer_url, error = %err, "installer sizing failed");
                        UNKNOWN_SIZE.to_string()
                    }
                };

                let item = DownloadItem {
                    file_name: derive_installer_file_name(
                        &installer_url,
                        installer.installer_type.as_deref().unwrap_or_default(),
                        installer.installer_locale.as_deref().unwrap_or_default(),
                    ),
                    file_link: installer_url,
                    file_size,
                };
                if let Ok(mut guard) = results.lock() {
                    guard.push(item);
                }
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "installer task failed to join");
            }
        }

        if token.is_cancelled() {
            return Err(QueryError::Canceled);
        }

        let items = match Arc::try_unwrap(results) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner),
            Err(shared) => shared.lock().map(|guard| guard.clone()).unwrap_or_default(),
        };
        Ok(Some(ManifestDetails {
            app_info: Some(app_info),
            packages: items,
        }))
    }

    /// HEAD request returning the declared `Content-Length`, if any.
    async fn head_content_length(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Option<u64>, QueryError> {
        let response = cancellable(token, self.http.head(url).send())
            .await?
            .map_err(|source| QueryError::transport("installer-size", source))?;

        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok()))
    }
}

/// Derives a display file name for an installer.
///
/// Plain executables (`InstallerType` empty, or the URL ends in
/// `.exe`/`.msi` case-insensitively) use the URL's last path segment with
/// everything from the last dot dropped. Everything else keeps the segment
/// and appends the installer locale and type.
fn derive_installer_file_name(url: &str, installer_type: &str, locale: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url);
    let lowered = url.to_ascii_lowercase();
    let is_exe_or_msi = lowered.ends_with(".exe") || lowered.ends_with(".msi");

    if installer_type.is_empty() || is_exe_or_msi {
        match segment.rfind('.') {
            Some(dot) => segment[..dot].to_string(),
            None => segment.to_string(),
        }
    } else {
        format!("{segment} ({locale}).{installer_type}")
    }
}
