//! WU file-list retrieval.
//!
//! The file list is a WU-format XML document delivered inside a SOAP
//! envelope. The service double-encodes the embedded markup, so the raw
//! response needs an entity-unescape pass before anything downstream can
//! treat it as XML.

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::client::StoreClient;
use crate::error::QueryError;
use crate::soap::render_template;

impl StoreClient {
    /// Retrieves the file-list XML for a WU category.
    ///
    /// Substitutes `cookie`, `category_id`, and `ring` into the template,
    /// POSTs it to the WU client endpoint, and unescapes the doubly-encoded
    /// markup in the response. A non-success status yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidArgument`] when any input is empty,
    /// [`QueryError::Transport`] on network failure, and
    /// [`QueryError::Canceled`] on cancellation.
    #[instrument(skip_all, fields(category_id, ring))]
    pub async fn get_file_list_xml(
        &self,
        cookie: &str,
        category_id: &str,
        ring: &str,
        template: &str,
        token: &CancellationToken,
    ) -> Result<String, QueryError> {
        if cookie.trim().is_empty() {
            return Err(QueryError::missing("cookie"));
        }
        if category_id.trim().is_empty() {
            return Err(QueryError::missing("category_id"));
        }
        if ring.trim().is_empty() {
            return Err(QueryError::missing("ring"));
        }

        let body = render_template(
            template,
            &[("cookie", cookie), ("categoryId", category_id), ("ring", ring)],
        )?;
        let endpoint = self.endpoints.wu_client.clone();
        let response = self.post_soap("file-list", &endpoint, body, token).await?;
        Ok(unescape_wu_entities(&response))
    }
}

/// Undoes the upstream service's double-encoding of markup inside the SOAP
/// envelope: both `&lt;`/`&gt;` and their re-escaped `&amp;lt;`/`&amp;gt;`
/// forms become angle brackets.
fn unescape_wu_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;lt;", "<")
        .replace("&amp;gt;", ">")
}
