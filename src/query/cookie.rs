//! Anonymous device-identity cookie acquisition.
//!
//! The WU protocol requires an opaque encrypted blob, obtained by POSTing a
//! fixed SOAP body to the client endpoint. The interesting part of the
//! response is the text of its first `EncryptedData` element.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::client::StoreClient;
use crate::error::QueryError;
use crate::soap::render_template;

use super::descendant_named;

impl StoreClient {
    /// Obtains the WU cookie by sending the cookie SOAP template unmodified.
    ///
    /// Returns an empty string when the endpoint answers with a non-success
    /// status, an empty body, or a body without an `EncryptedData` element.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidArgument`] for an empty template,
    /// [`QueryError::Transport`] on network failure, [`QueryError::Parse`]
    /// when the response is not well-formed XML, and
    /// [`QueryError::Canceled`] on cancellation.
    #[instrument(skip_all)]
    pub async fn get_cookie(
        &self,
        template: &str,
        token: &CancellationToken,
    ) -> Result<String, QueryError> {
        // No substitutions; render only validates the template.
        let body = render_template(template, &[])?;
        let endpoint = self.endpoints.wu_client.clone();
        let response = self.post_soap("cookie", &endpoint, body, token).await?;
        if response.is_empty() {
            return Ok(String::new());
        }

        let doc = roxmltree::Document::parse(&response)
            .map_err(|err| QueryError::parse("cookie", err.to_string()))?;

        let cookie = descendant_named(doc.root(), "EncryptedData")
            .and_then(|node| node.text())
            .unwrap_or_default()
            .to_string();
        debug!(found = !cookie.is_empty(), "cookie handshake complete");
        Ok(cookie)
    }
}
