//! SOAP template rendering and transport.
//!
//! Every WU protocol step builds its request body by substituting values
//! into a collaborator-supplied template and POSTing the result with the
//! fixed `application/soap+xml` content type. Templates may use positional
//! (`{1}`, `{2}`, ...) or named (`{cookie}`, `{ring}`, ...) placeholders;
//! both styles are replaced for every value so either template flavor works.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{StoreClient, cancellable};
use crate::error::QueryError;

/// Content type required by the WU SOAP endpoints.
const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Renders a SOAP body from a template and substitution values.
///
/// Each `(name, value)` pair replaces every occurrence of its named
/// placeholder `{name}` and of the positional placeholder `{i}` for its
/// 1-based position. A template without placeholders is returned unchanged.
///
/// # Errors
///
/// Returns [`QueryError::InvalidArgument`] when the template is empty.
pub fn render_template(
    template: &str,
    substitutions: &[(&str, &str)],
) -> Result<String, QueryError> {
    if template.trim().is_empty() {
        return Err(QueryError::missing("template"));
    }

    let mut body = template.to_string();
    for (position, (name, value)) in substitutions.iter().enumerate() {
        body = body
            .replace(&format!("{{{}}}", position + 1), value)
            .replace(&format!("{{{name}}}"), value);
    }
    Ok(body)
}

impl StoreClient {
    /// POSTs a rendered SOAP body to `endpoint`.
    ///
    /// Returns the response body on success and an empty string on a
    /// non-success HTTP status; none of the protocol steps needs to tell
    /// "empty" from "not found".
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Transport`] on network failure and
    /// [`QueryError::Canceled`] when `token` fires mid-flight.
    pub(crate) async fn post_soap(
        &self,
        step: &'static str,
        endpoint: &str,
        body: String,
        token: &CancellationToken,
    ) -> Result<String, QueryError> {
        let request = self
            .http
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(body);

        let response = cancellable(token, request.send())
            .await?
            .map_err(|source| QueryError::transport(step, source))?;

        let status = response.status();
        if !status.is_success() {
            debug!(step, status = status.as_u16(), "SOAP endpoint returned non-success");
            return Ok(String::new());
        }

        cancellable(token, response.text())
            .await?
            .map_err(|source| QueryError::transport(step, source))
    }
}
