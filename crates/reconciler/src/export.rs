//! The `export` action: ask Dgraph to export the database as RDF.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// GraphQL mutation sent to the admin endpoint.
pub const EXPORT_MUTATION: &str =
    r#"mutation { export(input: {format: "rdf"}) { response { message code } } }"#;
/// Message Dgraph reports when the export finished.
pub const EXPORT_COMPLETED: &str = "Export completed.";
/// Action result reported on success.
pub const EXPORT_RESULT: &str = "database exported";

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ExportData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct ExportData {
    export: Option<ExportPayload>,
}

#[derive(Debug, Deserialize)]
struct ExportPayload {
    response: Option<ExportResponse>,
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Client for the admin export mutation.
#[derive(Debug, Clone)]
pub struct Exporter {
    http: reqwest::Client,
    admin_url: String,
}

impl Exporter {
    /// Create an exporter posting to `admin_url`.
    pub fn new(http: reqwest::Client, admin_url: impl Into<String>) -> Self {
        Self {
            http,
            admin_url: admin_url.into(),
        }
    }

    /// Run the export.
    ///
    /// Returns the action result on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Dgraph reports anything but
    /// a completed export.
    pub async fn export(&self) -> Result<&'static str> {
        info!(url = %self.admin_url, "Requesting export");

        let response = self
            .http
            .post(&self.admin_url)
            .json(&json!({ "query": EXPORT_MUTATION }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::export_failed(e.to_string()))?;

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| Error::export_failed(format!("invalid response: {e}")))?;

        if let Some(first) = body.errors.first() {
            return Err(Error::export_failed(first.message.clone()));
        }

        let reported = body
            .data
            .and_then(|d| d.export)
            .and_then(|e| e.response)
            .ok_or_else(|| Error::export_failed("response has no export result"))?;

        if reported.message == EXPORT_COMPLETED {
            info!(code = %reported.code, "Export completed");
            Ok(EXPORT_RESULT)
        } else {
            warn!(code = %reported.code, message = %reported.message, "Export not completed");
            Err(Error::export_failed(reported.message))
        }
    }
}
