// src/client.rs

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use serde_json::Value;

use crate::config::ParseConfiguration;
use crate::error::ParseError;
use crate::transport::{OperationKind, RestCommand, Transport};
use crate::ParseCloud;

/// A reqwest-backed [`Transport`] for a Parse Server instance.
///
/// `ParseClient` handles the configuration of server connection details (URL, Application ID, API keys)
/// and turns the SDK's [`RestCommand`]s into authenticated HTTP requests.
///
/// ```rust,no_run
/// use parse_graph::Parse;
/// # use parse_graph::ParseError;
///
/// # fn main() -> Result<(), ParseError> {
/// let client = Parse::new(
///     "http://localhost:1338/parse",
///     "myAppId",
///     None,               // javascript_key
///     None,               // rest_api_key
///     Some("myMasterKey"),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ParseClient {
    pub server_url: String,
    pub(crate) app_id: String,
    pub(crate) javascript_key: Option<String>,
    pub(crate) rest_api_key: Option<String>,
    pub(crate) master_key: Option<String>,
    pub(crate) http_client: Client,
    pub(crate) session_token: Option<String>,
}

impl ParseClient {
    /// Creates a new `ParseClient` instance.
    ///
    /// # Key Precedence for Default Headers
    /// 1. Master Key (if provided at initialization)
    /// 2. JavaScript Key (if provided and Master Key is not)
    /// 3. REST API Key (if provided and neither Master Key nor JavaScript Key are)
    ///
    /// A session token, once set, takes precedence over these default keys.
    pub fn new(
        server_url: &str,
        app_id: &str,
        javascript_key: Option<&str>,
        rest_api_key: Option<&str>,
        master_key: Option<&str>,
    ) -> Result<Self, ParseError> {
        let mut temp_url_string = server_url.to_string();

        // Ensure scheme is present
        if !temp_url_string.starts_with("http://") && !temp_url_string.starts_with("https://") {
            temp_url_string = format!("http://{}", temp_url_string);
        }

        let parsed_server_url = Url::parse(&temp_url_string)?;

        if parsed_server_url.cannot_be_a_base() {
            return Err(ParseError::SdkError(format!(
                "The server_url '{}' resolved to '{}', which cannot be a base URL. Please provide a full base URL (e.g., http://localhost:1337/parse).",
                server_url, parsed_server_url
            )));
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            "X-Parse-Application-Id",
            HeaderValue::from_str(app_id).map_err(ParseError::InvalidHeaderValue)?,
        );

        if let Some(mk_str) = master_key {
            default_headers.insert(
                "X-Parse-Master-Key",
                HeaderValue::from_str(mk_str).map_err(ParseError::InvalidHeaderValue)?,
            );
        } else if let Some(js_key_str) = javascript_key {
            default_headers.insert(
                "X-Parse-Javascript-Key",
                HeaderValue::from_str(js_key_str).map_err(ParseError::InvalidHeaderValue)?,
            );
        } else if let Some(rk_str) = rest_api_key {
            default_headers.insert(
                "X-Parse-REST-API-Key",
                HeaderValue::from_str(rk_str).map_err(ParseError::InvalidHeaderValue)?,
            );
        }

        let http_client = Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(ParseError::ReqwestError)?;

        let mut final_server_url = parsed_server_url.as_str().trim_end_matches('/').to_string();

        // If the URL ends with /parse, strip it to get the true base server URL.
        if final_server_url.ends_with("/parse") {
            final_server_url.truncate(final_server_url.len() - "/parse".len());
        }
        if final_server_url.is_empty() {
            return Err(ParseError::SdkError(
                "Server URL became empty after stripping /parse.".to_string(),
            ));
        }

        log::debug!(
            "ParseClient initialized with base server_url: {}",
            final_server_url
        );

        Ok(Self {
            server_url: final_server_url,
            app_id: app_id.to_string(),
            javascript_key: javascript_key.map(|s| s.to_string()),
            rest_api_key: rest_api_key.map(|s| s.to_string()),
            master_key: master_key.map(|s| s.to_string()),
            http_client,
            session_token: None,
        })
    }

    /// Builds a client from a [`ParseConfiguration`].
    pub fn from_config(config: &ParseConfiguration) -> Result<Self, ParseError> {
        ParseClient::new(
            &config.server_url,
            &config.app_id,
            config.javascript_key.as_deref(),
            config.rest_api_key.as_deref(),
            config.master_key.as_deref(),
        )
    }

    /// Sets or clears the session token used for subsequent requests.
    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    /// Returns the current session token, if one is set on the client.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_token.is_some()
    }

    /// Returns a `ParseCloud` handle for calling Parse Cloud Code functions.
    pub fn cloud(&self) -> ParseCloud<'_, Self> {
        ParseCloud::new(self)
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ParseError> {
        let base_url = Url::parse(&self.server_url).map_err(|e| {
            ParseError::InvalidUrl(format!(
                "Base server URL '{}' is invalid: {}",
                self.server_url, e
            ))
        })?;

        // Trim any leading slashes from the endpoint to avoid "/parse//classes".
        let api_path = format!("/parse/{}", endpoint.trim_start_matches('/'));

        base_url.join(&api_path).map_err(|e| {
            ParseError::InvalidUrl(format!(
                "Failed to join base URL '{}' with API path '{}': {}",
                base_url, api_path, e
            ))
        })
    }

    fn auth_headers(&self, use_master_key: bool) -> Result<HeaderMap, ParseError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.session_token {
            headers.insert(
                "X-Parse-Session-Token",
                HeaderValue::from_str(token).map_err(ParseError::InvalidHeaderValue)?,
            );
        } else if use_master_key {
            // Only add Master Key if no session token is being used for this request
            if let Some(master_key) = &self.master_key {
                headers.insert(
                    "X-Parse-Master-Key",
                    HeaderValue::from_str(master_key).map_err(ParseError::InvalidHeaderValue)?,
                );
            } else {
                log::warn!("Master key requested for operation but not configured for the client.");
                return Err(ParseError::MasterKeyRequired(
                    "Master key is required for this operation but not configured on the client."
                        .to_string(),
                ));
            }
        } else if let Some(js_key) = &self.javascript_key {
            headers.insert(
                "X-Parse-Javascript-Key",
                HeaderValue::from_str(js_key).map_err(ParseError::InvalidHeaderValue)?,
            );
        } else if let Some(rest_key) = &self.rest_api_key {
            headers.insert(
                "X-Parse-REST-API-Key",
                HeaderValue::from_str(rest_key).map_err(ParseError::InvalidHeaderValue)?,
            );
        }
        Ok(headers)
    }

    // Central request method; the body is already-encoded JSON (or raw file bytes).
    pub(crate) async fn _request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(String, String)],
        body: Option<(Vec<u8>, &str)>,
        use_master_key: bool,
    ) -> Result<Vec<u8>, ParseError> {
        let mut full_url = self.endpoint_url(endpoint)?;
        for (key, value) in params {
            full_url.query_pairs_mut().append_pair(key, value);
        }

        log::debug!(
            "Preparing request: Method={}, URL={}, UseMasterKey={}",
            method,
            full_url.as_str(),
            use_master_key
        );

        let mut headers = self.auth_headers(use_master_key)?;
        let mut request_builder = self.http_client.request(method, full_url.clone());

        if let Some((body_bytes, content_type)) = body {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_str(content_type).map_err(ParseError::InvalidHeaderValue)?,
            );
            if log::log_enabled!(log::Level::Debug) && content_type == "application/json" {
                log::debug!("Request body: {}", String::from_utf8_lossy(&body_bytes));
            }
            request_builder = request_builder.body(body_bytes);
        }

        let response = request_builder
            .headers(headers)
            .send()
            .await
            .map_err(ParseError::ReqwestError)?;

        let status = response.status();
        if status.is_success() {
            // 204 No Content is treated as an empty JSON object.
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(b"{}".to_vec());
            }
            let body_bytes = response.bytes().await.map_err(ParseError::ReqwestError)?;
            log::debug!(
                "Request successful. Response body: {}",
                String::from_utf8_lossy(&body_bytes)
            );
            Ok(body_bytes.to_vec())
        } else {
            let error_body_bytes = response.bytes().await.map_err(ParseError::ReqwestError)?;
            let error_body_str = String::from_utf8_lossy(&error_body_bytes).to_string();
            log::warn!(
                "Request to {} failed with status {}. Response body: {}",
                full_url,
                status,
                error_body_str
            );
            match serde_json::from_slice::<Value>(&error_body_bytes) {
                Ok(json_value) => Err(ParseError::from_response(status.as_u16(), json_value)),
                Err(_) => {
                    let fallback_json = serde_json::json!({
                        "code": status.as_u16(),
                        "error": error_body_str
                    });
                    Err(ParseError::from_response(status.as_u16(), fallback_json))
                }
            }
        }
    }
}

#[async_trait]
impl Transport for ParseClient {
    async fn execute(&self, command: RestCommand) -> Result<Vec<u8>, ParseError> {
        match command {
            RestCommand::Find { class_name, params } => {
                let endpoint = format!("classes/{}", class_name);
                self._request(Method::GET, &endpoint, &params, None, false)
                    .await
            }
            RestCommand::Fetch {
                class_name,
                object_id,
            } => {
                let endpoint = format!("classes/{}/{}", class_name, object_id);
                self._request(Method::GET, &endpoint, &[], None, false).await
            }
            RestCommand::Write {
                kind,
                class_name,
                object_id,
                body,
            } => {
                // Objects without an id, and creates with a custom id, are POSTed to the class.
                let (method, endpoint) = match (kind, object_id) {
                    (OperationKind::Create, _) | (_, None) => {
                        (Method::POST, format!("classes/{}", class_name))
                    }
                    (_, Some(id)) => (Method::PUT, format!("classes/{}/{}", class_name, id)),
                };
                self._request(
                    method,
                    &endpoint,
                    &[],
                    Some((body, "application/json")),
                    false,
                )
                .await
            }
            RestCommand::Delete {
                class_name,
                object_id,
            } => {
                let endpoint = format!("classes/{}/{}", class_name, object_id);
                self._request(Method::DELETE, &endpoint, &[], None, false)
                    .await
            }
            RestCommand::RunFunction { name, body } => {
                let endpoint = format!("functions/{}", name);
                self._request(
                    Method::POST,
                    &endpoint,
                    &[],
                    Some((body, "application/json")),
                    false,
                )
                .await
            }
            RestCommand::UploadFile {
                name,
                mime_type,
                data,
            } => {
                // File uploads need the master key unless a user session is active.
                let endpoint = format!("files/{}", name);
                let use_master_key = self.session_token.is_none() && self.master_key.is_some();
                self._request(
                    Method::POST,
                    &endpoint,
                    &[],
                    Some((data, mime_type.as_str())),
                    use_master_key,
                )
                .await
            }
        }
    }
}
