// src/config.rs

use std::env;
use std::path::PathBuf;

use crate::storage::FileStore;
use crate::ParseError;

/// Connection and local storage settings for a Parse Server application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConfiguration {
    pub server_url: String,
    pub app_id: String,
    pub javascript_key: Option<String>,
    pub rest_api_key: Option<String>,
    pub master_key: Option<String>,
    /// Directory for the offline object cache and pending-operation ledger.
    pub offline_dir: Option<PathBuf>,
}

impl ParseConfiguration {
    pub fn new(server_url: &str, app_id: &str) -> Self {
        ParseConfiguration {
            server_url: server_url.to_string(),
            app_id: app_id.to_string(),
            javascript_key: None,
            rest_api_key: None,
            master_key: None,
            offline_dir: None,
        }
    }

    /// Reads the configuration from `PARSE_*` environment variables, loading a
    /// `.env` file first if one is present.
    ///
    /// `PARSE_SERVER_URL` and `PARSE_APP_ID` are required; `PARSE_JAVASCRIPT_KEY`,
    /// `PARSE_REST_API_KEY`, `PARSE_MASTER_KEY` and `PARSE_OFFLINE_DIR` are optional.
    pub fn from_env() -> Result<Self, ParseError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ParseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| {
                ParseError::InvalidInput(format!("{} must be set in the environment", key))
            })
        };
        Ok(ParseConfiguration {
            server_url: required("PARSE_SERVER_URL")?,
            app_id: required("PARSE_APP_ID")?,
            javascript_key: optional("PARSE_JAVASCRIPT_KEY"),
            rest_api_key: optional("PARSE_REST_API_KEY"),
            master_key: optional("PARSE_MASTER_KEY"),
            offline_dir: optional("PARSE_OFFLINE_DIR").map(PathBuf::from),
        })
    }

    pub fn with_javascript_key(mut self, key: &str) -> Self {
        self.javascript_key = Some(key.to_string());
        self
    }

    pub fn with_rest_api_key(mut self, key: &str) -> Self {
        self.rest_api_key = Some(key.to_string());
        self
    }

    pub fn with_master_key(mut self, key: &str) -> Self {
        self.master_key = Some(key.to_string());
        self
    }

    pub fn with_offline_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.offline_dir = Some(dir.into());
        self
    }

    /// Opens the file store under `offline_dir`, or `None` if offline storage is not configured.
    pub async fn file_store(&self) -> Result<Option<FileStore>, ParseError> {
        match &self.offline_dir {
            Some(dir) => FileStore::open(dir.clone()).await.map(Some),
            None => Ok(None),
        }
    }
}
