//! Indigo REST API client.
//!
//! Listings are fetched with one request, then each listed entity is
//! resolved with a request to its `restURL`. Detail requests are issued
//! lazily as the returned iterator is advanced, so a scrape never holds
//! more than one entity in flight.

use super::{Entities, EntitySource, SourceError};
use crate::entity::{CustomMapping, Device, RawValue, Variable};
use digest_auth::AuthContext;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const VARIABLES_PATH: &str = "/variables.json/";
const DEVICES_PATH: &str = "/devices.json/";

/// Remote source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Controller host name.
    pub hostname: String,
    /// Controller web server port.
    pub port: u16,
    /// Digest auth user name; auth is disabled when unset.
    pub username: Option<String>,
    /// Digest auth password.
    pub password: Option<String>,
    /// Request timeout in seconds; the HTTP client default applies when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".into(),
            port: 8176,
            username: None,
            password: None,
            timeout_secs: None,
        }
    }
}

/// Entry of a listing response.
#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(rename = "restURL")]
    rest_url: String,
}

/// Entity source backed by the controller's REST API.
pub struct RemoteSource {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl RemoteSource {
    /// Creates a client for the configured controller.
    pub fn new(config: &RemoteConfig) -> Result<Self, SourceError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let credentials = config.username.as_ref().map(|user| {
            (
                user.clone(),
                config.password.clone().unwrap_or_default(),
            )
        });

        Ok(Self {
            client: builder.build()?,
            base_url: format!("http://{}:{}", config.hostname, config.port),
            credentials,
        })
    }

    /// Returns the base URL of the controller.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches and decodes a JSON document.
    ///
    /// A non-success status is logged and the body is decoded anyway.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        tracing::debug!(path, "Retrieving API path");

        let url = self.url(path);
        let resp = self.send(&url)?;
        let status = resp.status();
        let body = resp.bytes()?;

        tracing::debug!(url = %url, bytes = body.len(), "Received response");

        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "HTTP {}", status);
        }

        serde_json::from_slice(&body).map_err(|source| SourceError::Json { url, source })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn send(&self, url: &str) -> Result<Response, SourceError> {
        let resp = self.client.get(url).send()?;

        let Some((user, password)) = &self.credentials else {
            return Ok(resp);
        };
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        let Some(challenge) = resp.headers().get(WWW_AUTHENTICATE) else {
            return Ok(resp);
        };

        tracing::debug!(user = %user, "Configuring digest auth");

        let challenge = challenge
            .to_str()
            .map_err(|e| SourceError::Auth(e.to_string()))?;
        let mut prompt =
            digest_auth::parse(challenge).map_err(|e| SourceError::Auth(e.to_string()))?;

        let uri = resp.url().clone();
        let request_uri = match uri.query() {
            Some(query) => format!("{}?{}", uri.path(), query),
            None => uri.path().to_owned(),
        };
        let context = AuthContext::new(user.as_str(), password.as_str(), request_uri.as_str());
        let answer = prompt
            .respond(&context)
            .map_err(|e| SourceError::Auth(e.to_string()))?;

        Ok(self
            .client
            .get(url)
            .header(AUTHORIZATION, answer.to_header_string())
            .send()?)
    }

    fn list<T>(&self, path: &str) -> Result<Entities<'_, T>, SourceError>
    where
        T: DeserializeOwned + 'static,
    {
        let entries: Vec<ListEntry> = self.get(path)?;
        tracing::debug!(path, count = entries.len(), "Listed entities");

        Ok(Box::new(
            entries.into_iter().map(move |entry| self.get::<T>(&entry.rest_url)),
        ))
    }
}

impl EntitySource for RemoteSource {
    fn variables(&self) -> Result<Entities<'_, Variable>, SourceError> {
        self.list(VARIABLES_PATH)
    }

    fn devices(&self) -> Result<Entities<'_, Device>, SourceError> {
        self.list(DEVICES_PATH)
    }

    fn custom_mappings(&self) -> Result<Entities<'_, CustomMapping>, SourceError> {
        // The REST API does not expose custom mappings.
        Ok(Box::new(std::iter::empty()))
    }

    fn device(&self, id: i64) -> Result<Device, SourceError> {
        for device in self.devices()? {
            match device {
                Ok(device) if device.id == id => return Ok(device),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Skipping unreadable device"),
            }
        }
        Err(SourceError::NotFound(id))
    }

    fn write_mapping_states(
        &self,
        _id: i64,
        _states: &[(&str, RawValue)],
    ) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("custom mapping state writeback"))
    }

    fn set_mapping_error(&self, _id: i64, _message: Option<String>) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("custom mapping error state"))
    }
}
