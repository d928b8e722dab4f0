//! # Google Sheets Export
//!
//! Appends one row per stored request to a spreadsheet. Authentication uses a
//! service account: a self-signed RS256 assertion is exchanged for an OAuth
//! access token, which is cached until shortly before it expires.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{CredentialsSource, SheetsConfig};
use crate::delivery::DeliveryChannel;
use crate::errors::DeliveryError;
use crate::export::record_row;
use crate::store::SubmissionRecord;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are refreshed before use
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service-account key file this exporter needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, DeliveryError> {
        serde_json::from_str(json)
            .map_err(|e| DeliveryError::Credentials(format!("malformed service account key: {e}")))
    }

    pub fn load(source: &CredentialsSource) -> Result<Self, DeliveryError> {
        match source {
            CredentialsSource::Inline(json) => Self::from_json(json),
            CredentialsSource::File(path) => {
                let json = fs::read_to_string(path).map_err(|e| {
                    DeliveryError::Credentials(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_json(&json)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Appends request rows to a Google spreadsheet
pub struct SheetsExporter {
    client: reqwest::Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    range: String,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl SheetsExporter {
    pub fn new(client: reqwest::Client, key: ServiceAccountKey, spreadsheet_id: String, range: String) -> Self {
        Self {
            client,
            key,
            spreadsheet_id,
            range,
            api_base: SHEETS_API_BASE.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Load the service-account key named by the configuration
    pub fn from_config(config: &SheetsConfig) -> Result<Self, DeliveryError> {
        let key = ServiceAccountKey::load(&config.credentials)?;
        info!(
            client_email = %key.client_email,
            spreadsheet_id = %config.spreadsheet_id,
            range = %config.range,
            "Spreadsheet export enabled"
        );
        Ok(Self::new(
            reqwest::Client::new(),
            key,
            config.spreadsheet_id.clone(),
            config.range.clone(),
        ))
    }

    /// Point the exporter at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn append_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}:append",
            self.api_base.trim_end_matches('/'),
            self.spreadsheet_id,
            self.range
        )
    }

    fn sign_assertion(&self) -> Result<String, DeliveryError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    async fn access_token(&self) -> Result<String, DeliveryError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        debug!("Requesting spreadsheet access token");
        let assertion = self.sign_assertion()?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Credentials(format!(
                "token exchange rejected ({status}): {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        let fresh = CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Append one row after the last filled row of the configured range
    pub async fn append_row(&self, row: Vec<String>) -> Result<(), DeliveryError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.append_url())
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .bearer_auth(token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Sheets {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for SheetsExporter {
    fn name(&self) -> &'static str {
        "google_sheets"
    }

    async fn deliver(&self, record: &SubmissionRecord) -> Result<(), DeliveryError> {
        self.append_row(record_row(record)).await
    }
}
