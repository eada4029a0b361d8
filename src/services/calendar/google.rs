use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::CalendarProvider;
use crate::models::{Appointment, CLINIC_TIMEZONE};

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

pub enum TokenSource {
    /// Service-account JSON key; each access token is obtained by exchanging
    /// a freshly signed RS256 assertion.
    ServiceAccountFile(PathBuf),
    /// Pre-provisioned bearer token, used as-is.
    Static(String),
    /// Authorized-user JSON cached by a previous consent flow; refreshed and
    /// written back when the access token has expired.
    AuthorizedUserFile(PathBuf),
}

/// The fields of a service-account key file this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

fn assertion_claims(key: &ServiceAccountKey, now: DateTime<Utc>) -> AssertionClaims {
    let iat = now.timestamp();
    AssertionClaims {
        iss: key.client_email.clone(),
        scope: CALENDAR_SCOPE.to_string(),
        aud: key.token_uri().to_string(),
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    }
}

fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> anyhow::Result<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("invalid service account private key")?;
    jsonwebtoken::encode(&header, &assertion_claims(key, now), &encoding_key)
        .context("failed to sign service account assertion")
}

/// The `token.json` layout written by Google's installed-app OAuth helpers.
/// Also holds service-account access tokens in the provider's cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizedUserToken {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    /// The access token, if present and not about to expire. A token without
    /// an expiry is assumed valid.
    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        match self.expires_at() {
            Some(expiry) if expiry <= now + Duration::seconds(EXPIRY_MARGIN_SECS) => None,
            _ => Some(token),
        }
    }

    fn apply(&mut self, resp: RefreshResponse, now: DateTime<Utc>) {
        self.token = Some(resp.access_token);
        self.expiry = resp.expires_in.map(|secs| {
            (now + Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Micros, true)
        });
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
}

pub struct GoogleCalendarProvider {
    calendar_id: String,
    tokens: TokenSource,
    cached: Mutex<Option<AuthorizedUserToken>>,
    client: reqwest::Client,
}

impl GoogleCalendarProvider {
    pub fn new(
        calendar_id: String,
        tokens: TokenSource,
        timeout: StdDuration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build calendar HTTP client")?;

        Ok(Self {
            calendar_id,
            tokens,
            cached: Mutex::new(None),
            client,
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(access) = cached.as_ref().and_then(|t| t.valid_access_token(now)) {
            return Ok(access.to_string());
        }

        let fresh = match &self.tokens {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccountFile(path) => {
                let key = load_service_account(path).await?;
                tracing::info!(account = %key.client_email, "requesting Google access token");
                self.exchange_assertion(&key, now).await?
            }
            TokenSource::AuthorizedUserFile(path) => {
                let token = match cached.take() {
                    Some(token) => token,
                    None => load_token_file(path).await?,
                };
                if let Some(access) = token.valid_access_token(now) {
                    let access = access.to_string();
                    *cached = Some(token);
                    return Ok(access);
                }

                tracing::info!(path = %path.display(), "Google access token expired, refreshing");
                let refreshed = self.refresh(token, now).await?;
                if let Err(e) = save_token_file(path, &refreshed).await {
                    tracing::warn!(error = %e, "failed to persist refreshed Google token");
                }
                refreshed
            }
        };

        let access = fresh
            .token
            .clone()
            .context("token response carried no access token")?;
        *cached = Some(fresh);
        Ok(access)
    }

    async fn exchange_assertion(
        &self,
        key: &ServiceAccountKey,
        now: DateTime<Utc>,
    ) -> anyhow::Result<AuthorizedUserToken> {
        let assertion = sign_assertion(key, now)?;
        let resp = self
            .token_request(
                key.token_uri(),
                &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
            )
            .await?;

        let mut token = AuthorizedUserToken::default();
        token.apply(resp, now);
        Ok(token)
    }

    async fn refresh(
        &self,
        mut token: AuthorizedUserToken,
        now: DateTime<Utc>,
    ) -> anyhow::Result<AuthorizedUserToken> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            token.refresh_token.as_deref(),
            token.client_id.as_deref(),
            token.client_secret.as_deref(),
        ) else {
            anyhow::bail!("token file has no refresh credentials; re-run the Google authorization flow");
        };
        let token_uri = token.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);

        let resp = self
            .token_request(
                token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                ],
            )
            .await?;

        token.apply(resp, now);
        Ok(token)
    }

    async fn token_request(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> anyhow::Result<RefreshResponse> {
        self.client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .context("failed to call Google token endpoint")?
            .error_for_status()
            .context("Google token endpoint returned error")?
            .json()
            .await
            .context("failed to parse Google token response")
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn create_event(&self, appointment: &Appointment) -> anyhow::Result<String> {
        let access_token = self.access_token().await?;
        let url = events_url(&self.calendar_id)?;

        let resp = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&event_body(appointment))
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Google Calendar response")?;

        if !status.is_success() {
            anyhow::bail!("Google Calendar API error ({}): {}", status, data);
        }

        data["htmlLink"]
            .as_str()
            .or_else(|| data["id"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing event id in Google Calendar response"))
    }
}

fn events_url(calendar_id: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(CALENDAR_API).context("invalid calendar API URL")?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("calendar API URL cannot be a base"))?
        .extend(["calendars", calendar_id, "events"]);
    Ok(url)
}

fn event_body(appointment: &Appointment) -> serde_json::Value {
    json!({
        "summary": appointment.summary(),
        "description": appointment.description(),
        "start": {
            "dateTime": appointment.start.to_rfc3339(),
            "timeZone": CLINIC_TIMEZONE,
        },
        "end": {
            "dateTime": appointment.end().to_rfc3339(),
            "timeZone": CLINIC_TIMEZONE,
        },
    })
}

async fn load_service_account(path: &Path) -> anyhow::Result<ServiceAccountKey> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read service account file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse service account file {}", path.display()))
}

async fn load_token_file(path: &Path) -> anyhow::Result<AuthorizedUserToken> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read Google token file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse Google token file {}", path.display()))
}

async fn save_token_file(path: &Path, token: &AuthorizedUserToken) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(token)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write Google token file {}", path.display()))
}
