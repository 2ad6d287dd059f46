//! Google OAuth2 device flow and stored Drive credentials.
//!
//! The device authorization grant (RFC 8628) lets the server obtain a Drive
//! token without a browser on the host. Tokens are sealed with
//! [`TokenEncryptor`] before they are written to `oauth_tokens`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::db::oauth_repo::{self, OAuthTokenRow};
use crate::db::{now_timestamp, Database};
use crate::error::AuthError;
use crate::sanitize::truncate_body;
use crate::secrets::TokenEncryptor;

pub const GOOGLE_DEVICE_AUTH_URL: &str = "https://oauth2.googleapis.com/device/code";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Per-file Drive access: the app only sees files it created.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Account key of the Drive token row.
pub const DRIVE_ACCOUNT: &str = "google_drive";

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower bound on the device code lifetime used for the polling deadline.
const MIN_POLL_TTL_SECS: u64 = 5;

/// Refresh this many seconds before the access token actually expires.
const EXPIRY_BUFFER_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    /// Google names this `verification_url`; RFC 8628 says `verification_uri`.
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Outcome of a single token poll.
#[derive(Debug)]
pub enum PollOutcome {
    Pending,
    SlowDown,
    Authorized(TokenResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Authorized,
    Expired,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationStatusResponse {
    pub status: AuthorizationStatus,
    pub message: String,
}

fn create_http_client() -> Result<Client, AuthError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AuthError::OAuth2(format!("Failed to create HTTP client: {}", e)))
}

/// OAuth2 device flow client for Google.
pub struct DeviceFlowAuth {
    client: Client,
    device_auth_url: String,
    token_url: String,
}

impl DeviceFlowAuth {
    pub fn new() -> Result<Self, AuthError> {
        Self::with_urls(GOOGLE_DEVICE_AUTH_URL, GOOGLE_TOKEN_URL)
    }

    pub fn with_urls(
        device_auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            client: create_http_client()?,
            device_auth_url: device_auth_url.into(),
            token_url: token_url.into(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Step 1: request a device code and the user code to show.
    pub async fn request_device_code(
        &self,
        client_id: &str,
    ) -> Result<DeviceCodeResponse, AuthError> {
        info!("Requesting device code for scope {}", DRIVE_SCOPE);

        let params = [
            ("client_id", client_id),
            ("scope", DRIVE_SCOPE),
            ("access_type", "offline"),
        ];

        let response = self
            .client
            .post(&self.device_auth_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuth2(format!("Failed to request device code: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::OAuth2(format!(
                "Device code request failed ({}): {}",
                status,
                truncate_body(&body)
            )));
        }

        let device_code: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::OAuth2(format!("Failed to parse device code: {}", e)))?;

        info!(
            "Device code received. User code: {}, verification URL: {}",
            device_code.user_code, device_code.verification_uri
        );

        Ok(device_code)
    }

    /// Step 2, one attempt: asks the token endpoint whether the user has
    /// approved yet.
    pub async fn poll_token_once(
        &self,
        device_code: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<PollOutcome, AuthError> {
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("device_code", device_code),
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuth2(format!("Token request failed: {}", e)))?;

        if response.status().is_success() {
            let token: TokenResponse = response.json().await.map_err(|e| {
                AuthError::OAuth2(format!("Failed to parse token response: {}", e))
            })?;
            info!("Obtained Drive access token");
            return Ok(PollOutcome::Authorized(token));
        }

        let error: TokenErrorResponse = response
            .json()
            .await
            .map_err(|e| AuthError::OAuth2(format!("Failed to parse error response: {}", e)))?;

        match error.error.as_str() {
            "authorization_pending" => Ok(PollOutcome::Pending),
            "slow_down" => Ok(PollOutcome::SlowDown),
            "expired_token" => Err(AuthError::Expired),
            "access_denied" => Err(AuthError::Denied),
            _ => Err(AuthError::OAuth2(format!(
                "Token request error: {} - {}",
                error.error,
                error.error_description.unwrap_or_default()
            ))),
        }
    }

    /// Step 2: polls until the user authorizes, the code expires, or the
    /// server rejects the request.
    pub async fn poll_for_token(
        &self,
        device_code: &DeviceCodeResponse,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse, AuthError> {
        let ttl_secs = device_code.expires_in.max(MIN_POLL_TTL_SECS);
        let deadline = std::time::Instant::now() + Duration::from_secs(ttl_secs);

        let max_interval = Duration::from_secs(30);
        let mut interval = Duration::from_secs(device_code.interval).max(Duration::from_secs(1));

        info!("Polling for token authorization (expires in {}s)", ttl_secs);

        loop {
            if std::time::Instant::now() > deadline {
                return Err(AuthError::Expired);
            }

            tokio::time::sleep(interval).await;

            match self
                .poll_token_once(&device_code.device_code, client_id, client_secret)
                .await?
            {
                PollOutcome::Authorized(token) => return Ok(token),
                PollOutcome::Pending => debug!("Authorization pending, continuing to poll"),
                PollOutcome::SlowDown => {
                    // RFC 8628 section 3.5
                    interval = (interval + Duration::from_secs(5)).min(max_interval);
                    warn!("Server requested slow down, new interval: {:?}", interval);
                }
            }
        }
    }

    pub async fn refresh_access_token(
        &self,
        refresh_token: &SecretString,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse, AuthError> {
        info!("Refreshing Drive access token");

        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuth2(format!("Token refresh failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::OAuth2(format!(
                "Token refresh failed ({}): {}",
                status,
                truncate_body(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::OAuth2(format!("Failed to parse refresh response: {}", e)))
    }
}

/// Anything that can hand out a bearer token for Drive requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, AuthError>;
}

/// Drive credentials backed by the `oauth_tokens` table.
///
/// Returns the stored access token while it is fresh and refreshes it
/// through the token endpoint otherwise.
pub struct DriveTokenProvider {
    db: Database,
    encryptor: TokenEncryptor,
    auth: DeviceFlowAuth,
    client_id: SecretString,
    client_secret: SecretString,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl DriveTokenProvider {
    pub fn new(
        db: Database,
        encryptor: TokenEncryptor,
        auth: DeviceFlowAuth,
        client_id: SecretString,
        client_secret: SecretString,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            db,
            encryptor,
            auth,
            client_id,
            client_secret,
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn device_flow(&self) -> &DeviceFlowAuth {
        &self.auth
    }

    pub fn client_id(&self) -> &SecretString {
        &self.client_id
    }

    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    pub fn is_authorized(&self) -> Result<bool, AuthError> {
        Ok(oauth_repo::find(&self.db, DRIVE_ACCOUNT)?.is_some())
    }

    /// Encrypts and saves a token response. A response without a refresh
    /// token keeps the previously stored one.
    pub fn store_token(&self, token: &TokenResponse) -> Result<(), AuthError> {
        let now = now_timestamp();
        let expires_at = chrono::Utc::now()
            + chrono::Duration::seconds(token.expires_in.unwrap_or(3600).min(86_400) as i64);

        let refresh_token = token
            .refresh_token
            .as_deref()
            .map(|t| self.encryptor.encrypt(t))
            .transpose()?;

        oauth_repo::upsert(
            &self.db,
            &OAuthTokenRow {
                account: DRIVE_ACCOUNT.to_string(),
                provider: "google".to_string(),
                access_token: self.encryptor.encrypt(&token.access_token)?,
                refresh_token,
                expires_at: expires_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                created_at: now.clone(),
                updated_at: now,
            },
        )?;
        info!("Stored Drive credentials");
        Ok(())
    }

    /// Runs the whole device flow interactively: prints nothing itself,
    /// hands the device code to `on_code`, then waits for approval.
    pub async fn authorize_interactive<F>(&self, on_code: F) -> Result<(), AuthError>
    where
        F: FnOnce(&DeviceCodeResponse),
    {
        let code = self
            .auth
            .request_device_code(self.client_id.expose_secret())
            .await?;
        on_code(&code);
        let token = self
            .auth
            .poll_for_token(
                &code,
                self.client_id.expose_secret(),
                self.client_secret.expose_secret(),
            )
            .await?;
        self.store_token(&token)
    }

    pub fn revoke(&self) -> Result<(), AuthError> {
        oauth_repo::delete(&self.db, DRIVE_ACCOUNT)?;
        Ok(())
    }
}

#[async_trait]
impl AccessTokenSource for DriveTokenProvider {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        // One refresh at a time; late arrivals reread the fresh row.
        let _guard = self.refresh_lock.lock().await;

        let row = oauth_repo::find(&self.db, DRIVE_ACCOUNT)?
            .ok_or_else(|| AuthError::NotAuthorized(DRIVE_ACCOUNT.to_string()))?;

        if !row.is_expired(EXPIRY_BUFFER_SECS) {
            return Ok(SecretString::from(self.encryptor.decrypt(&row.access_token)?));
        }

        let Some(refresh_ciphertext) = row.refresh_token.as_deref() else {
            return Err(AuthError::NotAuthorized(format!(
                "{} token expired and cannot be refreshed",
                DRIVE_ACCOUNT
            )));
        };
        let refresh_token = SecretString::from(self.encryptor.decrypt(refresh_ciphertext)?);

        let token = self
            .auth
            .refresh_access_token(
                &refresh_token,
                self.client_id.expose_secret(),
                self.client_secret.expose_secret(),
            )
            .await?;
        self.store_token(&token)?;
        Ok(SecretString::from(token.access_token))
    }
}
