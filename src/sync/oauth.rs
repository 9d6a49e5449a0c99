//! Google OAuth for Drive access.
//!
//! Flow:
//! 1. Reuse the cached token (`paths.drive_token`) while it is valid
//! 2. Otherwise refresh it with the stored refresh token
//! 3. Otherwise run the device flow with the client secrets from
//!    `paths.drive_credentials`: the user opens the verification URL, enters
//!    the code and kdcli polls until a token is issued
//!
//! The cached token file is written with 0600 permissions on Unix.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::utils::atomic_write;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Google OAuth endpoints
const DEVICE_CODE_URL: &str = "https://oauth2.googleapis.com/device/code";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const DEVICE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth client identity from the Google Cloud console download.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Read a `credentials.json` with an `installed` or `web` section.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config(format!(
                "Drive credentials not found at {}. Download an OAuth client \
                 (Desktop app) from https://console.cloud.google.com/apis/credentials",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        Self::parse(&content).map_err(|e| {
            Error::config(format!("Invalid credentials file {}: {}", path.display(), e))
        })
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())
    }
}

/// Cached Drive token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= at,
            None => false,
        }
    }

    /// Whether the token was granted every scope in `wanted`.
    pub fn covers(&self, wanted: &[String]) -> bool {
        wanted.iter().all(|s| self.scopes.contains(s))
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        match serde_json::from_str(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Ignoring unreadable token file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes())?;

        // Restrict file permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::file(path, e))?;
        }
        Ok(())
    }
}

/// Response from the device code request
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    /// Code the user types into the browser
    pub user_code: String,
    pub verification_url: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Response from the token endpoint (success and error share the shape)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self, scopes: &[String], previous_refresh: Option<String>) -> Option<StoredToken> {
        let access_token = self.access_token?;
        Some(StoredToken {
            access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            token_type: self.token_type.unwrap_or_else(default_token_type),
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            scopes: scopes.to_vec(),
        })
    }

    fn error_message(&self) -> String {
        format!(
            "{} - {}",
            self.error.as_deref().unwrap_or("unknown_error"),
            self.error_description.as_deref().unwrap_or("no description")
        )
    }
}

/// Google OAuth client for a single set of scopes.
pub struct GoogleOAuth {
    client: Client,
    secrets: ClientSecrets,
    scopes: Vec<String>,
}

impl GoogleOAuth {
    pub fn new(secrets: ClientSecrets, scopes: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            secrets,
            scopes,
        }
    }

    /// Step 1: request a device code
    pub fn request_device_code(&self) -> Result<DeviceCode> {
        let scope = self.scopes.join(" ");
        let response = self
            .client
            .post(DEVICE_CODE_URL)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::storage(format!(
                "Google returned error {} for device code request: {}",
                status, body
            )));
        }
        Ok(response.json()?)
    }

    /// One poll of the token endpoint. `Ok(None)` while the user has not
    /// finished authorizing.
    pub fn poll_once(&self, device_code: &DeviceCode) -> Result<Option<StoredToken>> {
        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("device_code", device_code.device_code.as_str()),
                ("grant_type", DEVICE_GRANT),
            ])
            .send()?
            .json()?;

        if let Some(error) = response.error.as_deref() {
            return match error {
                "authorization_pending" | "slow_down" => Ok(None),
                "expired_token" => Err(Error::storage("Device code expired. Please try again.")),
                "access_denied" => Err(Error::storage("User denied authorization.")),
                _ => Err(Error::storage(format!(
                    "OAuth error: {}",
                    response.error_message()
                ))),
            };
        }
        Ok(response.into_token(&self.scopes, None))
    }

    /// Step 2: poll until authorized, the code expires, or the user denies.
    pub fn poll_for_token(&self, device_code: &DeviceCode) -> Result<StoredToken> {
        let start = Instant::now();
        let timeout = Duration::from_secs(device_code.expires_in);
        let interval = Duration::from_secs(device_code.interval.max(1));

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = loop {
            let elapsed = start.elapsed();
            if elapsed > timeout {
                break Err(Error::storage("Device code expired. Please try again."));
            }
            spinner.set_message(format!(
                "Waiting for browser authorization... ({}s left)",
                (timeout - elapsed).as_secs()
            ));

            match self.poll_once(device_code) {
                Ok(Some(token)) => break Ok(token),
                Ok(None) => std::thread::sleep(interval),
                Err(e) => break Err(e),
            }
        };

        spinner.finish_and_clear();
        result
    }

    /// Exchange a refresh token for a new access token.
    pub fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::storage("Token has no refresh token"))?;

        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()?
            .json()?;

        if response.error.is_some() {
            return Err(Error::storage(format!(
                "Token refresh failed: {}",
                response.error_message()
            )));
        }
        response
            .into_token(&self.scopes, token.refresh_token.clone())
            .ok_or_else(|| Error::storage("Token refresh returned no access token"))
    }
}

/// A valid Drive token: cached, refreshed, or freshly authorized.
///
/// `on_device_code` is called before polling when interactive authorization
/// is needed, so the caller can show the code and open the browser.
pub fn authorize(
    settings: &Settings,
    on_device_code: impl FnOnce(&DeviceCode),
) -> Result<StoredToken> {
    let token_path = settings.get_path("paths.drive_token")?;
    let scopes = settings.drive_scopes();

    let cached = StoredToken::load(&token_path)?.filter(|t| t.covers(&scopes));
    if let Some(token) = &cached {
        if !token.is_expired(Utc::now()) {
            debug!("Using cached Drive token from {}", token_path.display());
            return Ok(token.clone());
        }
    }

    let secrets = ClientSecrets::load(&settings.credentials_path("drive")?)?;
    let oauth = GoogleOAuth::new(secrets, scopes);

    if let Some(token) = cached.filter(|t| t.refresh_token.is_some()) {
        match oauth.refresh(&token) {
            Ok(fresh) => {
                fresh.save(&token_path)?;
                info!("Refreshed Drive token");
                return Ok(fresh);
            }
            Err(e) => warn!("Token refresh failed, re-authorizing: {}", e),
        }
    }

    let device_code = oauth.request_device_code()?;
    on_device_code(&device_code);
    let token = oauth.poll_for_token(&device_code)?;
    token.save(&token_path)?;
    info!("Saved Drive token to {}", token_path.display());
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_client_secrets_sections() {
        let installed = ClientSecrets::parse(
            r#"{"installed": {"client_id": "abc.apps", "client_secret": "s3"}}"#,
        )
        .unwrap();
        assert_eq!(installed.client_id, "abc.apps");

        let web = ClientSecrets::parse(r#"{"web": {"client_id": "web-id"}}"#).unwrap();
        assert_eq!(web.client_id, "web-id");
        assert_eq!(web.client_secret, "");

        assert!(ClientSecrets::parse(r#"{"other": {}}"#).is_err());
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let temp = TempDir::new().unwrap();
        let err = ClientSecrets::load(&temp.path().join("credentials.json")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_token_expiry_uses_skew() {
        let now = Utc::now();
        let mut token = StoredToken {
            access_token: "t".into(),
            refresh_token: None,
            token_type: "Bearer".into(),
            expires_at: Some(now + ChronoDuration::seconds(30)),
            scopes: vec![],
        };
        assert!(token.is_expired(now));

        token.expires_at = Some(now + ChronoDuration::hours(1));
        assert!(!token.is_expired(now));

        token.expires_at = None;
        assert!(!token.is_expired(now));
    }

    #[test]
    fn test_token_round_trip_and_permissions() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("token.json");
        let token = StoredToken {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            token_type: "Bearer".into(),
            expires_at: None,
            scopes: vec!["https://www.googleapis.com/auth/drive.file".into()],
        };
        token.save(&path)?;
        assert_eq!(StoredToken::load(&path)?, Some(token.clone()));
        assert!(token.covers(&["https://www.googleapis.com/auth/drive.file".to_string()]));
        assert!(!token.covers(&["https://www.googleapis.com/auth/drive".to_string()]));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path)?.permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        Ok(())
    }

    #[test]
    fn test_unreadable_token_is_ignored() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("token.json");
        fs::write(&path, "not json")?;
        assert_eq!(StoredToken::load(&path)?, None);
        Ok(())
    }
}
