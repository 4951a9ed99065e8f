//! Authorization code flow and access token caching.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use log::{debug, info};
use reqwest::Method;

use crate::spotify::{
    error::{ProviderError, ProviderFailure},
    payload::TokenPayload,
    transport::{ApiRequest, Auth, Body, Transport},
};

pub const SCOPES: &[&str] = &[
    "user-read-email",
    "user-read-private",
    "user-library-read",
    "user-library-modify",
    "user-top-read",
    "user-read-recently-played",
    "playlist-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-follow-read",
    "user-follow-modify",
];

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Result of exchanging an authorization code.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub refresh_token: String,
    pub scope: Option<String>,
}

pub struct Authenticator {
    credentials: Credentials,
    accounts_url: String,
    refresh_token: Mutex<Option<String>>,
    access: Mutex<Option<AccessToken>>,
}

impl Authenticator {
    pub fn new(credentials: Credentials, accounts_url: &str, refresh_token: Option<String>) -> Self {
        Self {
            credentials,
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            refresh_token: Mutex::new(refresh_token),
            access: Mutex::new(None),
        }
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.accounts_url)
    }

    /// URL the user opens to grant access; the provider redirects back to
    /// `redirect_uri` with a `code` query parameter.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.accounts_url,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.credentials.redirect_uri),
            urlencoding::encode(&SCOPES.join(" ")),
            urlencoding::encode(state),
        )
    }

    /// Trades an authorization code for tokens and keeps them.
    pub fn exchange_code(
        &self,
        transport: &dyn Transport,
        code: &str,
    ) -> Result<TokenGrant, ProviderError> {
        const OPERATION: &str = "exchange authorization code";

        let payload = self.request_token(
            transport,
            OPERATION,
            vec![
                ("grant_type".to_string(), "authorization_code".to_string()),
                ("code".to_string(), code.to_string()),
                (
                    "redirect_uri".to_string(),
                    self.credentials.redirect_uri.clone(),
                ),
            ],
        )?;

        let grant = TokenGrant {
            refresh_token: payload.refresh_token.clone().ok_or_else(|| {
                ProviderError::malformed(OPERATION, "token response carries no refresh token")
            })?,
            scope: payload.scope.clone(),
        };

        self.store(payload);
        info!("Authorization code exchanged for tokens");
        Ok(grant)
    }

    /// Returns a valid access token, refreshing it when missing or about
    /// to expire.
    pub fn access_token(&self, transport: &dyn Transport) -> Result<String, ProviderError> {
        const OPERATION: &str = "refresh access token";

        if let Some(token) = self.cached(Instant::now()) {
            return Ok(token);
        }

        let refresh_token = self
            .refresh_token
            .lock()
            .map_err(|_| ProviderError::new(OPERATION, ProviderFailure::Unauthorized))?
            .clone()
            .ok_or_else(|| ProviderError::new(OPERATION, ProviderFailure::Unauthorized))?;

        debug!("Refreshing access token");
        let payload = self.request_token(
            transport,
            OPERATION,
            vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("refresh_token".to_string(), refresh_token),
            ],
        )?;
        let value = payload.access_token.clone();
        self.store(payload);
        Ok(value)
    }

    /// Forgets the cached access token, e.g. after the API rejected it.
    pub fn invalidate(&self) {
        if let Ok(mut access) = self.access.lock() {
            *access = None;
        }
    }

    fn cached(&self, now: Instant) -> Option<String> {
        let access = self.access.lock().ok()?;
        access
            .as_ref()
            .filter(|t| now + EXPIRY_MARGIN < t.expires_at)
            .map(|t| t.value.clone())
    }

    fn store(&self, payload: TokenPayload) {
        let expires_at = Instant::now() + Duration::from_secs(payload.expires_in);
        if let Ok(mut access) = self.access.lock() {
            *access = Some(AccessToken {
                value: payload.access_token,
                expires_at,
            });
        }
        // the provider may rotate the refresh token
        if let Some(new_refresh) = payload.refresh_token {
            if let Ok(mut refresh) = self.refresh_token.lock() {
                *refresh = Some(new_refresh);
            }
        }
    }

    fn request_token(
        &self,
        transport: &dyn Transport,
        operation: &str,
        form: Vec<(String, String)>,
    ) -> Result<TokenPayload, ProviderError> {
        let request = ApiRequest::new(Method::POST, self.token_url())
            .with_auth(Auth::Basic {
                user: self.credentials.client_id.clone(),
                password: self.credentials.client_secret.clone(),
            })
            .with_body(Body::Form(form));

        let response = transport
            .execute(&request)
            .map_err(|e| ProviderError::transport(operation, e))?;

        // invalid_grant and invalid_client both come back as 400
        if response.status == 400 {
            return Err(ProviderError::new(operation, ProviderFailure::Unauthorized));
        }
        if let Some(failure) = ProviderFailure::from_response(&response) {
            return Err(ProviderError::new(operation, failure));
        }

        serde_json::from_str(&response.body)
            .map_err(|e| ProviderError::malformed(operation, e.to_string()))
    }
}
