//! Google OAuth2 authorization-code flow: authorization URL construction,
//! code-for-token exchange and token refresh.

pub mod session;
pub mod state;

use crate::GoogleConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Google's OAuth2 authorization endpoint.
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's OAuth2 token endpoint, used for both exchange and refresh.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Read/write calendar scope.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Path the provider redirects back to after authorization.
pub const CALLBACK_PATH: &str = "/auth/google/callback";

#[derive(Error, Debug)]
pub enum AuthError {
    /// The Google client id and secret were not supplied via configuration.
    #[error("google client id and secret are not configured")]
    MissingClientConfig,

    /// The provider reported an error or returned no authorization code.
    #[error("authorization was denied: {0}")]
    AuthorizationDenied(String),

    /// The callback carried a state value this server did not issue.
    #[error("unrecognized anti-forgery state")]
    StateMismatch,

    /// The provider rejected the code-for-token exchange or refresh.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// A refresh was required but the stored bundle has no refresh token.
    #[error("stored credentials have no refresh token")]
    NoRefreshToken,

    /// Error while talking to the token endpoint.
    #[error("failed to reach the token endpoint: {0}")]
    Request(#[from] reqwest::Error),
}

/// Tokens returned by the provider on exchange or refresh.
///
/// `refresh_token` is commonly absent on refresh responses and must then be
/// carried over from the stored bundle.
#[derive(Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Client for Google's OAuth2 endpoints.
#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GoogleOAuthClient {
    /// Creates a client from configuration. Fails with
    /// [`AuthError::MissingClientConfig`] when the client id or secret are
    /// absent, which is why callers construct this per action rather than at
    /// startup.
    pub fn from_config(config: &GoogleConfig) -> Result<GoogleOAuthClient, AuthError> {
        let (Some(client_id), Some(client_secret)) =
            (config.client_id.clone(), config.client_secret.clone())
        else {
            return Err(AuthError::MissingClientConfig);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(GoogleOAuthClient {
            http,
            client_id,
            client_secret,
        })
    }

    /// Builds the provider authorization URL. `offline` access and forced
    /// re-consent make sure a refresh token is part of the exchange response.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code&access_type=offline&prompt=consent",
            AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(CALENDAR_SCOPE),
            urlencoding::encode(state)
        )
    }

    /// Exchanges an authorization code for a token bundle.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    /// Obtains a fresh access token from a refresh token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AuthError::TokenExchange(format!("{status}: {body}")));
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

/// Anything that can trade a refresh token for a new access token. The live
/// implementation talks to Google; tests substitute a scripted double.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// Live [`TokenRefresher`] resolving the client configuration at call time,
/// so a missing client id/secret surfaces on the action that needs it.
pub struct GoogleTokenRefresher {
    config: GoogleConfig,
}

impl GoogleTokenRefresher {
    pub fn new(config: GoogleConfig) -> GoogleTokenRefresher {
        GoogleTokenRefresher { config }
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        GoogleOAuthClient::from_config(&self.config)?
            .refresh_access_token(refresh_token)
            .await
    }
}

/// Builds the OAuth callback address from the inbound request's own origin.
///
/// The loopback alias `127.0.0.1` is normalized to `localhost` so that a
/// single redirect URI registered with the provider covers local
/// development.
pub fn callback_url(scheme: &str, host: &str) -> String {
    let host = host.replace("127.0.0.1", "localhost");
    format!("{scheme}://{host}{CALLBACK_PATH}")
}
