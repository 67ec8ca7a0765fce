use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::AuthError;
use crate::session::{TokenEndpoint, TokenResponse};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SUCCESS_PAGE: &str = "The authentication flow has completed. You may close this window.";
const DENIED_PAGE: &str = "Authorization was denied. You may close this window.";

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Layout of the client secrets file downloaded from the cloud console.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let file: SecretsFile = serde_json::from_str(raw)?;
        file.installed.or(file.web).ok_or_else(|| {
            AuthError::Interactive("client secrets file has no \"installed\" or \"web\" entry".into())
        })
    }
}

/// Installed-application OAuth2 flow against Google's endpoints.
pub struct GoogleOAuth {
    client: Client,
    secrets: ClientSecrets,
    scopes: Vec<String>,
}

impl GoogleOAuth {
    pub fn new(secrets: ClientSecrets, scopes: Vec<String>) -> Result<Self, AuthError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            secrets,
            scopes,
        })
    }

    pub async fn from_secrets_file(path: &Path, scopes: Vec<String>) -> Result<Self, AuthError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AuthError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(ClientSecrets::parse(&raw)?, scopes)
    }

    fn consent_url(&self, redirect_uri: &str, state: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.secrets.auth_uri)
            .map_err(|e| AuthError::Interactive(format!("invalid auth uri: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let res = self
            .client
            .post(&self.secrets.token_uri)
            .form(form)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint { status, body });
        }
        Ok(res.json().await?)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Redirect {
    Code(String),
    Denied(String),
    /// No code at all: a favicon fetch, a preconnect, a stray client.
    Unrelated,
    StateMismatch,
}

fn classify_redirect(params: &HashMap<String, String>, expected_state: &str) -> Redirect {
    let state_matches = params.get("state").map(String::as_str) == Some(expected_state);
    if let Some(error) = params.get("error") {
        return if state_matches {
            Redirect::Denied(error.clone())
        } else {
            Redirect::StateMismatch
        };
    }
    match params.get("code") {
        None => Redirect::Unrelated,
        Some(_) if !state_matches => Redirect::StateMismatch,
        Some(code) => Redirect::Code(code.clone()),
    }
}

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    outcome: mpsc::Sender<Result<String, AuthError>>,
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    match classify_redirect(&params, &state.expected_state) {
        Redirect::Code(code) => {
            let _ = state.outcome.send(Ok(code)).await;
            (StatusCode::OK, SUCCESS_PAGE)
        }
        Redirect::Denied(reason) => {
            let err = AuthError::Interactive(format!("consent denied: {}", reason));
            let _ = state.outcome.send(Err(err)).await;
            (StatusCode::OK, DENIED_PAGE)
        }
        Redirect::StateMismatch => {
            debug!("ignoring redirect with a foreign state");
            (StatusCode::BAD_REQUEST, "State mismatch in authorization redirect.")
        }
        Redirect::Unrelated => (StatusCode::NOT_FOUND, "Waiting for the authorization redirect."),
    }
}

/// Serves the loopback redirect until a request carries a code with the
/// expected state, or the operator denies consent. Anything else is answered
/// and ignored.
async fn receive_code(listener: TcpListener, expected_state: String) -> Result<String, AuthError> {
    let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = Router::new()
        .route("/", get(handle_redirect))
        .with_state(RedirectState {
            expected_state: expected_state.into(),
            outcome: outcome_tx,
        });

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let outcome = outcome_rx.recv().await;
    let _ = stop_tx.send(());
    match outcome {
        Some(result) => result,
        None => Err(AuthError::Interactive(match server.await {
            Ok(Err(e)) => format!("redirect listener failed: {}", e),
            _ => "redirect listener stopped".to_string(),
        })),
    }
}

#[async_trait]
impl TokenEndpoint for GoogleOAuth {
    async fn authorize_interactively(&self) -> Result<TokenResponse, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Interactive(format!("cannot bind loopback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Interactive(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state = Uuid::new_v4().simple().to_string();

        let url = self.consent_url(&redirect_uri, &state)?;
        println!("Please visit this URL to authorize this application: {}", url);
        info!(port, "waiting for authorization redirect");

        let code = receive_code(listener, state).await?;
        self.token_request(&[
            ("code", code.as_str()),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_installed_client_secrets() {
        let raw = r#"{"installed":{"client_id":"id.apps","client_secret":"s3cret","redirect_uris":["http://localhost"]}}"#;
        let secrets = ClientSecrets::parse(raw).unwrap();
        assert_eq!(secrets.client_id, "id.apps");
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
        assert!(ClientSecrets::parse("{}").is_err());
    }

    #[test]
    fn consent_url_requests_offline_access() {
        let secrets = ClientSecrets::parse(r#"{"web":{"client_id":"cid","client_secret":"x"}}"#).unwrap();
        let oauth = GoogleOAuth::new(secrets, vec![SHEETS_SCOPE.to_string()]).unwrap();
        let url = oauth.consent_url("http://127.0.0.1:5000/", "abc").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("scope".into(), SHEETS_SCOPE.into())));
        assert!(pairs.contains(&("state".into(), "abc".into())));
    }

    fn params(query: &str) -> HashMap<String, String> {
        url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
    }

    #[test]
    fn redirect_classification() {
        assert_eq!(
            classify_redirect(&params("state=abc&code=4%2F0Ab&scope=x"), "abc"),
            Redirect::Code("4/0Ab".to_string())
        );
        assert_eq!(classify_redirect(&params(""), "abc"), Redirect::Unrelated);
        assert_eq!(classify_redirect(&params("code=1&state=zzz"), "abc"), Redirect::StateMismatch);
        assert_eq!(
            classify_redirect(&params("error=access_denied&state=abc"), "abc"),
            Redirect::Denied("access_denied".to_string())
        );
        assert_eq!(classify_redirect(&params("error=access_denied"), "abc"), Redirect::StateMismatch);
    }

    #[tokio::test]
    async fn stray_connections_do_not_abort_authorization() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(receive_code(listener, "st".to_string()));

        // Connect and hang up without sending anything.
        drop(tokio::net::TcpStream::connect(addr).await.unwrap());

        let client = Client::new();
        let res = client.get(format!("http://{}/favicon.ico", addr)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 404);
        let res = client.get(format!("http://{}/?code=forged&state=other", addr)).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 400);

        let res = client.get(format!("http://{}/?code=good&state=st", addr)).send().await.unwrap();
        assert!(res.status().is_success());
        assert_eq!(res.text().await.unwrap(), SUCCESS_PAGE);
        assert_eq!(waiting.await.unwrap().unwrap(), "good");
    }

    #[tokio::test]
    async fn denied_consent_ends_the_wait() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(receive_code(listener, "st".to_string()));

        Client::new()
            .get(format!("http://{}/?error=access_denied&state=st", addr))
            .send()
            .await
            .unwrap();
        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::Interactive(_)));
    }
}
