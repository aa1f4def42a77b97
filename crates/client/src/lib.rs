//! REST client for the controller's `/v2` surface: profile handling,
//! session-token caching and typed endpoint calls.

pub mod profile;
mod token_cache;

use gort_domain::{
    Bundle, DynamicConfiguration, Group, Permission, Result, Role, ScheduledCommand, Token, User,
};
use gort_domain::Error;
use reqwest::header::HeaderMap;
use reqwest::{Certificate, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use profile::{ProfileEntry, Profiles};

/// Header carrying the opaque session token.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// A connected (but not necessarily authenticated) API client for one
/// profile.
#[derive(Debug)]
pub struct GortClient {
    entry: ProfileEntry,
    base_url: Url,
    http: reqwest::Client,
    token: Option<Token>,
}

/// Response of `POST /v2/bootstrap`: the provisioned user plus the
/// generated password, when the server had to generate one.
#[derive(Debug, Deserialize)]
pub struct BootstrapResult {
    pub user: User,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthenticateBody<'a> {
    username: &'a str,
    password: &'a str,
}

impl GortClient {
    /// Connect using the default profile from `~/.gort/profile`.
    pub fn connect_default() -> Result<Self> {
        let profiles = Profiles::load_default()?;
        let entry = profiles
            .default_entry()
            .ok_or_else(|| Error::Config("profile file has no default profile".into()))?;
        Self::connect_with_new_profile(entry.clone())
    }

    /// Build a client from an explicit profile entry.
    ///
    /// Plain `http://` URLs are refused unless the entry opts in with
    /// `allow_insecure`; `https://` is always accepted.
    pub fn connect_with_new_profile(entry: ProfileEntry) -> Result<Self> {
        let base_url = Url::parse(&entry.url)
            .map_err(|e| Error::Config(format!("bad profile url {}: {e}", entry.url)))?;
        match base_url.scheme() {
            "https" => {}
            "http" if entry.allow_insecure => {}
            "http" => {
                return Err(Error::Config(format!(
                    "insecure URL {}: set allow_insecure to use plain http",
                    entry.url
                )))
            }
            other => {
                return Err(Error::Config(format!(
                    "unsupported URL scheme {other} in {}",
                    entry.url
                )))
            }
        }

        let mut builder = reqwest::Client::builder();
        if !entry.tls_cert_file.is_empty() {
            let pem = std::fs::read(&entry.tls_cert_file)?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("bad tls_cert_file: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("building http client: {e}")))?;

        Ok(Self {
            entry,
            base_url,
            http,
            token: None,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v2/{}",
            self.entry.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    // ── Sessions ──────────────────────────────────────────────────────

    /// Exchange the profile's credentials for a fresh session token and
    /// cache it on disk (mode 0600).
    pub async fn authenticate(&mut self) -> Result<Token> {
        let body = AuthenticateBody {
            username: &self.entry.user,
            password: &self.entry.password,
        };
        let response = self
            .http
            .post(self.api_url("authenticate"))
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        let token: Token = decode(response).await?;

        if let Err(e) = token_cache::store(&self.base_url, &self.entry.name, &token) {
            tracing::debug!(error = %e, "token cache write failed");
        }
        self.token = Some(token.clone());
        Ok(token)
    }

    /// The current session token: in-memory, then the disk cache, then
    /// a fresh authentication.
    async fn session_token(&mut self) -> Result<String> {
        if let Some(token) = &self.token {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }
        if let Some(cached) = token_cache::load(&self.base_url, &self.entry.name) {
            if !cached.is_expired() {
                self.token = Some(cached.clone());
                return Ok(cached.token);
            }
        }
        Ok(self.authenticate().await?.token)
    }

    async fn authed_headers(&mut self) -> Result<HeaderMap> {
        let token = self.session_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            SESSION_TOKEN_HEADER,
            token
                .parse()
                .map_err(|_| Error::Config("token is not a valid header value".into()))?,
        );
        Ok(headers)
    }

    // ── Request plumbing ──────────────────────────────────────────────

    async fn send<B: Serialize>(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let headers = self.authed_headers().await?;
        let mut request = self
            .http
            .request(method, self.api_url(path))
            .headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(http_error)
    }

    async fn get_json<T: DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        decode(response).await
    }

    /// Lists come back 204 when empty.
    async fn get_list<T: DeserializeOwned>(&mut self, path: &str) -> Result<Vec<T>> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        decode(response).await
    }

    async fn put_json<B: Serialize>(&mut self, path: &str, body: &B) -> Result<()> {
        let response = self.send(Method::PUT, path, Some(body)).await?;
        check(response).await
    }

    async fn put_empty(&mut self, path: &str) -> Result<()> {
        let response = self.send::<()>(Method::PUT, path, None).await?;
        check(response).await
    }

    async fn delete(&mut self, path: &str) -> Result<()> {
        let response = self.send::<()>(Method::DELETE, path, None).await?;
        check(response).await
    }

    // ── Bootstrap ─────────────────────────────────────────────────────

    /// Provision the first user on a fresh controller. No session token
    /// is required; the profile password may be empty to let the server
    /// generate one.
    pub async fn bootstrap(&mut self, password: &str) -> Result<BootstrapResult> {
        let body = serde_json::json!({
            "username": self.entry.user,
            "password": password,
        });
        let response = self
            .http
            .post(self.api_url("bootstrap"))
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        decode(response).await
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub async fn user_list(&mut self) -> Result<Vec<User>> {
        self.get_list("users").await
    }

    pub async fn user_get(&mut self, username: &str) -> Result<User> {
        self.get_json(&format!("users/{username}")).await
    }

    pub async fn user_save(&mut self, username: &str, spec: &serde_json::Value) -> Result<()> {
        self.put_json(&format!("users/{username}"), spec).await
    }

    pub async fn user_delete(&mut self, username: &str) -> Result<()> {
        self.delete(&format!("users/{username}")).await
    }

    pub async fn user_group_list(&mut self, username: &str) -> Result<Vec<Group>> {
        self.get_list(&format!("users/{username}/groups")).await
    }

    // ── Groups ────────────────────────────────────────────────────────

    pub async fn group_list(&mut self) -> Result<Vec<Group>> {
        self.get_list("groups").await
    }

    pub async fn group_create(&mut self, name: &str) -> Result<()> {
        self.put_empty(&format!("groups/{name}")).await
    }

    pub async fn group_delete(&mut self, name: &str) -> Result<()> {
        self.delete(&format!("groups/{name}")).await
    }

    pub async fn group_member_add(&mut self, group: &str, user: &str) -> Result<()> {
        self.put_empty(&format!("groups/{group}/members/{user}")).await
    }

    pub async fn group_member_remove(&mut self, group: &str, user: &str) -> Result<()> {
        self.delete(&format!("groups/{group}/members/{user}")).await
    }

    pub async fn group_role_add(&mut self, group: &str, role: &str) -> Result<()> {
        self.put_empty(&format!("groups/{group}/roles/{role}")).await
    }

    pub async fn group_role_remove(&mut self, group: &str, role: &str) -> Result<()> {
        self.delete(&format!("groups/{group}/roles/{role}")).await
    }

    // ── Roles ─────────────────────────────────────────────────────────

    pub async fn role_list(&mut self) -> Result<Vec<Role>> {
        self.get_list("roles").await
    }

    pub async fn role_create(&mut self, name: &str) -> Result<()> {
        self.put_empty(&format!("roles/{name}")).await
    }

    pub async fn role_delete(&mut self, name: &str) -> Result<()> {
        self.delete(&format!("roles/{name}")).await
    }

    pub async fn role_permission_list(&mut self, role: &str) -> Result<Vec<Permission>> {
        self.get_list(&format!("roles/{role}/permissions")).await
    }

    pub async fn role_permission_grant(
        &mut self,
        role: &str,
        bundle: &str,
        permission: &str,
    ) -> Result<()> {
        self.put_empty(&format!("roles/{role}/bundles/{bundle}/permissions/{permission}"))
            .await
    }

    pub async fn role_permission_revoke(
        &mut self,
        role: &str,
        bundle: &str,
        permission: &str,
    ) -> Result<()> {
        self.delete(&format!("roles/{role}/bundles/{bundle}/permissions/{permission}"))
            .await
    }

    // ── Bundles ───────────────────────────────────────────────────────

    pub async fn bundle_list(&mut self) -> Result<Vec<Bundle>> {
        self.get_list("bundles").await
    }

    pub async fn bundle_versions(&mut self, name: &str) -> Result<Vec<Bundle>> {
        self.get_list(&format!("bundles/{name}")).await
    }

    pub async fn bundle_install(&mut self, bundle: &Bundle) -> Result<()> {
        self.put_json(
            &format!("bundles/{}/versions/{}", bundle.name, bundle.version),
            bundle,
        )
        .await
    }

    pub async fn bundle_uninstall(&mut self, name: &str, version: &str) -> Result<()> {
        self.delete(&format!("bundles/{name}/versions/{version}")).await
    }

    pub async fn bundle_set_enabled(
        &mut self,
        name: &str,
        version: &str,
        enabled: bool,
    ) -> Result<()> {
        let response = self
            .send::<()>(
                Method::PATCH,
                &format!("bundles/{name}/versions/{version}?enabled={enabled}"),
                None,
            )
            .await?;
        check(response).await
    }

    // ── Dynamic configurations ────────────────────────────────────────

    pub async fn config_list(
        &mut self,
        bundle: &str,
        layer: &str,
        owner: &str,
        key: &str,
    ) -> Result<Vec<DynamicConfiguration>> {
        self.get_list(&format!("configs/{bundle}/{layer}/{owner}/{key}")).await
    }

    pub async fn config_set(
        &mut self,
        bundle: &str,
        layer: &str,
        owner: &str,
        key: &str,
        value: &str,
        secret: bool,
    ) -> Result<()> {
        let body = serde_json::json!({ "value": value, "secret": secret });
        self.put_json(&format!("configs/{bundle}/{layer}/{owner}/{key}"), &body)
            .await
    }

    pub async fn config_delete(
        &mut self,
        bundle: &str,
        layer: &str,
        owner: &str,
        key: &str,
    ) -> Result<()> {
        self.delete(&format!("configs/{bundle}/{layer}/{owner}/{key}")).await
    }

    // ── Schedules ─────────────────────────────────────────────────────

    /// Returns the new schedule id (the server answers with decimal
    /// text).
    pub async fn schedule_create(&mut self, cron: &str, command: &str) -> Result<i64> {
        let body = serde_json::json!({ "cron": cron, "command": command });
        let response = self.send(Method::PUT, "schedules", Some(&body)).await?;
        let status = response.status();
        let text = response.text().await.map_err(http_error)?;
        if !status.is_success() {
            return Err(status_error(status, text));
        }
        text.trim()
            .parse()
            .map_err(|_| Error::Unmarshal(format!("bad schedule id: {text}")))
    }

    pub async fn schedule_list(&mut self) -> Result<Vec<ScheduledCommand>> {
        self.get_list("schedules").await
    }

    pub async fn schedule_delete(&mut self, schedule_id: i64) -> Result<()> {
        self.delete(&format!("schedules/{schedule_id}")).await
    }
}

// ── Response handling ─────────────────────────────────────────────────

fn http_error(e: reqwest::Error) -> Error {
    Error::Other(format!("http: {e}"))
}

/// Map the uniform error surface back onto error kinds.
fn status_error(status: StatusCode, body: String) -> Error {
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or(body);
    match status {
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        StatusCode::FORBIDDEN => Error::PermissionDenied,
        StatusCode::NOT_FOUND => Error::NotFound {
            kind: "resource",
            name: message,
        },
        StatusCode::CONFLICT => Error::AlreadyExists {
            kind: "resource",
            name: message,
        },
        StatusCode::PRECONDITION_FAILED => Error::ReservedConfigKey(message),
        StatusCode::BAD_REQUEST => Error::Unmarshal(message),
        _ => Error::Other(format!("{status}: {message}")),
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(http_error)?;
    if !status.is_success() {
        return Err(status_error(status, body));
    }
    serde_json::from_str(&body).map_err(|e| Error::Unmarshal(format!("decoding response: {e}")))
}

async fn check(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.map_err(http_error)?;
    Err(status_error(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, allow_insecure: bool) -> ProfileEntry {
        ProfileEntry {
            name: "gort".into(),
            url: url.into(),
            user: "admin".into(),
            password: "pw".into(),
            allow_insecure,
            tls_cert_file: String::new(),
        }
    }

    #[test]
    fn insecure_url_is_rejected() {
        let err = GortClient::connect_with_new_profile(entry("http://example.com", false))
            .unwrap_err();
        assert!(err.to_string().contains("insecure"));
    }

    #[test]
    fn insecure_url_allowed_when_opted_in() {
        assert!(GortClient::connect_with_new_profile(entry("http://example.com", true)).is_ok());
    }

    #[test]
    fn https_url_is_always_accepted() {
        assert!(GortClient::connect_with_new_profile(entry("https://example.com", false)).is_ok());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(GortClient::connect_with_new_profile(entry("ftp://example.com", false)).is_err());
    }

    #[test]
    fn api_urls_are_rooted_at_v2() {
        let client =
            GortClient::connect_with_new_profile(entry("https://example.com:4000/", false))
                .unwrap();
        assert_eq!(
            client.api_url("users/admin"),
            "https://example.com:4000/v2/users/admin"
        );
    }
}
