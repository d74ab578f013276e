use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Deserialize;
use serde::Serialize;

use crate::account::Credentials;
use crate::errors::AihlError;
use crate::transport::Method;
use crate::transport::RawRequest;
use crate::transport::RawResponse;
use crate::transport::Transport;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

/// The site runs Django behind at least two deployments which disagree on
/// the csrf cookie name.
const CSRF_COOKIE_NAMES: [&str; 2] = ["csrftoken", "csrf"];

/// Case-insensitive substring of the root page that only renders for a
/// logged-in account.
const LOGIN_MARKER: &str = "Sign Out";

/// Client identity for one site: cookies plus the fixed request headers
/// they were issued under. Serialized as JSON so it round-trips across
/// process runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub created_at: i64,
}

impl SessionState {
    pub fn new(login_url: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("user-agent".to_string(), USER_AGENT.to_string());
        headers.insert("referer".to_string(), format!("{login_url}?next=/"));
        Self {
            cookies: BTreeMap::new(),
            headers,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Merge one Set-Cookie header value. Only the leading name=value pair
    /// matters; attributes like Path and Expires are dropped.
    pub fn apply_set_cookie(&mut self, raw: &str) {
        let pair = raw.split(';').next().unwrap_or(raw);
        if let Some((name, value)) = pair.split_once('=') {
            self.cookies
                .insert(name.trim().to_string(), value.trim().to_string());
        }
    }
}

/// On-disk snapshot of a `SessionState`, one file per site host. The file's
/// modification time is the staleness signal: every successful fetch
/// rewrites the file, so mtime tracks last activity rather than login time.
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(dir: &Path, host: &str) -> Self {
        Self {
            path: dir.join(format!("{host}_session.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn age_seconds(&self) -> Option<i64> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        Some(age.as_secs() as i64)
    }

    pub fn load(&self) -> Result<SessionState, AihlError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, state: &SessionState) -> Result<(), AihlError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }
}

/// Owns the authenticated identity for one site and the cache file backing
/// it. Not safe for concurrent use: the cache file has no locking.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    cache: SessionCache,
    login_url: String,
    base_url: String,
    state: Option<SessionState>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: SessionCache,
        login_url: &str,
        base_url: &str,
    ) -> Self {
        Self {
            transport,
            cache,
            login_url: login_url.to_string(),
            base_url: base_url.to_string(),
            state: None,
        }
    }

    /// Reuse the cached identity when it is younger than `ttl_seconds`,
    /// otherwise run the full login sequence. The cache-hit path performs
    /// no network traffic at all.
    pub async fn ensure_authenticated(
        &mut self,
        credentials: &Credentials,
        ttl_seconds: i64,
        force_relogin: bool,
    ) -> Result<(), AihlError> {
        credentials.validate()?;

        if !force_relogin {
            if let Some(age) = self.cache.age_seconds() {
                if age < ttl_seconds {
                    if self.state.is_none() {
                        match self.cache.load() {
                            Ok(state) => {
                                log::debug!(
                                    "loaded session from cache (last activity {age}s ago)"
                                );
                                self.state = Some(state);
                            }
                            Err(err) => {
                                log::warn!("session cache unreadable, logging in again: {err}");
                                return self.login(credentials).await;
                            }
                        }
                    }
                    return Ok(());
                }
            }
        }

        self.login(credentials).await
    }

    /// GET the login page for a csrf cookie, POST the login form, then GET
    /// the site root and require the signed-in marker. Nothing is persisted
    /// until the marker check passes, so a rejected login leaves any
    /// previous cache file intact.
    async fn login(&mut self, credentials: &Credentials) -> Result<(), AihlError> {
        log::info!("creating new session for {}", self.base_url);
        let mut state = SessionState::new(&self.login_url);

        self.send(&mut state, Method::Get, &self.login_url, None)
            .await?;
        let csrf = CSRF_COOKIE_NAMES
            .iter()
            .find_map(|name| state.cookies.get(*name))
            .cloned()
            .ok_or_else(|| AihlError::Auth {
                reason: "csrf cookie not set by login page".to_string(),
            })?;

        let form = vec![
            ("csrfmiddlewaretoken".to_string(), csrf),
            ("next".to_string(), "/".to_string()),
            ("email".to_string(), credentials.email.clone()),
            ("password".to_string(), credentials.password.clone()),
        ];
        self.send(&mut state, Method::Post, &self.login_url, Some(form))
            .await?;

        let root = self
            .send(&mut state, Method::Get, &self.base_url, None)
            .await?;
        if !root
            .body
            .to_lowercase()
            .contains(&LOGIN_MARKER.to_lowercase())
        {
            log::error!("login to {} rejected: marker not found", self.login_url);
            return Err(AihlError::Auth {
                reason: "login marker not found".to_string(),
            });
        }

        self.cache.save(&state)?;
        self.state = Some(state);
        Ok(())
    }

    /// Perform one request with the stored identity. The response comes
    /// back as-is whatever its HTTP status; cookies rotated by the server
    /// are folded into the state, which is re-persisted so the cache mtime
    /// keeps tracking last activity.
    pub async fn fetch(
        &mut self,
        url: &str,
        method: Method,
        form: Option<Vec<(String, String)>>,
    ) -> Result<RawResponse, AihlError> {
        let mut state = self.state.take().ok_or_else(|| AihlError::Auth {
            reason: "no active session".to_string(),
        })?;
        let result = self.send(&mut state, method, url, form).await;
        let saved = match &result {
            Ok(_) => self.cache.save(&state),
            Err(_) => Ok(()),
        };
        self.state = Some(state);
        saved?;
        result
    }

    async fn send(
        &self,
        state: &mut SessionState,
        method: Method,
        url: &str,
        form: Option<Vec<(String, String)>>,
    ) -> Result<RawResponse, AihlError> {
        let mut headers: Vec<(String, String)> = state
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !state.cookies.is_empty() {
            headers.push(("cookie".to_string(), state.cookie_header()));
        }

        let response = self
            .transport
            .execute(RawRequest {
                method,
                url: url.to_string(),
                headers,
                form,
            })
            .await?;
        for raw in &response.set_cookies {
            state.apply_set_cookie(raw);
        }
        Ok(response)
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;

    const LOGIN_URL: &str = "https://aihl.tv/auth/login/";
    const BASE_URL: &str = "https://aihl.tv/";

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn credentials() -> Credentials {
        Credentials::new("fan@example.com", "hunter2")
    }

    fn manager(dir: &Path, transport: Arc<FakeTransport>) -> SessionManager {
        SessionManager::new(
            transport,
            SessionCache::new(dir, "aihl.tv"),
            LOGIN_URL,
            BASE_URL,
        )
    }

    fn login_responses() -> Vec<RawResponse> {
        vec![
            RawResponse {
                status: 200,
                set_cookies: vec!["csrftoken=tok123; Path=/; SameSite=Lax".to_string()],
                body: "<html>login form</html>".to_string(),
            },
            RawResponse {
                status: 302,
                set_cookies: vec!["sessionid=sess456; HttpOnly".to_string()],
                body: String::new(),
            },
            RawResponse {
                status: 200,
                set_cookies: Vec::new(),
                body: "<html><a href=\"/auth/logout/\">SIGN OUT</a></html>".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn empty_credentials_fail_before_any_request() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(Vec::new()));
        let mut manager = manager(dir.path(), transport.clone());

        let err = manager
            .ensure_authenticated(&Credentials::new("", "pw"), 1800, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AihlError::Credential { field: "email" }));

        let err = manager
            .ensure_authenticated(&Credentials::new("fan@example.com", ""), 1800, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AihlError::Credential { field: "password" }));

        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn login_runs_get_post_get_and_persists() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(login_responses()));
        let mut manager = manager(dir.path(), transport.clone());

        manager
            .ensure_authenticated(&credentials(), 1800, false)
            .await
            .unwrap();

        let requests = transport.recorded();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url, LOGIN_URL);
        assert_eq!(requests[1].method, Method::Post);
        assert_eq!(requests[1].url, LOGIN_URL);
        assert_eq!(requests[2].method, Method::Get);
        assert_eq!(requests[2].url, BASE_URL);

        // csrf cookie flows into both the form and the cookie header
        let form = requests[1].form.clone().unwrap();
        assert!(form.contains(&("csrfmiddlewaretoken".to_string(), "tok123".to_string())));
        assert!(form.contains(&("next".to_string(), "/".to_string())));
        let cookie = requests[1]
            .headers
            .iter()
            .find(|(name, _)| name == "cookie")
            .cloned()
            .unwrap();
        assert_eq!(cookie.1, "csrftoken=tok123");

        let saved = manager.cache.load().unwrap();
        assert_eq!(saved.cookies.get("sessionid").unwrap(), "sess456");
        assert_eq!(
            saved.headers.get("referer").unwrap(),
            "https://aihl.tv/auth/login/?next=/"
        );
    }

    #[tokio::test]
    async fn accepts_fallback_csrf_cookie_name() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let mut responses = login_responses();
        responses[0].set_cookies = vec!["csrf=alt789".to_string()];
        let transport = Arc::new(FakeTransport::new(responses));
        let mut manager = manager(dir.path(), transport.clone());

        manager
            .ensure_authenticated(&credentials(), 1800, false)
            .await
            .unwrap();

        let form = transport.recorded()[1].form.clone().unwrap();
        assert!(form.contains(&("csrfmiddlewaretoken".to_string(), "alt789".to_string())));
    }

    #[tokio::test]
    async fn fresh_cache_skips_network() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path(), "aihl.tv");
        let mut state = SessionState::new(LOGIN_URL);
        state.cookies.insert("sessionid".to_string(), "cached".to_string());
        cache.save(&state).unwrap();

        let transport = Arc::new(FakeTransport::new(Vec::new()));
        let mut manager = manager(dir.path(), transport.clone());
        manager
            .ensure_authenticated(&credentials(), 1800, false)
            .await
            .unwrap();

        assert_eq!(transport.request_count(), 0);
        assert_eq!(
            manager.state().unwrap().cookies.get("sessionid").unwrap(),
            "cached"
        );
    }

    #[tokio::test]
    async fn stale_cache_triggers_full_login() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path(), "aihl.tv");
        cache.save(&SessionState::new(LOGIN_URL)).unwrap();

        let transport = Arc::new(FakeTransport::new(login_responses()));
        let mut manager = manager(dir.path(), transport.clone());
        // ttl of zero makes any existing file stale
        manager
            .ensure_authenticated(&credentials(), 0, false)
            .await
            .unwrap();

        assert_eq!(
            transport.request_urls(),
            vec![LOGIN_URL, LOGIN_URL, BASE_URL]
        );
    }

    #[tokio::test]
    async fn force_relogin_ignores_fresh_cache() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path(), "aihl.tv");
        cache.save(&SessionState::new(LOGIN_URL)).unwrap();

        let transport = Arc::new(FakeTransport::new(login_responses()));
        let mut manager = manager(dir.path(), transport.clone());
        manager
            .ensure_authenticated(&credentials(), 1800, true)
            .await
            .unwrap();

        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn rejected_login_keeps_previous_cache() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path(), "aihl.tv");
        let mut previous = SessionState::new(LOGIN_URL);
        previous
            .cookies
            .insert("sessionid".to_string(), "still-good".to_string());
        cache.save(&previous).unwrap();

        let mut responses = login_responses();
        responses[2].body = "<html>Sign In</html>".to_string();
        let transport = Arc::new(FakeTransport::new(responses));
        let mut manager = manager(dir.path(), transport);

        let err = manager
            .ensure_authenticated(&credentials(), 0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AihlError::Auth { .. }));
        assert!(manager.state().is_none());

        let kept = cache.load().unwrap();
        assert_eq!(kept.cookies.get("sessionid").unwrap(), "still-good");
    }

    #[tokio::test]
    async fn missing_csrf_cookie_is_an_auth_error() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(vec![FakeTransport::page(
            "<html>login form</html>",
        )]));
        let mut manager = manager(dir.path(), transport.clone());

        let err = manager
            .ensure_authenticated(&credentials(), 1800, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AihlError::Auth { .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn fetch_merges_rotated_cookies_and_repersists() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let mut responses = login_responses();
        responses.push(RawResponse {
            status: 200,
            set_cookies: vec!["sessionid=rotated".to_string()],
            body: "<html>event page</html>".to_string(),
        });
        let transport = Arc::new(FakeTransport::new(responses));
        let mut manager = manager(dir.path(), transport.clone());

        manager
            .ensure_authenticated(&credentials(), 1800, false)
            .await
            .unwrap();
        let response = manager
            .fetch("https://aihl.tv/some/event/", Method::Get, None)
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        // the request carried the pre-rotation cookie
        let requests = transport.recorded();
        let cookie = requests[3]
            .headers
            .iter()
            .find(|(name, _)| name == "cookie")
            .cloned()
            .unwrap();
        assert!(cookie.1.contains("sessionid=sess456"));

        // the rotated cookie landed in memory and on disk
        assert_eq!(
            manager.state().unwrap().cookies.get("sessionid").unwrap(),
            "rotated"
        );
        let saved = manager.cache.load().unwrap();
        assert_eq!(saved.cookies.get("sessionid").unwrap(), "rotated");
    }

    #[tokio::test]
    async fn fetch_without_session_is_an_auth_error() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(Vec::new()));
        let mut manager = manager(dir.path(), transport);

        let err = manager
            .fetch(BASE_URL, Method::Get, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AihlError::Auth { .. }));
    }

    #[test]
    fn state_round_trips_through_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(dir.path(), "aihl.tv");
        let mut state = SessionState::new(LOGIN_URL);
        state.cookies.insert("csrftoken".to_string(), "tok".to_string());
        state
            .cookies
            .insert("sessionid".to_string(), "sess".to_string());

        cache.save(&state).unwrap();
        assert_eq!(cache.load().unwrap(), state);
        assert!(cache.path().ends_with("aihl.tv_session.json"));
    }

    #[test]
    fn set_cookie_attributes_are_dropped() {
        let mut state = SessionState::new(LOGIN_URL);
        state.apply_set_cookie("sessionid=abc; Path=/; Expires=Wed, 21 Oct 2026 07:28:00 GMT");
        state.apply_set_cookie("malformed-without-pair");
        assert_eq!(state.cookies.get("sessionid").unwrap(), "abc");
        assert_eq!(state.cookies.len(), 1);
        assert_eq!(state.cookie_header(), "sessionid=abc");
    }
}
