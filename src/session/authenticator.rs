//! Session Authenticator
//!
//! The service offers no client-credentials grant, so the login runs the
//! browser flow by hand:
//!
//! 1. `GET oauth/auth` opens an anonymous session (cookie).
//! 2. `POST login_oauth.do` with the account; success is a 302.
//! 3. `GET oauth/auth` again, now logged in; scrape `oauth_token`.
//! 4. `POST oauth/approval.do`; scrape the code from `textarea#code`.
//! 5. `POST oauth/token` exchanges the code for an access token.
//!
//! Each step consumes the value produced by the previous one, so steps can
//! only run in order and each can be driven on its own in tests.

use super::html;
use super::transport::{HttpResponse, SessionTransport};
use crate::error::{
    SyncError, SyncResult, REASON_ACCESS_TOKEN_MISSING, REASON_CODE_MISSING,
    REASON_LOGIN_REJECTED, REASON_OAUTH_TOKEN_MISSING, REASON_UNEXPECTED_RESPONSE,
};
use crate::schema::MetricFamily;
use serde::Deserialize;
use std::fmt;

pub const AUTH_PATH: &str = "oauth/auth";
pub const LOGIN_PATH: &str = "login_oauth.do";
pub const APPROVAL_PATH: &str = "oauth/approval.do";
pub const TOKEN_PATH: &str = "oauth/token";

/// Redirect URI registered for "Client Application" type apps
pub const DEFAULT_REDIRECT_URI: &str = "https://www.healthplanet.jp/success.html";

const RESPONSE_TYPE: &str = "code";
const GRANT_TYPE: &str = "authorization_code";

/// Account and client credentials, fixed for the run
#[derive(Clone)]
pub struct Credentials {
    pub login_id: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login_id", &self.login_id)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Bearer credential for the rest of the run
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Cookie issued, not logged in
#[derive(Debug)]
pub struct AnonymousSession {
    _private: (),
}

/// Session cookie now carries the login
#[derive(Debug)]
pub struct LoggedInSession {
    _private: (),
}

/// Approval page scraped; holds its hidden `oauth_token`
#[derive(Debug)]
pub struct ApprovalForm {
    oauth_token: String,
}

impl ApprovalForm {
    pub fn oauth_token(&self) -> &str {
        &self.oauth_token
    }
}

/// One-time authorization code
#[derive(Debug)]
pub struct AuthorizationCode {
    code: String,
}

impl AuthorizationCode {
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Drives the login sequence over a transport it owns.
///
/// The transport (and with it the cookie jar) is dropped once the token has
/// been obtained.
pub struct Authenticator<T: SessionTransport> {
    transport: T,
    credentials: Credentials,
    base_url: String,
    redirect_uri: String,
    scope: &'static str,
}

impl<T: SessionTransport> Authenticator<T> {
    pub fn new(transport: T, credentials: Credentials, base_url: &str, family: MetricFamily) -> Self {
        Self {
            transport,
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: family.scope(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: &str) -> Self {
        self.redirect_uri = redirect_uri.to_string();
        self
    }

    /// Run all five steps and return the access token.
    pub async fn authenticate(self) -> SyncResult<AccessToken> {
        let anonymous = self.open().await?;
        let logged_in = self.login(anonymous).await?;
        let form = self.request_approval(logged_in).await?;
        let code = self.approve(form).await?;
        let token = self.exchange(code).await?;

        tracing::info!(scope = self.scope, "obtained access token");
        Ok(token)
    }

    fn auth_query(&self) -> [(&str, &str); 4] {
        [
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scope),
            ("response_type", RESPONSE_TYPE),
        ]
    }

    /// Absolute authorization URL, submitted as the login form's target.
    ///
    /// The query is left unescaped; the form encoding of `url` escapes it
    /// once, which is what the login page expects.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}/{}?client_id={}&redirect_uri={}&scope={}&response_type={}",
            self.base_url,
            AUTH_PATH,
            self.credentials.client_id,
            self.redirect_uri,
            self.scope,
            RESPONSE_TYPE
        )
    }

    /// Step 1: anonymous visit to the authorization page.
    ///
    /// Only the session cookie matters here, so any status is accepted.
    pub async fn open(&self) -> SyncResult<AnonymousSession> {
        let response = self.transport.get(AUTH_PATH, &self.auth_query()).await?;
        tracing::debug!(status = response.status, "opened anonymous session");
        Ok(AnonymousSession { _private: () })
    }

    /// Step 2: submit the account; anything but a 302 is a failed login
    pub async fn login(&self, _session: AnonymousSession) -> SyncResult<LoggedInSession> {
        let target = self.authorization_url();
        let form = [
            ("loginId", self.credentials.login_id.as_str()),
            ("passwd", self.credentials.password.as_str()),
            ("send", "1"),
            ("url", target.as_str()),
        ];

        let response = self.transport.post_form(LOGIN_PATH, &[], &form).await?;
        if response.status != 302 {
            tracing::warn!(status = response.status, "login was not redirected");
            return Err(SyncError::authentication(REASON_LOGIN_REJECTED));
        }

        tracing::debug!("login accepted");
        Ok(LoggedInSession { _private: () })
    }

    /// Step 3: authorization page again, now rendering the approval form
    pub async fn request_approval(&self, _session: LoggedInSession) -> SyncResult<ApprovalForm> {
        let response = self.transport.get(AUTH_PATH, &self.auth_query()).await?;
        ensure_success(&response, "authorization page")?;

        let page = html::normalize_page(response.content_type.as_deref(), &response.body);
        let oauth_token = html::input_value(&page, "oauth_token")
            .ok_or_else(|| SyncError::authentication(REASON_OAUTH_TOKEN_MISSING))?;

        tracing::debug!("approval form received");
        Ok(ApprovalForm { oauth_token })
    }

    /// Step 4: approve access and read the one-time code
    pub async fn approve(&self, form: ApprovalForm) -> SyncResult<AuthorizationCode> {
        let fields = [("approval", "true"), ("oauth_token", form.oauth_token.as_str())];
        let response = self.transport.post_form(APPROVAL_PATH, &[], &fields).await?;
        ensure_success(&response, "approval")?;

        let page = html::normalize_page(response.content_type.as_deref(), &response.body);
        let code = html::textarea_text(&page, "code")
            .ok_or_else(|| SyncError::authentication(REASON_CODE_MISSING))?;

        tracing::debug!("authorization code received");
        Ok(AuthorizationCode { code })
    }

    /// Step 5: trade the code for a bearer token
    pub async fn exchange(&self, code: AuthorizationCode) -> SyncResult<AccessToken> {
        let query = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code.as_str()),
            ("grant_type", GRANT_TYPE),
        ];

        let response = self.transport.post_form(TOKEN_PATH, &query, &[]).await?;
        let tokens: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            SyncError::Decode(format!(
                "token response (HTTP {}): {}",
                response.status, e
            ))
        })?;

        tokens
            .access_token
            .filter(|t| !t.is_empty())
            .map(AccessToken)
            .ok_or_else(|| SyncError::authentication(REASON_ACCESS_TOKEN_MISSING))
    }
}

fn ensure_success(response: &HttpResponse, what: &str) -> SyncResult<()> {
    if response.is_success() {
        Ok(())
    } else {
        tracing::warn!(status = response.status, "{} was not successful", what);
        Err(SyncError::authentication(REASON_UNEXPECTED_RESPONSE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::transport::testing::ScriptedTransport;
    use encoding_rs::SHIFT_JIS;
    use std::sync::Arc;

    const LOGIN_PAGE: &str = "<html><body><form action=\"/login_oauth.do\"></form></body></html>";
    const APPROVAL_PAGE: &str = r#"<html><body>
        <form action="/oauth/approval.do" method="post">
          <input type="hidden" name="oauth_token" value="otk-42">
        </form></body></html>"#;
    const CODE_PAGE: &str = r#"<html><body><textarea id="code" readonly>auth-code-7</textarea></body></html>"#;
    const TOKEN_JSON: &str = r#"{"access_token":"bearer-1","expires_in":2592000,"refresh_token":"r"}"#;

    fn credentials() -> Credentials {
        Credentials {
            login_id: "user@example.com".into(),
            password: "secret".into(),
            client_id: "cid".into(),
            client_secret: "csecret".into(),
        }
    }

    fn authenticator(transport: Arc<ScriptedTransport>) -> Authenticator<Arc<ScriptedTransport>> {
        Authenticator::new(
            transport,
            credentials(),
            "https://www.healthplanet.jp/",
            MetricFamily::Innerscan,
        )
    }

    fn happy_path() -> ScriptedTransport {
        ScriptedTransport::new()
            .respond(200, LOGIN_PAGE)
            .respond(302, "")
            .respond(200, APPROVAL_PAGE)
            .respond(200, CODE_PAGE)
            .respond_json(200, TOKEN_JSON)
    }

    #[tokio::test]
    async fn test_full_sequence() {
        let transport = Arc::new(happy_path());

        let token = authenticator(transport.clone()).authenticate().await.unwrap();
        assert_eq!(token.as_str(), "bearer-1");

        let requests = transport.requests();
        assert_eq!(requests.len(), 5);

        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, AUTH_PATH);
        assert_eq!(requests[0].query_value("scope"), Some("innerscan"));
        assert_eq!(requests[0].query_value("response_type"), Some("code"));

        assert_eq!(requests[1].path, LOGIN_PATH);
        assert_eq!(requests[1].form_value("loginId"), Some("user@example.com"));
        assert_eq!(requests[1].form_value("passwd"), Some("secret"));
        assert_eq!(requests[1].form_value("send"), Some("1"));
        assert_eq!(
            requests[1].form_value("url"),
            Some("https://www.healthplanet.jp/oauth/auth?client_id=cid&redirect_uri=https://www.healthplanet.jp/success.html&scope=innerscan&response_type=code")
        );

        assert_eq!(requests[3].path, APPROVAL_PATH);
        assert_eq!(requests[3].form_value("approval"), Some("true"));
        assert_eq!(requests[3].form_value("oauth_token"), Some("otk-42"));

        assert_eq!(requests[4].path, TOKEN_PATH);
        assert_eq!(requests[4].query_value("code"), Some("auth-code-7"));
        assert_eq!(requests[4].query_value("client_secret"), Some("csecret"));
        assert_eq!(requests[4].query_value("grant_type"), Some("authorization_code"));
    }

    #[tokio::test]
    async fn test_login_without_redirect_fails_fast() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(200, LOGIN_PAGE)
                .respond(200, LOGIN_PAGE)
                .respond(200, APPROVAL_PAGE),
        );

        let err = authenticator(transport.clone()).authenticate().await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::Authentication { ref reason } if reason == REASON_LOGIN_REJECTED
        ));
        // Nothing after the rejected login is attempted
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_on_anonymous_visit_is_accepted() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(302, "")
                .respond(302, "")
                .respond(200, APPROVAL_PAGE)
                .respond(200, CODE_PAGE)
                .respond_json(200, TOKEN_JSON),
        );

        let token = authenticator(transport.clone()).authenticate().await.unwrap();
        assert_eq!(token.as_str(), "bearer-1");

        let requests = transport.requests();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[1].path, LOGIN_PATH);
    }

    #[tokio::test]
    async fn test_approval_page_error_is_authentication_failure() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(200, LOGIN_PAGE)
                .respond(302, "")
                .respond(500, "<html>error</html>"),
        );

        let err = authenticator(transport.clone()).authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Authentication { ref reason } if reason == REASON_UNEXPECTED_RESPONSE
        ));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_approval_post_error_is_authentication_failure() {
        let transport = Arc::new(ScriptedTransport::new().respond(403, APPROVAL_PAGE));
        let auth = authenticator(transport);

        let err = auth
            .approve(ApprovalForm {
                oauth_token: "otk-42".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Authentication { ref reason } if reason == REASON_UNEXPECTED_RESPONSE
        ));
    }

    #[tokio::test]
    async fn test_missing_oauth_token() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(200, LOGIN_PAGE)
                .respond(302, "")
                .respond(200, LOGIN_PAGE),
        );

        let err = authenticator(transport).authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Authentication { ref reason } if reason == REASON_OAUTH_TOKEN_MISSING
        ));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(200, LOGIN_PAGE)
                .respond(302, "")
                .respond(200, APPROVAL_PAGE)
                .respond(200, "<html><body>denied</body></html>"),
        );

        let err = authenticator(transport).authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Authentication { ref reason } if reason == REASON_CODE_MISSING
        ));
    }

    #[tokio::test]
    async fn test_missing_access_token() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(200, LOGIN_PAGE)
                .respond(302, "")
                .respond(200, APPROVAL_PAGE)
                .respond(200, CODE_PAGE)
                .respond_json(400, r#"{"error":"invalid_grant"}"#),
        );

        let err = authenticator(transport).authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Authentication { ref reason } if reason == REASON_ACCESS_TOKEN_MISSING
        ));
    }

    #[tokio::test]
    async fn test_token_response_not_json() {
        let transport = Arc::new(ScriptedTransport::new().respond(500, "<html>error</html>"));
        let auth = authenticator(transport);

        let err = auth
            .exchange(AuthorizationCode { code: "c".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[tokio::test]
    async fn test_approval_page_in_shift_jis() {
        let page = r#"<html><head><meta charset="Shift_JIS"></head><body>
            <p>アプリケーションにアクセスを許可しますか</p>
            <input type="hidden" name="oauth_token" value="sjis-token"></body></html>"#;
        let (bytes, _, _) = SHIFT_JIS.encode(page);
        let transport = Arc::new(ScriptedTransport::new().respond_with(
            200,
            Some("text/html"),
            bytes.into_owned(),
        ));
        let auth = authenticator(transport);

        let form = auth
            .request_approval(LoggedInSession { _private: () })
            .await
            .unwrap();
        assert_eq!(form.oauth_token(), "sjis-token");
    }

    #[tokio::test]
    async fn test_blood_pressure_scope() {
        let transport = Arc::new(happy_path());
        let auth = Authenticator::new(
            transport.clone(),
            credentials(),
            "https://www.healthplanet.jp",
            MetricFamily::Sphygmomanometer,
        );

        auth.authenticate().await.unwrap();
        assert_eq!(
            transport.requests()[0].query_value("scope"),
            Some("sphygmomanometer")
        );
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = Arc::new(ScriptedTransport::new().fail("connection refused"));
        let err = authenticator(transport).authenticate().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?} {:?}", credentials(), AccessToken::new("bearer-1"));
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("csecret"));
        assert!(!debug.contains("bearer-1"));
    }
}
