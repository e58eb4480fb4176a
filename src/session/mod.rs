//! Session acquisition
//!
//! Turns a username/password into a bearer token by walking the service's
//! browser login flow over a cookie-persisting HTTP client.

pub mod authenticator;
pub mod html;
pub mod transport;

pub use authenticator::{
    AccessToken, AnonymousSession, ApprovalForm, AuthorizationCode, Authenticator, Credentials,
    LoggedInSession, DEFAULT_REDIRECT_URI,
};
pub use transport::{HttpResponse, ReqwestTransport, SessionTransport};
