//! HTTP glue for the authenticator.
//!
//! Keeps the framework boundary thin: a middleware layer that runs the
//! authenticator and stashes the result in request extensions, plus the
//! response mapping for failures. Handlers downstream only ever see
//! [`AuthenticatedUser`].

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{ApiTokenAuthenticator, AuthError, User, UserAuthorization};

/// Identity attached to a request that presented a valid credential.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub authorization: UserAuthorization,
}

/// Build the application router with authentication applied to every route.
pub fn router(authenticator: Arc<ApiTokenAuthenticator>) -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn_with_state(
            authenticator,
            authenticate_request,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serve the router on the given bind address.
pub async fn serve(bind: &str, authenticator: Arc<ApiTokenAuthenticator>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {}", bind);
    axum::serve(listener, router(authenticator)).await?;
    Ok(())
}

/// Middleware running the authentication pipeline.
///
/// A request with no credential passes through anonymously; failures are
/// mapped to responses here and never reach the handlers.
async fn authenticate_request(
    State(authenticator): State<Arc<ApiTokenAuthenticator>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let outcome = authenticator.authenticate(&parts).await;
    let mut request = Request::from_parts(parts, body);

    match outcome {
        Ok(Some((user, authorization))) => {
            request
                .extensions_mut()
                .insert(AuthenticatedUser {
                    user,
                    authorization,
                });
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(error) => failure_response(&authenticator, error),
    }
}

/// Map an authentication failure to an HTTP response.
///
/// A provider-metadata outage is the server's problem, not the caller's,
/// so `ConfigFetch` surfaces as 503. Everything else is a 401 carrying the
/// WWW-Authenticate challenge.
fn failure_response(authenticator: &ApiTokenAuthenticator, error: AuthError) -> Response {
    match error {
        AuthError::ConfigFetch(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, error.to_string()).into_response()
        }
        _ => {
            let mut response = (StatusCode::UNAUTHORIZED, error.to_string()).into_response();
            let challenge = HeaderValue::from_str(&authenticator.authenticate_header())
                .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));
            response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
            response
        }
    }
}

async fn whoami(user: Option<Extension<AuthenticatedUser>>) -> Json<serde_json::Value> {
    match user {
        Some(Extension(auth)) => Json(json!({
            "authenticated": true,
            "sub": auth.user.external_id.as_str(),
            "email": auth.user.email,
            "scopes": auth.authorization.api_scopes(),
        })),
        None => Json(json!({"authenticated": false})),
    }
}

async fn healthz() -> &'static str {
    "ok"
}
