use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    cancel::cancel,
    liveness::live,
    progress::get_progress,
    query::query,
    readiness::ready,
    sessions::{delete_session, get_session, list_sessions},
    upload::upload,
};

pub mod api_state;
pub mod error;
pub mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require auth)
    let protected = Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(
                app_state.config.max_upload_bytes as usize,
            )),
        )
        .route("/progress", get(get_progress))
        .route("/cancel", post(cancel))
        .route("/query", post(query))
        .route("/sessions", get(list_sessions))
        .route("/session", get(get_session).delete(delete_session))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
