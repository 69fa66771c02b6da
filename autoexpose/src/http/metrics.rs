use std::net::SocketAddr;
use std::sync::{Arc, PoisonError};

use autoexpose_controller::metrics::REGISTRY;
use axum::{
    Router,
    extract::State as AxumState,
    response::{IntoResponse, Response},
    routing::get,
};
use http::{StatusCode, header::CONTENT_TYPE};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Result, http::shutdown};

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone)]
pub(crate) struct State {
    ready: CancellationToken,
}

impl State {
    pub fn new(token: CancellationToken) -> Self {
        Self { ready: token }
    }

    pub fn ready(&self) -> Readiness {
        if self.ready.is_cancelled() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        match prometheus_client::encoding::text::encode(&mut buffer, &registry) {
            Ok(()) => buffer,
            Err(e) => {
                warn!(%e, "failed to encode metrics");
                String::new()
            }
        }
    }
}

pub(crate) async fn serve(
    addr: SocketAddr,
    state: Arc<State>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("metrics listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown(cancel))
        .await?;
    Ok(())
}

pub(crate) fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn readyz(AxumState(handler): AxumState<Arc<State>>) -> Readiness {
    handler.ready()
}

async fn metrics(AxumState(handler): AxumState<Arc<State>>) -> Response {
    ([(CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], handler.metrics()).into_response()
}

pub(crate) enum Readiness {
    Ready,
    NotReady,
}

impl IntoResponse for Readiness {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Readiness::Ready => (StatusCode::OK, "Ok"),
            Readiness::NotReady => (StatusCode::INTERNAL_SERVER_ERROR, "NotReady"),
        };
        (status, [(CONTENT_TYPE, "text/plain")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use tower::ServiceExt;

    use super::*;

    async fn get_status(state: Arc<State>, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router(state).oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_readyz_follows_token() {
        let ready = CancellationToken::new();
        let state = Arc::new(State::new(ready.clone()));

        assert_eq!(
            get_status(state.clone(), "/readyz").await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        ready.cancel();
        assert_eq!(get_status(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = Arc::new(State::new(CancellationToken::new()));
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            OPENMETRICS_CONTENT_TYPE
        );
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("# EOF"));
    }
}
