use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::admin::AdminState;
use crate::destination::{DestinationEntry, Snapshot};
use crate::reconcile::{CommitReceipt, Proposal, ProposalSource, ReconcileError};
use crate::relay::SessionStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub listen_address: SocketAddr,
    pub generation: u64,
    pub destinations: usize,
    pub baseline_revision: u64,
    pub sessions: SessionStats,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.engine.destinations();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        listen_address: state.engine.local_addr(),
        generation: snapshot.generation,
        destinations: snapshot.len(),
        baseline_revision: state.handle.baseline().revision,
        sessions: state.engine.sessions().stats().await,
    })
}

pub async fn get_destinations(State(state): State<AdminState>) -> Json<Snapshot> {
    Json(Snapshot::clone(&state.engine.destinations()))
}

/// Replace the destination set with the pushed list.
pub async fn push_destinations(
    State(state): State<AdminState>,
    body: Bytes,
) -> Result<Json<CommitReceipt>, (StatusCode, String)> {
    let items: Vec<Value> = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejected admin push with unparsable body");
        (StatusCode::BAD_REQUEST, format!("expected a JSON array of destinations: {e}"))
    })?;

    let mut entries = Vec::with_capacity(items.len());
    let mut rejected = 0;
    for item in items {
        match serde_json::from_value::<DestinationEntry>(item) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed destination entry");
                rejected += 1;
            }
        }
    }

    let proposal = Proposal::from_entries(ProposalSource::Admin, entries).with_skipped(rejected);
    match state.handle.propose(proposal).await {
        Ok(receipt) => Ok(Json(receipt)),
        Err(e @ ReconcileError::Closed) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
        Err(e) => Err((StatusCode::CONFLICT, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use crate::admin::{setup_admin_router, AdminState};
    use crate::destination::{Destination, DestinationRegistry};
    use crate::lifecycle::Shutdown;
    use crate::reconcile::ReconciliationController;
    use crate::relay::{LoggingObserver, RelayEngine};
    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const TOKEN: &str = "s3cret";

    async fn setup() -> (Router, Arc<DestinationRegistry>, Shutdown) {
        let registry = Arc::new(DestinationRegistry::new());
        let (controller, handle) = ReconciliationController::new(registry.clone());
        let shutdown = Shutdown::new();
        tokio::spawn(controller.run(shutdown.subscribe()));
        let engine = RelayEngine::bind(
            "127.0.0.1:0".parse().unwrap(),
            registry.clone(),
            Arc::new(LoggingObserver),
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        let router = setup_admin_router(AdminState::new(handle, Arc::new(engine), TOKEN));
        (router, registry, shutdown)
    }

    fn request(method: Method, uri: &str, auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_unauthorized() {
        let (router, _registry, _shutdown) = setup().await;

        for auth in [None, Some("Bearer nope"), Some("nope")] {
            let response = router
                .clone()
                .oneshot(request(Method::GET, "/admin/status", auth, ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
        }
    }

    #[tokio::test]
    async fn push_replaces_set_and_skips_malformed_entries() {
        let (router, registry, _shutdown) = setup().await;
        let body = r#"[
            {"name": "a", "addr": "10.0.0.1:53"},
            {"name": "b", "address": "10.0.0.2:53"},
            {"name": "c"},
            {"name": 7, "addr": "10.0.0.4:53"}
        ]"#;

        let response = router
            .oneshot(request(Method::POST, "/admin/destinations", Some("Bearer s3cret"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let receipt = json(response).await;
        assert_eq!(receipt["generation"], 1);
        assert_eq!(receipt["source"], "admin");
        assert_eq!(receipt["destinations"], 2);
        assert_eq!(receipt["skipped"], 2);
        assert_eq!(
            registry.current().destinations,
            vec![
                Destination::new("a", "10.0.0.1:53").unwrap(),
                Destination::new("b", "10.0.0.2:53").unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn root_push_accepts_bare_token() {
        let (router, registry, _shutdown) = setup().await;
        let response = router
            .oneshot(request(Method::POST, "/", Some(TOKEN), r#"[{"name":"a","addr":"10.0.0.1:53"}]"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(registry.current().len(), 1);
    }

    #[tokio::test]
    async fn unparsable_body_is_bad_request() {
        let (router, registry, _shutdown) = setup().await;
        let response = router
            .oneshot(request(Method::POST, "/admin/destinations", Some(TOKEN), "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(registry.current().generation, 0);
    }

    #[tokio::test]
    async fn push_after_shutdown_is_unavailable() {
        let (router, _registry, shutdown) = setup().await;
        shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = router
            .oneshot(request(Method::POST, "/admin/destinations", Some(TOKEN), "[]"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn reads_report_snapshot_and_status() {
        let (router, _registry, _shutdown) = setup().await;
        let push = r#"[{"name":"a","addr":"10.0.0.1:53"}]"#;
        router
            .clone()
            .oneshot(request(Method::POST, "/admin/destinations", Some(TOKEN), push))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(request(Method::GET, "/admin/destinations", Some(TOKEN), ""))
            .await
            .unwrap();
        let snapshot = json(response).await;
        assert_eq!(snapshot["generation"], 1);
        assert_eq!(snapshot["destinations"][0]["name"], "a");
        assert_eq!(snapshot["destinations"][0]["addr"], "10.0.0.1:53");

        let response = router
            .oneshot(request(Method::GET, "/admin/status", Some(TOKEN), ""))
            .await
            .unwrap();
        let status = json(response).await;
        assert_eq!(status["status"], "operational");
        assert_eq!(status["destinations"], 1);
        assert_eq!(status["baseline_revision"], 1);
        assert_eq!(status["sessions"]["active_sessions"], 0);
    }
}
