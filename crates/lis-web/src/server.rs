//! Web服务器

use axum::{
    routing::{get, post, put},
    Router,
};
use lis_core::Result;
use lis_lab::LabEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    acknowledge_alert, api_root, create_order, get_order, get_results, get_stats, health,
    list_alerts, list_catalog, list_escalations, list_orders, patient_orders, provider_orders,
    submit_result, transition_order, upsert_catalog,
};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, engine: Arc<LabEngine>) -> Self {
        let app = Self::create_app(engine);

        Self { addr, app }
    }

    fn create_app(engine: Arc<LabEngine>) -> Router {
        Router::new()
            // 根路径
            .route("/", get(api_root))

            // 健康检查
            .route("/health", get(health))

            // API路由
            .nest("/api/v1", api_routes())
            .with_state(engine)

            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

/// API v1 路由
fn api_routes() -> Router<Arc<LabEngine>> {
    Router::new()
        .route("/", get(api_root))
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/transition", post(transition_order))
        .route("/orders/:id/results", get(get_results).post(submit_result))
        .route("/patients/:id/orders", get(patient_orders))
        .route("/providers/:id/orders", get(provider_orders))
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/escalations", get(list_escalations))
        .route("/stats", get(get_stats))
        .route("/catalog", get(list_catalog))
        .route("/catalog/:code", put(upsert_catalog))
}
