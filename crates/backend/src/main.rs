mod catalog;
mod config;
mod engine;
mod graphql;
mod latest;
mod overpass;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{extract::State, response::Html, routing::get, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use catalog::LayerCatalog;
use config::Config;
use engine::{Engine, EngineSettings};
use graphql::Schema;
use overpass::OverpassClient;

async fn graphql_handler(State(schema): State<Schema>, req: GraphQLRequest) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn graphiql() -> Html<String> {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

/// Build the full application router.
fn build_app(schema: Schema) -> Router {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .with_state(schema)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal(engine: Arc<Engine>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
    engine.shutdown();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("enodia_backend=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    let catalog = match LayerCatalog::load(&config.assets_dir) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(error = %e, "Invalid layer catalog");
            std::process::exit(1);
        }
    };
    if let Some(layer) = config.default_layer.and_then(|c| catalog.find(c)) {
        tracing::info!(layer = %layer.display_name, "Default layer");
    }

    let client = match OverpassClient::new(config.overpass_url.clone(), config.query_timeout) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream client");
            std::process::exit(1);
        }
    };
    let engine = Arc::new(Engine::new(
        client,
        EngineSettings::from(&config),
        catalog.definitions,
    ));
    engine.spawn_refresh();

    let schema = graphql::build_schema(Arc::clone(&engine));
    let app = build_app(schema);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        area = %config.area_name,
        upstream = %config.overpass_url,
        "Server running at http://localhost:{}/graphql",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine))
        .await
        .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_app() -> Router {
        // Nothing in these tests reaches the upstream.
        let client = OverpassClient::new("http://127.0.0.1:9/api/interpreter", Duration::from_secs(1)).unwrap();
        let settings = EngineSettings::from(&Config::default());
        let engine = Arc::new(Engine::new(client, settings, LayerCatalog::builtin().definitions));
        build_app(graphql::build_schema(engine))
    }

    fn graphql_post(query: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/graphql")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "query": query }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_graphiql_is_served() {
        let resp = test_app()
            .oneshot(Request::builder().uri("/graphql").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_graphql_post_returns_layers() {
        let resp = test_app()
            .oneshot(graphql_post("{ layers { key enabled featureCount } }"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let layers = json["data"]["layers"].as_array().unwrap();
        assert_eq!(layers.len(), 5);
        assert_eq!(layers[0], serde_json::json!({"key": "ELECTRICITY", "enabled": true, "featureCount": 0}));
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let resp = test_app()
            .oneshot(graphql_post("{ ingestionStatus { state generation } }"))
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["ingestionStatus"], serde_json::json!({"state": "idle", "generation": null}));
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/graphql")
            .header(header::ORIGIN, "http://maps.example.org")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let resp = test_app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }

    #[tokio::test]
    async fn test_responses_are_compressed_on_request() {
        let req = Request::builder()
            .uri("/graphql")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();
        let resp = test_app().oneshot(req).await.unwrap();
        assert_eq!(resp.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
    }
}
