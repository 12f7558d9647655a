use crate::config::Config;
use crate::lookup::{LookupError, ProductLookup};
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct ApiState {
    lookup: ProductLookup,
    strict_status_codes: bool,
}

#[derive(Deserialize, Debug)]
struct Params {
    term: Option<String>,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(message: String, client_error: bool, strict_status_codes: bool) -> Self {
        // Every failure is reported as a server error unless strict status codes
        // are enabled.
        let status = if client_error && strict_status_codes {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError { status, message }
    }

    fn from_lookup(err: LookupError, strict_status_codes: bool) -> Self {
        ApiError::new(err.to_string(), err.is_client_error(), strict_status_codes)
    }

    fn from_rejection(rejection: QueryRejection, strict_status_codes: bool) -> Self {
        ApiError::new(rejection.body_text(), true, strict_status_codes)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Allows every origin. The header is added to success and error responses
/// alike, and preflight requests are answered here.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn router(lookup: ProductLookup, route: &str, strict_status_codes: bool) -> Router {
    let state = ApiState {
        lookup,
        strict_status_codes,
    };

    Router::new()
        .route(route, get(handler))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handler(
    State(state): State<ApiState>,
    params: Result<Query<Params>, QueryRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let Query(params) = params.map_err(|rejection| {
        tracing::error!(error = %rejection, "Invalid query string");
        ApiError::from_rejection(rejection, state.strict_status_codes)
    })?;

    state
        .lookup
        .lookup(params.term.as_deref())
        .await
        .map(Json)
        .map_err(|err| {
            tracing::error!(error = %err, term = ?params.term, "Product lookup failed");
            ApiError::from_lookup(err, state.strict_status_codes)
        })
}

pub async fn serve(config: &Config, lookup: ProductLookup) -> Result<(), std::io::Error> {
    let app = router(lookup, &config.route, config.strict_status_codes);

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, route = %config.route, "Serving product lookups");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockStore;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(store: MockStore, strict_status_codes: bool) -> (Router, Arc<MockStore>) {
        let store = Arc::new(store);
        let lookup = ProductLookup::new(store.clone());
        (router(lookup, "/", strict_status_codes), store)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::ORIGIN, "https://shop.example.com")
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let allow_origin = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, allow_origin, body)
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (app, _store) = app_with(
            MockStore::default().with_product("widget1", &["\"a\"", "{\"x\":1}"]),
            false,
        );

        let (status, allow_origin, body) = send(app, get_request("/?term=Widget1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert_eq!(body, json!(["a", {"x": 1}]));
    }

    #[tokio::test]
    async fn test_missing_term() {
        for uri in ["/", "/?term=", "/?other=1"] {
            let (app, store) = app_with(MockStore::default(), false);

            let (status, allow_origin, body) = send(app, get_request(uri)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "uri {uri}");
            assert_eq!(allow_origin.as_deref(), Some("*"));
            assert!(body["error"].as_str().unwrap().contains("Key not provided"));
            assert!(store.requested().is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_term_strict_status_codes() {
        let (app, store) = app_with(MockStore::default(), true);

        let (status, allow_origin, _body) = send(app, get_request("/")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert!(store.requested().is_empty());

        // Other failures stay server errors.
        let (app, _store) = app_with(MockStore::default(), true);
        let (status, _, _) = send(app, get_request("/?term=widget1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_duplicate_term_is_rejected() {
        let (app, store) = app_with(MockStore::default(), false);

        let (status, allow_origin, body) = send(app, get_request("/?term=a&term=b")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert!(body["error"].is_string());
        assert!(store.requested().is_empty());
    }

    #[tokio::test]
    async fn test_not_found() {
        let (app, store) = app_with(MockStore::default(), false);

        let (status, allow_origin, body) = send(app, get_request("/?term=WIDGET1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert_eq!(
            body,
            json!({"error": "No entity found for key products/widget1."})
        );
        assert_eq!(store.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_match() {
        let (app, _store) = app_with(
            MockStore::default().with_product("widget1", &["\"a\"", "not-json"]),
            false,
        );

        let (status, allow_origin, body) = send(app, get_request("/?term=widget1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert!(body.is_object());
        assert!(body["error"].as_str().unwrap().contains("products/widget1"));
    }

    #[tokio::test]
    async fn test_store_unavailable() {
        let (app, _store) = app_with(MockStore::unavailable(), false);

        let (status, allow_origin, body) = send(app, get_request("/?term=widget1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_preflight() {
        let (app, store) = app_with(MockStore::default(), false);

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/?term=widget1")
            .header(header::ORIGIN, "https://shop.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();

        let (status, allow_origin, _body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(allow_origin.as_deref(), Some("*"));
        assert!(store.requested().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_requests_are_identical() {
        let (app, _store) = app_with(
            MockStore::default().with_product("widget1", &["{\"x\":1}", "2"]),
            false,
        );

        let first = send(app.clone(), get_request("/?term=widget1")).await;
        let second = send(app, get_request("/?term=widget1")).await;
        assert_eq!(first, second);
        assert_eq!(first.2, json!([{"x": 1}, 2]));
    }

    #[tokio::test]
    async fn test_custom_route() {
        let store = Arc::new(MockStore::default().with_product("widget1", &["1"]));
        let app = router(ProductLookup::new(store), "/products", false);

        let (status, _, body) = send(app.clone(), get_request("/products?term=widget1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([1]));

        let (status, _, _) = send(app, get_request("/?term=widget1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
