use axum::http::StatusCode;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use common_http_errors::{exception_mapper_layer, ApiError};
use tower::ServiceExt;

async fn dyn_error(axum::extract::Path(n): axum::extract::Path<u32>) -> Result<&'static str, ApiError> {
    let code: &'static str = Box::leak(format!("dyn_code_{n}").into_boxed_str());
    Err(ApiError::bad_request(code, "synthetic"))
}

#[tokio::test]
async fn error_code_cardinality_guard_caps_labels() {
    let app = Router::new()
        .route("/err/:n", get(dyn_error))
        .layer(middleware::from_fn(exception_mapper_layer));

    // Fire more requests than MAX_ERROR_CODES (40) to trigger overflow bucketing.
    for n in 0..50 {
        let resp = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/err/{n}"))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    let families = common_http_errors::metrics::registry().gather();
    let counter = families
        .iter()
        .find(|f| f.get_name() == "gateway_http_errors_total")
        .expect("counter registered");
    assert!(counter.get_metric().iter().any(|m| m
        .get_label()
        .iter()
        .any(|l| l.get_name() == "error_code" && l.get_value() == "overflow")));
}
