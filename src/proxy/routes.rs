//! # HTTP 路由层
//!
//! ## 设计思路
//!
//! 路由层仅做查询参数接收与响应组装，不承载业务逻辑。
//! 所有实际处理交由 `ProxyHandler`，保持端点函数薄、稳定、易测试。
//!
//! ## 实现思路
//!
//! - `GET /image`：完整代理链路，成功返回图片字节与缓存头。
//! - `OPTIONS /image`：CORS 预检，放行任意来源。
//! - 错误只允许三种固定 JSON 形态，状态码与文案由 `ProxyError` 给出。

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::{ImageRequest, ProxyError, ProxyHandler};

/// `GET /image` 的查询参数。
///
/// 除 `url` 外全部可选，未知取值宽松回退（见参数模型模块）。
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub url: Option<String>,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub format: Option<String>,
    pub blur: Option<String>,
}

/// 组装代理路由。
///
/// # 示例
/// ```rust
/// use std::sync::Arc;
/// use image_relay::proxy::{router, DomainAllowlist, ProxyConfig, ProxyHandler};
///
/// let handler = ProxyHandler::new(DomainAllowlist::default(), ProxyConfig::default())?;
/// let app = router(Arc::new(handler));
/// # let _ = app;
/// # Ok::<(), image_relay::proxy::ProxyError>(())
/// ```
pub fn router(handler: Arc<ProxyHandler>) -> Router {
    Router::new()
        .route("/image", get(image_endpoint).options(image_preflight))
        .with_state(handler)
}

async fn image_endpoint(
    State(handler): State<Arc<ProxyHandler>>,
    Query(query): Query<ImageQuery>,
) -> Response {
    let request = match ImageRequest::from_query(
        query.url,
        query.size.as_deref(),
        query.quality.as_deref(),
        query.format.as_deref(),
        query.blur.as_deref(),
    ) {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };

    match handler.handle(&request).await {
        Ok(outcome) => {
            let headers = outcome
                .metadata
                .response_headers(outcome.result.content_type, outcome.result.byte_length());

            (StatusCode::OK, headers, outcome.result.bytes).into_response()
        }
        Err(err) => error_response(&err),
    }
}

/// CORS 预检：放行任意来源的 GET 请求。
async fn image_preflight() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );

    (StatusCode::NO_CONTENT, headers).into_response()
}

/// 把业务错误映射为固定 JSON 形态，绝不透出内部细节。
fn error_response(err: &ProxyError) -> Response {
    log::warn!(
        "⚠️ 代理请求失败 - stage={} code={} detail={}",
        err.stage(),
        err.code(),
        err
    );

    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    (
        err.http_status(),
        headers,
        Json(serde_json::json!({ "error": err.client_message() })),
    )
        .into_response()
}
