//! # 缓存元数据模块
//!
//! ## 设计思路
//!
//! 服务端不做持久缓存，缓存职责通过 HTTP 头交给浏览器与 CDN：
//! 30 天浏览器缓存 + 1 年共享缓存 + 无限期 stale-while-revalidate。
//! 同一组变换参数的输出是稳定的，所以牺牲新鲜度换吞吐是可接受的。
//!
//! ## 实现思路
//!
//! - `ETag` 由 `{字节长度, 质量, 尺寸档位}` 确定性推导，
//!   相同请求无需内容哈希即可得到相同校验值。
//! - `X-Image-*` 头仅用于诊断，不参与缓存校验。

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH,
    CONTENT_TYPE, ETAG,
};

use super::transcoder::TranscodeResult;

/// 固定缓存策略：吞吐优先。
pub const CACHE_CONTROL_VALUE: &str =
    "public, max-age=2592000, s-maxage=31536000, stale-while-revalidate=31536000";

pub const HEADER_IMAGE_QUALITY: &str = "x-image-quality";
pub const HEADER_IMAGE_SIZE: &str = "x-image-size";
pub const HEADER_ORIGINAL_SIZE: &str = "x-original-size";

/// 单次响应的缓存与诊断元数据。
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    pub etag: String,
    pub quality: u8,
    pub size: &'static str,
    pub original_dimensions: String,
}

/// 从转码结果推导缓存元数据。
///
/// # 示例
/// ```rust,ignore
/// let metadata = build_cache_metadata(&result);
/// assert!(metadata.etag.starts_with('"'));
/// ```
pub fn build_cache_metadata(result: &TranscodeResult) -> CacheMetadata {
    CacheMetadata {
        etag: format!(
            "\"{:x}-q{}-{}\"",
            result.byte_length(),
            result.applied_quality,
            result.applied_size
        ),
        quality: result.applied_quality,
        size: result.applied_size,
        original_dimensions: format!("{}x{}", result.original_width, result.original_height),
    }
}

impl CacheMetadata {
    /// 组装完整响应头（含 CORS 与诊断头）。
    pub fn response_headers(&self, content_type: &'static str, byte_length: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Ok(length) = HeaderValue::from_str(&byte_length.to_string()) {
            headers.insert(CONTENT_LENGTH, length);
        }
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
        if let Ok(etag) = HeaderValue::from_str(&self.etag) {
            headers.insert(ETAG, etag);
        }
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        if let Ok(quality) = HeaderValue::from_str(&self.quality.to_string()) {
            headers.insert(HeaderName::from_static(HEADER_IMAGE_QUALITY), quality);
        }
        headers.insert(
            HeaderName::from_static(HEADER_IMAGE_SIZE),
            HeaderValue::from_static(self.size),
        );
        if let Ok(original) = HeaderValue::from_str(&self.original_dimensions) {
            headers.insert(HeaderName::from_static(HEADER_ORIGINAL_SIZE), original);
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(len: usize) -> TranscodeResult {
        TranscodeResult {
            bytes: vec![0u8; len],
            content_type: "image/webp",
            original_width: 800,
            original_height: 600,
            applied_quality: 95,
            applied_size: "small",
        }
    }

    #[test]
    fn etag_is_deterministic_for_identical_results() {
        let first = build_cache_metadata(&sample_result(1234));
        let second = build_cache_metadata(&sample_result(1234));

        assert_eq!(first.etag, second.etag);
    }

    #[test]
    fn etag_changes_with_byte_length() {
        let first = build_cache_metadata(&sample_result(1234));
        let second = build_cache_metadata(&sample_result(1235));

        assert_ne!(first.etag, second.etag);
    }

    #[test]
    fn headers_include_cache_policy_and_diagnostics() {
        let metadata = build_cache_metadata(&sample_result(100));
        let headers = metadata.response_headers("image/webp", 100);

        assert_eq!(
            headers
                .get(CACHE_CONTROL)
                .expect("cache-control should exist"),
            CACHE_CONTROL_VALUE
        );
        assert_eq!(
            headers
                .get(HEADER_IMAGE_QUALITY)
                .expect("quality header should exist"),
            "95"
        );
        assert_eq!(
            headers
                .get(HEADER_ORIGINAL_SIZE)
                .expect("original size header should exist"),
            "800x600"
        );
        assert_eq!(
            headers
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .expect("cors header should exist"),
            "*"
        );
    }
}
