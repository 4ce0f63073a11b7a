//! # 取源模块
//!
//! ## 设计思路
//!
//! 统一处理已通过允许列表校验的源图下载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 伪装桌面浏览器 UA / Accept，并把 Referer 指向源站自身，绕过常见防盗链。
//! - 流式下载 + 体积上限 + 首包/分块超时，避免一次性读入导致内存峰值过高。
//! - 流式阶段用文件签名（magic bytes）尽早拒绝非图片内容。
//! - 短 TTL 缓存吸收突发的同 URL 重复请求。

use std::time::Duration;

use super::handler::{CachedOriginBytes, ProxyHandler};
use super::{ProxyConfig, ProxyError};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const IMAGE_ACCEPT: &str =
    "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// 取源结果：原始字节与上游声明的内容类型。
///
/// 内容类型仅作诊断参考，转码阶段会重新推断真实格式。
pub(super) struct FetchedOrigin {
    pub(super) bytes: Vec<u8>,
    #[allow(dead_code)]
    pub(super) content_type: Option<String>,
}

impl ProxyHandler {
    /// 下载已校验的源图字节。
    pub(super) async fn fetch_origin(
        &self,
        url: &reqwest::Url,
        config: &ProxyConfig,
    ) -> Result<FetchedOrigin, ProxyError> {
        log::info!("🌐 开始取源 - URL: {}", Self::redact_url_for_log(url.as_str()));

        if let Some(cached) = self.get_cached_origin(url.as_str(), config) {
            log::debug!("♻️ 命中取源短缓存 - {} bytes", cached.len());
            return Ok(FetchedOrigin {
                bytes: cached,
                content_type: None,
            });
        }

        let client = Self::build_origin_client(config)?;
        let referer = format!(
            "{}://{}/",
            url.scheme(),
            url.host_str().unwrap_or_default()
        );

        let response = client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::ACCEPT, IMAGE_ACCEPT)
            .header(reqwest::header::REFERER, referer)
            .send()
            .await
            .map_err(|e| Self::map_reqwest_error(e, url.as_str(), config))?;

        if !response.status().is_success() {
            return Err(ProxyError::UpstreamHttpError {
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = content_type.as_deref() {
            if !Self::is_image_content_type(ct) && ct != "application/octet-stream" {
                return Err(ProxyError::UnsupportedImage(format!(
                    "上游内容类型不是图片：{}",
                    ct
                )));
            }
        }

        let declared_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());

        if let Some(size) = declared_len {
            if size > config.max_file_size {
                return Err(ProxyError::ResourceLimit(format!(
                    "源图过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    config.max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let bytes = Self::read_stream_with_limits(response, declared_len, config).await?;

        self.store_cached_origin(url.as_str(), &bytes, config);
        log::debug!("✅ 取源完成 - {} bytes", bytes.len());

        Ok(FetchedOrigin {
            bytes,
            content_type,
        })
    }

    /// 流式读取响应体，同时执行体积上限与签名探测。
    async fn read_stream_with_limits(
        mut response: reqwest::Response,
        declared_len: Option<u64>,
        config: &ProxyConfig,
    ) -> Result<Vec<u8>, ProxyError> {
        let initial_capacity = declared_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);

        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        ProxyError::UpstreamTimeout("下载数据流读取超时".to_string())
                    } else {
                        ProxyError::UpstreamTimeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result
                .map_err(|e| ProxyError::UpstreamNetworkError(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;
            total = total.saturating_add(chunk.len() as u64);

            if total > config.max_file_size {
                return Err(ProxyError::ResourceLimit(
                    "下载后文件超过大小限制".to_string(),
                ));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    Self::validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        if !signature_validated {
            Self::validate_image_signature(&buffer)?;
        }

        Ok(buffer)
    }

    fn build_origin_client(config: &ProxyConfig) -> Result<reqwest::Client, ProxyError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ProxyError::UpstreamNetworkError(format!("无法创建 HTTP 客户端：{}", e)))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &ProxyConfig) -> ProxyError {
        let err_msg = Self::sanitize_error_message_with_redacted_url(&e.to_string(), url);

        if e.is_timeout() {
            ProxyError::UpstreamTimeout(format!("取源超时（{}秒）", config.fetch_timeout))
        } else if e.is_connect() {
            ProxyError::UpstreamNetworkError(format!("无法连接：{}", err_msg))
        } else {
            ProxyError::UpstreamNetworkError(format!("请求失败：{}", err_msg))
        }
    }

    pub(super) fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    /// 日志用 URL 脱敏：去掉查询串与片段。
    pub(super) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

        format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
    }

    fn sanitize_error_message_with_redacted_url(error_msg: &str, url: &str) -> String {
        let redacted = Self::redact_url_for_log(url);
        error_msg.replace(url, &redacted)
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    pub(super) fn validate_image_signature(bytes: &[u8]) -> Result<(), ProxyError> {
        if bytes.is_empty() {
            return Err(ProxyError::UnsupportedImage("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ProxyError::UnsupportedImage("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ProxyError::UnsupportedImage(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测：尽早识别并拒绝非图片内容。
    ///
    /// 返回值：
    /// - `Ok(true)`：已识别为图片，可视为完成签名校验
    /// - `Ok(false)`：当前字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    pub(super) fn validate_stream_signature_probe(
        bytes: &[u8],
        probe_limit: usize,
    ) -> Result<bool, ProxyError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(ProxyError::UnsupportedImage(format!(
                    "下载内容不是图片类型：{}",
                    kind.mime_type()
                )));
            }
            return Ok(true);
        }

        if bytes.len() >= probe_limit {
            return Err(ProxyError::UnsupportedImage(format!(
                "下载前 {} 字节内无法识别图片类型",
                probe_limit
            )));
        }

        Ok(false)
    }

    fn get_cached_origin(&self, url: &str, config: &ProxyConfig) -> Option<Vec<u8>> {
        let mut cache = match self.download_cache.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };

        let ttl = Duration::from_secs(config.download_cache_ttl_secs);
        cache.retain(|_, item| item.created_at.elapsed() <= ttl);
        cache.get(url).map(|item| item.bytes.clone())
    }

    fn store_cached_origin(&self, url: &str, bytes: &[u8], config: &ProxyConfig) {
        if bytes.is_empty() {
            return;
        }

        let mut cache = match self.download_cache.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        let ttl = Duration::from_secs(config.download_cache_ttl_secs);
        cache.retain(|_, item| item.created_at.elapsed() <= ttl);

        if cache.len() >= config.download_cache_max_entries {
            if let Some(oldest_key) = cache
                .iter()
                .min_by_key(|(_, item)| item.created_at)
                .map(|(key, _)| key.clone())
            {
                cache.remove(&oldest_key);
            }
        }

        cache.insert(
            url.to_string(),
            CachedOriginBytes {
                created_at: std::time::Instant::now(),
                bytes: bytes.to_vec(),
            },
        );
    }
}
