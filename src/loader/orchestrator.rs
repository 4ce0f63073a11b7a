//! # 加载编排模块
//!
//! ## 设计思路
//!
//! 编排器把回退链、重试决策、字节缓存、并发闸门串成完整加载流程，
//! 并通过 watch 通道把状态推给订阅方。核心约束：
//!
//! - 占位图候选永远成功，链路不存在“全部失败”的终态。
//! - 每次 `load` / `retry` 产生新的代数（generation），旧任务的
//!   后续发送全部被丢弃，杜绝过期结果覆盖新结果。
//! - 低保真候选成功后，若备有升级 URL，则后台静默换成高保真。
//!
//! ## 实现思路
//!
//! - `Semaphore` 限全局并发；省流量或慢网络时单次加载占双倍配额，
//!   等效并发减半。
//! - 近期加载耗时滚动采样，平均值超阈值即判定慢网络。
//! - 成功字节按最终请求 URL 写入 LRU 缓存，失败不写。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use tokio::sync::{watch, Semaphore};

use super::{
    next_step, resolve_chain, AttemptOutcome, Candidate, CandidateKind, ChainPosition, ChainStep,
    ImageByteCache, LoadConfig, LoadError, LoadRequest,
};

/// 近期耗时采样窗口大小。
const RECENT_SAMPLE_WINDOW: usize = 8;

/// 加载状态机的三个状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Success,
    Error,
}

impl LoadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// 推送给订阅方的加载结果快照。
#[derive(Debug, Clone)]
pub struct ImageLoadResult {
    /// 当前展示内容对应的 URL。
    pub url: String,
    pub status: LoadStatus,
    /// 成功来源；加载中为 `None`。
    pub source: Option<CandidateKind>,
    /// 最近一个失败候选上的失败次数。
    pub retry_count: u32,
    /// 从发起到当前状态的耗时（毫秒）。
    pub load_time_ms: u64,
    /// 最近一次失败的描述；候选成功后保留以便诊断，质量升级快照中清空。
    pub error: Option<String>,
    /// 成功时的图片字节。
    pub bytes: Option<Arc<Vec<u8>>>,
}

impl ImageLoadResult {
    fn loading(url: String) -> Self {
        Self {
            url,
            status: LoadStatus::Loading,
            source: None,
            retry_count: 0,
            load_time_ms: 0,
            error: None,
            bytes: None,
        }
    }
}

/// 图片加载编排器。
///
/// 实例内部全部为共享状态，用 `Arc` 包裹后可被任意多个调用方复用。
pub struct ImageLoader {
    config: LoadConfig,
    client: reqwest::Client,
    cache: ImageByteCache,
    permits: Arc<Semaphore>,
    recent_load_ms: Mutex<VecDeque<u64>>,
}

/// 单次加载的控制句柄。
///
/// 析构即取消：句柄丢弃后，在途任务的一切发送都会被丢弃。
pub struct LoadHandle {
    loader: Arc<ImageLoader>,
    request: LoadRequest,
    sender: watch::Sender<ImageLoadResult>,
    updates: watch::Receiver<ImageLoadResult>,
    generation: Arc<AtomicU64>,
}

impl ImageLoader {
    /// 创建编排器，配置非法时立即失败。
    pub fn new(config: LoadConfig) -> Result<Arc<Self>, LoadError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.attempt_timeout_ms.min(8_000)))
            .timeout(Duration::from_millis(config.attempt_timeout_ms))
            .build()
            .map_err(|e| LoadError::InvalidConfig(format!("HTTP 客户端构建失败: {e}")))?;

        let cache = ImageByteCache::new(config.cache_capacity)?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_loads));

        Ok(Arc::new(Self {
            config,
            client,
            cache,
            permits,
            recent_load_ms: Mutex::new(VecDeque::with_capacity(RECENT_SAMPLE_WINDOW)),
        }))
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// 发起一次加载，返回可订阅、可重试的句柄。
    pub fn load(self: &Arc<Self>, request: LoadRequest) -> LoadHandle {
        let initial = ImageLoadResult::loading(request.original_url.clone());
        let (sender, updates) = watch::channel(initial);
        let generation = Arc::new(AtomicU64::new(0));

        let handle = LoadHandle {
            loader: Arc::clone(self),
            request,
            sender,
            updates,
            generation,
        };
        handle.start_generation();
        handle
    }

    /// 预热：在不建立任何展示状态的情况下，把首个远程候选拉进字节缓存。
    ///
    /// 失败静默忽略，后续正式加载会按完整回退链重新处理。
    pub fn preload(self: &Arc<Self>, request: &LoadRequest) {
        let chain = resolve_chain(request, &self.config);
        let Some(candidate) = chain
            .into_iter()
            .find(|c| c.kind != CandidateKind::Placeholder)
        else {
            return;
        };

        let loader = Arc::clone(self);
        tokio::spawn(async move {
            let permit = loader.permits.acquire_many(loader.permit_width()).await;
            if permit.is_err() {
                return;
            }
            if let Err(err) = loader.fetch_candidate(&candidate.url).await {
                log::debug!("🧩 预热失败，忽略 - detail={err}");
            }
        });
    }

    /// 本次加载应占用的并发配额宽度。
    ///
    /// 省流量或慢网络时占双份，等效并发减半；并发上限为 1 时不收紧。
    fn permit_width(&self) -> u32 {
        if self.config.max_concurrent_loads < 2 {
            return 1;
        }
        if self.config.data_saver || self.network_is_slow() {
            2
        } else {
            1
        }
    }

    fn network_is_slow(&self) -> bool {
        let samples = match self.recent_load_ms.lock() {
            Ok(samples) => samples,
            Err(_) => return false,
        };
        if samples.is_empty() {
            return false;
        }

        let total: u64 = samples.iter().sum();
        total / samples.len() as u64 > self.config.slow_network_threshold_ms
    }

    fn record_load_time(&self, elapsed_ms: u64) {
        if let Ok(mut samples) = self.recent_load_ms.lock() {
            if samples.len() == RECENT_SAMPLE_WINDOW {
                samples.pop_front();
            }
            samples.push_back(elapsed_ms);
        }
    }

    /// 拉取单个候选的字节。
    ///
    /// 顺序：内联 data URL → 字节缓存 → 网络请求。
    async fn fetch_candidate(&self, url: &str) -> Result<Arc<Vec<u8>>, LoadError> {
        if url.starts_with("data:") {
            return Ok(Arc::new(decode_data_url(url)));
        }

        if let Some(bytes) = self.cache.get(url) {
            log::debug!("♻️ 字节缓存命中 - url={url}");
            return Ok(bytes);
        }

        let timeout = Duration::from_millis(self.config.attempt_timeout_ms);

        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| LoadError::Timeout(format!("请求超过 {} 毫秒", timeout.as_millis())))?
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = tokio::time::timeout(timeout, response.bytes())
            .await
            .map_err(|_| LoadError::Timeout(format!("读取响应体超过 {} 毫秒", timeout.as_millis())))?
            .map_err(map_reqwest_error)?;

        let bytes = Arc::new(body.to_vec());
        self.cache.store(url, Arc::clone(&bytes));
        Ok(bytes)
    }

    /// 走完整条回退链，直到某个候选成功。
    ///
    /// 链尾占位图不依赖网络，必然成功，因此该循环必然终止。
    async fn run_chain(
        self: Arc<Self>,
        chain: Vec<Candidate>,
        sender: watch::Sender<ImageLoadResult>,
        generation: Arc<AtomicU64>,
        my_generation: u64,
    ) {
        let started = Instant::now();
        let mut position = ChainPosition::start();
        let mut retry_count = 0u32;
        let mut last_error: Option<String> = None;

        loop {
            if generation.load(Ordering::SeqCst) != my_generation {
                log::debug!("🧩 加载已被新一代取代，任务退出");
                return;
            }

            let candidate = match chain.get(position.candidate) {
                Some(candidate) => candidate,
                // 链尾是必成的占位图，正常流程到不了这里
                None => return,
            };

            let attempt_result = if candidate.kind == CandidateKind::Placeholder {
                Ok(Arc::new(decode_data_url(&candidate.url)))
            } else {
                match self.permits.acquire_many(self.permit_width()).await {
                    Ok(_permit) => self.fetch_candidate(&candidate.url).await,
                    Err(_) => Err(LoadError::Cancelled("并发闸门已关闭".to_string())),
                }
            };

            match attempt_result {
                Ok(bytes) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    if candidate.kind != CandidateKind::Placeholder {
                        self.record_load_time(elapsed_ms);
                    }

                    log::info!(
                        "✅ 图片加载成功 - source={} retries={} elapsed={}ms",
                        candidate.kind.as_str(),
                        retry_count,
                        elapsed_ms
                    );

                    let result = ImageLoadResult {
                        url: candidate.url.clone(),
                        status: LoadStatus::Success,
                        source: Some(candidate.kind),
                        retry_count,
                        load_time_ms: elapsed_ms,
                        error: last_error,
                        bytes: Some(bytes),
                    };
                    send_if_current(&sender, &generation, my_generation, result.clone());

                    if let Some(upgrade_url) = candidate.upgrade_url.clone() {
                        self.spawn_upgrade(upgrade_url, result, sender, generation, my_generation);
                    }
                    return;
                }
                Err(err) => {
                    let class = err.class();
                    retry_count = position.attempt + 1;
                    last_error = Some(err.to_string());

                    log::warn!(
                        "⚠️ 候选加载失败 - source={} attempt={} class={:?} detail={}",
                        candidate.kind.as_str(),
                        retry_count,
                        class,
                        err
                    );

                    match next_step(
                        position,
                        AttemptOutcome::Failed(class),
                        self.config.effective_max_retries(),
                        self.config.base_delay_ms,
                    ) {
                        ChainStep::Retry {
                            position: next,
                            delay,
                        } => {
                            tokio::time::sleep(delay).await;
                            position = next;
                        }
                        ChainStep::Advance { position: next } => {
                            position = next;
                        }
                        // 失败分支不会产出成功决策
                        ChainStep::Succeeded { .. } => return,
                    }
                }
            }
        }
    }

    /// 低保真成功后，后台拉取高保真版本并静默替换。
    ///
    /// 升级失败不影响已展示的结果，只记一条日志。
    fn spawn_upgrade(
        self: &Arc<Self>,
        upgrade_url: String,
        base_result: ImageLoadResult,
        sender: watch::Sender<ImageLoadResult>,
        generation: Arc<AtomicU64>,
        my_generation: u64,
    ) {
        let loader = Arc::clone(self);
        tokio::spawn(async move {
            if generation.load(Ordering::SeqCst) != my_generation {
                return;
            }

            // 升级取图同样受并发闸门约束
            let _permit = match loader.permits.acquire_many(loader.permit_width()).await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if generation.load(Ordering::SeqCst) != my_generation {
                return;
            }

            let upgrade_started = Instant::now();
            match loader.fetch_candidate(&upgrade_url).await {
                Ok(bytes) => {
                    log::info!("✅ 质量升级完成 - url={upgrade_url}");
                    let mut upgraded = base_result;
                    upgraded.url = upgrade_url;
                    upgraded.bytes = Some(bytes);
                    // 升级快照报告自己的耗时，不沿用低保真结果的诊断字段
                    upgraded.load_time_ms = upgrade_started.elapsed().as_millis() as u64;
                    upgraded.error = None;
                    send_if_current(&sender, &generation, my_generation, upgraded);
                }
                Err(err) => {
                    log::debug!("🧩 质量升级失败，保留低保真结果 - detail={err}");
                }
            }
        });
    }
}

impl LoadHandle {
    /// 订阅状态更新。
    pub fn subscribe(&self) -> watch::Receiver<ImageLoadResult> {
        self.updates.clone()
    }

    /// 当前状态快照。
    pub fn current(&self) -> ImageLoadResult {
        self.updates.borrow().clone()
    }

    /// 手动重试：作废在途任务，从链头重新加载。
    pub fn retry(&self) {
        log::info!("🌐 手动重试加载 - url={}", self.request.original_url);
        self.start_generation();
    }

    /// 开启新一代加载任务。旧代的发送与升级全部失效。
    fn start_generation(&self) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self
            .sender
            .send(ImageLoadResult::loading(self.request.original_url.clone()));

        let chain = resolve_chain(&self.request, self.loader.config());
        let loader = Arc::clone(&self.loader);
        let sender = self.sender.clone();
        let generation = Arc::clone(&self.generation);

        tokio::spawn(async move {
            loader
                .run_chain(chain, sender, generation, my_generation)
                .await;
        });
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        // 作废在途任务，防止句柄销毁后仍有推送
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// 仅当代数仍是当前代时才发送，过期结果静默丢弃。
fn send_if_current(
    sender: &watch::Sender<ImageLoadResult>,
    generation: &AtomicU64,
    my_generation: u64,
    result: ImageLoadResult,
) {
    if generation.load(Ordering::SeqCst) == my_generation {
        let _ = sender.send(result);
    }
}

/// 解出 data URL 的有效字节。
///
/// 非 base64 或格式异常时按原文返回，调用方拿到的永远是非空内容。
fn decode_data_url(url: &str) -> Vec<u8> {
    if let Some((_, payload)) = url.split_once(";base64,") {
        if let Ok(decoded) = general_purpose::STANDARD.decode(payload) {
            return decoded;
        }
    }
    if let Some((_, payload)) = url.split_once(',') {
        return payload.as_bytes().to_vec();
    }
    url.as_bytes().to_vec()
}

fn map_reqwest_error(error: reqwest::Error) -> LoadError {
    if error.is_timeout() {
        LoadError::Timeout(error.to_string())
    } else {
        LoadError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{placeholder_data_url, ImageTypeHint};

    fn fast_config() -> LoadConfig {
        let mut config = LoadConfig::default();
        config.base_delay_ms = 10;
        config.attempt_timeout_ms = 2_000;
        config
    }

    #[tokio::test]
    async fn empty_request_resolves_to_placeholder_success() {
        let loader = ImageLoader::new(fast_config()).expect("loader init failed");
        let handle = loader.load(LoadRequest {
            downloaded_url: None,
            original_url: String::new(),
            type_hint: ImageTypeHint::Avatar,
        });

        let mut updates = handle.subscribe();
        updates
            .wait_for(|r| r.status == LoadStatus::Success)
            .await
            .expect("watch channel closed");

        let result = handle.current();
        assert_eq!(result.source, Some(CandidateKind::Placeholder));
        assert!(result.bytes.is_some());
        assert_eq!(result.retry_count, 0);
    }

    #[tokio::test]
    async fn data_url_candidate_loads_without_network() {
        let loader = ImageLoader::new(fast_config()).expect("loader init failed");
        let handle = loader.load(LoadRequest {
            downloaded_url: Some("data:text/plain;base64,aGVsbG8=".to_string()),
            original_url: String::new(),
            type_hint: ImageTypeHint::Generic,
        });

        let mut updates = handle.subscribe();
        updates
            .wait_for(|r| r.status == LoadStatus::Success)
            .await
            .expect("watch channel closed");

        let result = handle.current();
        assert_eq!(result.source, Some(CandidateKind::Downloaded));
        assert_eq!(
            result.bytes.expect("bytes missing").as_slice(),
            b"hello"
        );
    }

    #[test]
    fn permit_width_doubles_under_data_saver_and_slow_network() {
        let loader = ImageLoader::new(fast_config()).expect("loader init failed");
        assert_eq!(loader.permit_width(), 1);

        // 省流量信号收紧并发
        let mut config = fast_config();
        config.data_saver = true;
        let saver = ImageLoader::new(config).expect("loader init failed");
        assert_eq!(saver.permit_width(), 2);

        // 近期平均耗时越过阈值后判定慢网络
        let slow = ImageLoader::new(fast_config()).expect("loader init failed");
        assert!(!slow.network_is_slow());
        for _ in 0..3 {
            slow.record_load_time(10_000);
        }
        assert!(slow.network_is_slow());
        assert_eq!(slow.permit_width(), 2);
    }

    #[test]
    fn permit_width_never_exceeds_concurrency_limit() {
        let mut config = fast_config();
        config.max_concurrent_loads = 1;
        config.data_saver = true;

        let loader = ImageLoader::new(config).expect("loader init failed");
        assert_eq!(loader.permit_width(), 1);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = LoadConfig::default();
        config.max_retries = 0;
        assert!(ImageLoader::new(config).is_err());
    }

    #[test]
    fn decode_data_url_handles_base64_and_plain() {
        assert_eq!(decode_data_url("data:text/plain;base64,aGk="), b"hi");
        assert_eq!(decode_data_url("data:text/plain,raw"), b"raw");

        let placeholder = placeholder_data_url(ImageTypeHint::Logo);
        let decoded = decode_data_url(&placeholder);
        assert!(String::from_utf8(decoded)
            .expect("svg should be utf-8")
            .starts_with("<svg"));
    }
}
