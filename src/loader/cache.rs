//! # 字节缓存模块
//!
//! ## 设计思路
//!
//! 同一 URL 在短时间内常被重复请求（列表滚动、组件重建）。
//! 用一个按条目数限容的 LRU 缓存避免重复下载，键是最终请求 URL，
//! 值是成功加载的完整字节。只有成功结果才写入，失败不污染缓存。
//!
//! ## 实现思路
//!
//! - `Mutex<lru::LruCache>` 足够：临界区只有指针操作，无 IO。
//! - 值包 `Arc`，命中时零拷贝共享给调用方与升级任务。

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use super::LoadError;

/// URL → 图片字节 的进程内 LRU 缓存。
pub struct ImageByteCache {
    entries: Mutex<lru::LruCache<String, Arc<Vec<u8>>>>,
}

impl ImageByteCache {
    /// 创建指定容量的缓存，容量为 0 时拒绝。
    pub fn new(capacity: usize) -> Result<Self, LoadError> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| LoadError::InvalidConfig("cache_capacity 不能为 0".to_string()))?;

        Ok(Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
        })
    }

    /// 命中则返回共享字节并刷新热度。
    pub fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        match self.entries.lock() {
            Ok(mut entries) => entries.get(url).cloned(),
            Err(_) => None,
        }
    }

    /// 写入一次成功加载的字节。
    pub fn store(&self, url: &str, bytes: Arc<Vec<u8>>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(url.to_string(), bytes);
        }
    }

    /// 当前缓存条目数。
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
