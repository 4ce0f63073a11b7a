//! # 回退链解析模块
//!
//! ## 设计思路
//!
//! 一次加载请求可能带多个来源：已下载副本、原始 URL、占位图。
//! 这里把它们解析为一条有序候选链：前面的候选质量更高，
//! 最后一个候选必须是占位图，保证链路总能终止在成功态。
//!
//! ## 实现思路
//!
//! - 配置了代理基地址时，远程候选改走代理端点，先取低保真
//!   （小尺寸 + 低质量）快速出图，同时备好高保真升级 URL。
//! - data URL 与相对路径不经过代理，按原样直连。
//! - 占位图候选无条件追加在链尾。

use super::{placeholder_data_url, ImageTypeHint, LoadConfig};

/// 候选来源类别，按优先级排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// 已下载 / 已中转的副本。
    Downloaded,
    /// 原始来源 URL。
    Original,
    /// 内联占位图，保底候选。
    Placeholder,
}

impl CandidateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::Original => "original",
            Self::Placeholder => "placeholder",
        }
    }
}

/// 链上的单个候选。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: CandidateKind,
    /// 实际请求的 URL（可能已包上代理参数）。
    pub url: String,
    /// 成功后可选的高保真升级 URL。
    pub upgrade_url: Option<String>,
}

/// 一次加载请求的输入。
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    /// 已下载副本的 URL（若有）。
    pub downloaded_url: Option<String>,
    /// 原始来源 URL。
    pub original_url: String,
    /// 图片类型提示，决定占位图样式。
    pub type_hint: ImageTypeHint,
}

/// 该 URL 是否应绕过代理直连。
///
/// 内联数据与站内相对路径没有跨域与体积问题，代理反而多一跳。
fn bypasses_proxy(url: &str) -> bool {
    url.starts_with("data:") || !(url.starts_with("http://") || url.starts_with("https://"))
}

/// 把远程 URL 包装为代理端点 URL。
///
/// 解析失败时回退为直连，让链路继续而不是整体失败。
fn wrap_with_proxy(base: &str, url: &str, size: &str, quality: &str) -> String {
    match reqwest::Url::parse_with_params(
        base,
        &[("url", url), ("size", size), ("quality", quality)],
    ) {
        Ok(wrapped) => wrapped.to_string(),
        Err(_) => url.to_string(),
    }
}

fn remote_candidate(kind: CandidateKind, url: &str, config: &LoadConfig) -> Candidate {
    let proxy_base = match &config.proxy_base {
        Some(base) if !bypasses_proxy(url) => base,
        _ => {
            return Candidate {
                kind,
                url: url.to_string(),
                upgrade_url: None,
            }
        }
    };

    let upgrade_url = if config.enable_quality_upgrade && !config.data_saver {
        Some(wrap_with_proxy(proxy_base, url, "large", "high"))
    } else {
        None
    };

    Candidate {
        kind,
        url: wrap_with_proxy(proxy_base, url, "small", "low"),
        upgrade_url,
    }
}

/// 解析回退链。
///
/// 输出的链非空，且最后一个候选恒为占位图。
pub fn resolve_chain(request: &LoadRequest, config: &LoadConfig) -> Vec<Candidate> {
    let mut chain = Vec::with_capacity(3);

    if let Some(downloaded) = request
        .downloaded_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
    {
        chain.push(remote_candidate(CandidateKind::Downloaded, downloaded, config));
    }

    let original = request.original_url.trim();
    if !original.is_empty() {
        let duplicate = chain.iter().any(|c| {
            request
                .downloaded_url
                .as_deref()
                .map(|d| d.trim() == original)
                .unwrap_or(false)
                && c.kind == CandidateKind::Downloaded
        });
        if !duplicate {
            chain.push(remote_candidate(CandidateKind::Original, original, config));
        }
    }

    chain.push(Candidate {
        kind: CandidateKind::Placeholder,
        url: placeholder_data_url(request.type_hint),
        upgrade_url: None,
    });

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config_with_proxy() -> LoadConfig {
        let mut config = LoadConfig::default();
        config.proxy_base = Some("http://127.0.0.1:9800/image".to_string());
        config
    }

    #[test]
    fn chain_ends_with_placeholder() {
        let request = LoadRequest {
            downloaded_url: Some("https://cdn.example.com/a.png".to_string()),
            original_url: "https://origin.example.com/a.png".to_string(),
            type_hint: ImageTypeHint::News,
        };

        let chain = resolve_chain(&request, &LoadConfig::default());

        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].kind, CandidateKind::Downloaded);
        assert_eq!(chain[1].kind, CandidateKind::Original);
        assert_eq!(chain[2].kind, CandidateKind::Placeholder);
        assert!(chain[2].url.starts_with("data:image/svg+xml;base64,"));
    }

    #[test]
    fn missing_downloaded_url_skips_first_candidate() {
        let request = LoadRequest {
            downloaded_url: None,
            original_url: "https://origin.example.com/a.png".to_string(),
            type_hint: ImageTypeHint::Generic,
        };

        let chain = resolve_chain(&request, &LoadConfig::default());

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].kind, CandidateKind::Original);
    }

    #[test]
    fn identical_urls_are_deduplicated() {
        let request = LoadRequest {
            downloaded_url: Some("https://origin.example.com/a.png".to_string()),
            original_url: "https://origin.example.com/a.png".to_string(),
            type_hint: ImageTypeHint::Generic,
        };

        let chain = resolve_chain(&request, &LoadConfig::default());

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].kind, CandidateKind::Downloaded);
        assert_eq!(chain[1].kind, CandidateKind::Placeholder);
    }

    #[test]
    fn proxy_base_wraps_remote_candidates() {
        let request = LoadRequest {
            downloaded_url: None,
            original_url: "https://origin.example.com/a.png".to_string(),
            type_hint: ImageTypeHint::Generic,
        };

        let chain = resolve_chain(&request, &config_with_proxy());

        let original = &chain[0];
        assert!(original.url.starts_with("http://127.0.0.1:9800/image?"));
        assert!(original.url.contains("size=small"));
        assert!(original.url.contains("quality=low"));

        let upgrade = original.upgrade_url.as_deref().expect("upgrade url missing");
        assert!(upgrade.contains("size=large"));
        assert!(upgrade.contains("quality=high"));
    }

    #[test]
    fn data_saver_disables_upgrade_url() {
        let mut config = config_with_proxy();
        config.data_saver = true;

        let request = LoadRequest {
            downloaded_url: None,
            original_url: "https://origin.example.com/a.png".to_string(),
            type_hint: ImageTypeHint::Generic,
        };

        let chain = resolve_chain(&request, &config);
        assert!(chain[0].upgrade_url.is_none());
    }

    #[test]
    fn data_urls_bypass_proxy() {
        let request = LoadRequest {
            downloaded_url: Some("data:image/png;base64,AAAA".to_string()),
            original_url: "/assets/local.png".to_string(),
            type_hint: ImageTypeHint::Generic,
        };

        let chain = resolve_chain(&request, &config_with_proxy());

        assert_eq!(chain[0].url, "data:image/png;base64,AAAA");
        assert_eq!(chain[1].url, "/assets/local.png");
        assert!(chain[0].upgrade_url.is_none());
    }

    proptest! {
        /// 任意输入下链非空且以占位图收尾。
        #[test]
        fn chain_is_never_empty_and_terminates(
            downloaded in proptest::option::of("[a-z:/.%-]{0,40}"),
            original in "[a-z:/.%-]{0,40}",
        ) {
            let request = LoadRequest {
                downloaded_url: downloaded,
                original_url: original,
                type_hint: ImageTypeHint::Generic,
            };

            let chain = resolve_chain(&request, &LoadConfig::default());

            prop_assert!(!chain.is_empty());
            prop_assert_eq!(
                chain.last().map(|c| c.kind),
                Some(CandidateKind::Placeholder)
            );
        }
    }
}
