//! # 占位图生成模块
//!
//! ## 设计思路
//!
//! 占位图是整条回退链的“保底候选”：不依赖网络、同步生成、永不失败。
//! 按图片类型给出可辨识的内联矢量图，保证坏图场景下用户看到的
//! 永远不是裂图图标或无限转圈。
//!
//! ## 实现思路
//!
//! - 每种类型提示对应一张固定 SVG，Base64 封装成 data URL。
//! - 同一提示的输出完全确定，可直接用于快照对比。

use base64::{engine::general_purpose, Engine as _};

/// 图片类型提示，决定占位图样式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageTypeHint {
    News,
    Avatar,
    Logo,
    Preview,
    #[default]
    Generic,
}

impl ImageTypeHint {
    /// 从外部字符串解析提示，未知取值回退 `Generic`。
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("news") => Self::News,
            Some("avatar") => Self::Avatar,
            Some("logo") => Self::Logo,
            Some("preview") => Self::Preview,
            _ => Self::Generic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Avatar => "avatar",
            Self::Logo => "logo",
            Self::Preview => "preview",
            Self::Generic => "generic",
        }
    }

    /// 占位图的 SVG 源文本。
    fn svg(self) -> &'static str {
        match self {
            Self::News => {
                r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 120 90"><rect width="120" height="90" fill="#e8eaf0"/><rect x="14" y="16" width="92" height="10" rx="2" fill="#aab2c4"/><rect x="14" y="34" width="64" height="6" rx="2" fill="#c3c9d8"/><rect x="14" y="46" width="80" height="6" rx="2" fill="#c3c9d8"/><rect x="14" y="58" width="52" height="6" rx="2" fill="#c3c9d8"/></svg>"##
            }
            Self::Avatar => {
                r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 90 90"><rect width="90" height="90" fill="#e3e7ee"/><circle cx="45" cy="34" r="16" fill="#9aa4ba"/><path d="M15 82c4-18 16-26 30-26s26 8 30 26z" fill="#9aa4ba"/></svg>"##
            }
            Self::Logo => {
                r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 90 90"><rect width="90" height="90" rx="12" fill="#eef0f5"/><circle cx="45" cy="45" r="22" fill="none" stroke="#a6aec2" stroke-width="6"/></svg>"##
            }
            Self::Preview => {
                r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 120 90"><rect width="120" height="90" fill="#e8eaf0"/><path d="M18 66l22-26 16 18 12-12 34 38H18z" fill="#aab2c4"/><circle cx="36" cy="28" r="8" fill="#aab2c4"/></svg>"##
            }
            Self::Generic => {
                r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 120 90"><rect width="120" height="90" fill="#ecedf2"/><path d="M30 62l18-22 14 16 10-10 18 22H30z" fill="#b4bac9"/></svg>"##
            }
        }
    }
}

/// 生成占位图 data URL。
///
/// 同步、确定、零依赖，保证回退链总能终止在成功态。
///
/// # 示例
/// ```rust
/// use image_relay::loader::{placeholder_data_url, ImageTypeHint};
///
/// let url = placeholder_data_url(ImageTypeHint::Avatar);
/// assert!(url.starts_with("data:image/svg+xml;base64,"));
/// ```
pub fn placeholder_data_url(hint: ImageTypeHint) -> String {
    format!(
        "data:image/svg+xml;base64,{}",
        general_purpose::STANDARD.encode(hint.svg())
    )
}
