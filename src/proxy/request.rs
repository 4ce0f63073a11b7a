//! # 请求参数模型模块
//!
//! ## 设计思路
//!
//! 将查询参数（尺寸 / 质量 / 格式）集中建模为字符串可往返的枚举，
//! 保证同一组参数在日志、ETag、诊断头中的表示完全一致。
//!
//! ## 实现思路
//!
//! - 枚举解析保持宽松：未知取值回退到默认档位，而不是直接拒绝请求。
//! - `ImageRequest::from_query` 是唯一入口，缺失 `url` 在这里立即失败。

use super::ProxyError;

/// 输出尺寸档位。
///
/// 每个档位对应一个“包含盒”，缩放永远不放大（见转码模块）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Thumb,
    Small,
    Medium,
    Large,
    Original,
}

impl ImageSize {
    /// 从外部字符串解析档位，未知取值回退 `Original`。
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("thumb") => Self::Thumb,
            Some("small") => Self::Small,
            Some("medium") => Self::Medium,
            Some("large") => Self::Large,
            _ => Self::Original,
        }
    }

    /// 稳定字符串表示，用于诊断头与 ETag。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Original => "original",
        }
    }

    /// 档位对应的包含盒（宽, 高）；`Original` 不缩放。
    pub fn bounding_box(self) -> Option<(u32, u32)> {
        match self {
            Self::Thumb => Some((150, 150)),
            Self::Small => Some((320, 320)),
            Self::Medium => Some((640, 640)),
            Self::Large => Some((1280, 1280)),
            Self::Original => None,
        }
    }
}

/// 输出质量档位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageQuality {
    Low,
    Medium,
    High,
    Max,
}

impl ImageQuality {
    /// 从外部字符串解析档位，未知取值回退 `Medium`。
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("medium") => Self::Medium,
            Some("high") => Self::High,
            Some("max") => Self::Max,
            _ => Self::Medium,
        }
    }

    /// 档位映射到编码器质量数值。
    pub fn factor(self) -> u8 {
        match self {
            Self::Low => 70,
            Self::Medium => 85,
            Self::High => 95,
            Self::Max => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Max => "max",
        }
    }
}

/// 输出编码格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// 从外部字符串解析格式，未知取值回退 `Webp`。
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("jpeg") | Some("jpg") => Self::Jpeg,
            Some("png") => Self::Png,
            _ => Self::Webp,
        }
    }

    /// 输出的 MIME 类型。
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// 单次代理请求的不可变参数集。
///
/// 每次 HTTP 请求构造一个新实例，处理结束即丢弃。
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// 目标源图地址（未校验，校验交给允许列表）。
    pub origin_url: String,
    pub size: ImageSize,
    pub quality: ImageQuality,
    pub format: OutputFormat,
    /// 是否在缩放后追加固定半径模糊。
    pub blur: bool,
}

impl ImageRequest {
    /// 从查询参数构造请求。
    ///
    /// 缺失 `url` 立即返回 `MissingParameter`；其余参数宽松解析。
    ///
    /// # 示例
    /// ```rust
    /// use image_relay::proxy::ImageRequest;
    ///
    /// let request = ImageRequest::from_query(
    ///     Some("https://example.com/a.png".to_string()),
    ///     Some("small"),
    ///     Some("high"),
    ///     None,
    ///     None,
    /// )?;
    /// assert_eq!(request.quality.factor(), 95);
    /// # Ok::<(), image_relay::proxy::ProxyError>(())
    /// ```
    pub fn from_query(
        url: Option<String>,
        size: Option<&str>,
        quality: Option<&str>,
        format: Option<&str>,
        blur: Option<&str>,
    ) -> Result<Self, ProxyError> {
        let origin_url = match url {
            Some(value) if !value.trim().is_empty() => value,
            _ => return Err(ProxyError::MissingParameter("url".to_string())),
        };

        let blur = matches!(
            blur.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("true") | Some("1")
        );

        Ok(Self {
            origin_url,
            size: ImageSize::parse_or_default(size),
            quality: ImageQuality::parse_or_default(quality),
            format: OutputFormat::parse_or_default(format),
            blur,
        })
    }
}
