//! # 转码模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 目标格式”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素/内存上限快速拒绝
//! 3. 完整解码
//! 4. 按档位包含盒缩放（只缩小，永不放大）
//! 5. 可选模糊，最后按目标格式编码
//!
//! WebP 在 `quality >= 95` 时切换无损模式；JPEG 输出渐进式编码，
//! PNG 使用自适应滤波。

use fast_image_resize as fr;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageEncoder, Rgba};
use std::io::Cursor;

use super::handler::ProxyHandler;
use super::request::{ImageRequest, OutputFormat};
use super::{ProxyConfig, ProxyError};

/// WebP 切换无损模式的质量阈值。
const WEBP_LOSSLESS_THRESHOLD: u8 = 95;

/// 转码结果。
///
/// 由单个代理请求独占，响应发出后即丢弃（服务端不做持久缓存，
/// 缓存职责通过 HTTP 头交给中间层）。
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    /// 编码后的输出字节。
    pub bytes: Vec<u8>,
    /// 输出 MIME 类型。
    pub content_type: &'static str,
    /// 源图原始宽度（像素）。
    pub original_width: u32,
    /// 源图原始高度（像素）。
    pub original_height: u32,
    /// 实际应用的编码质量数值。
    pub applied_quality: u8,
    /// 实际应用的尺寸档位。
    pub applied_size: &'static str,
}

impl TranscodeResult {
    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }
}

impl ProxyHandler {
    /// 将源图字节转码为请求指定的尺寸 / 质量 / 格式。
    pub(super) fn transcode(
        &self,
        bytes: &[u8],
        request: &ImageRequest,
        config: &ProxyConfig,
    ) -> Result<TranscodeResult, ProxyError> {
        let (header_width, header_height) = Self::inspect_dimensions_from_memory(bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ProxyError::UnsupportedImage(format!("图片解码失败：{}", e)))?;

        let (original_width, original_height) = decoded.dimensions();
        Self::validate_pixel_limits(config, original_width, original_height)?;
        Self::validate_decoded_memory_limits(config, original_width, original_height)?;

        let resized = Self::resize_into_bounding_box(decoded, request, config)?;

        let finished = if request.blur {
            resized.blur(config.blur_sigma)
        } else {
            resized
        };

        let quality = request.quality.factor();
        let encoded = Self::encode(&finished, request.format, quality)?;

        log::info!(
            "✅ 转码完成 - 原始: {}x{} 输出: {}x{} 格式: {} 质量: {} 体积: {}KB",
            original_width,
            original_height,
            finished.width(),
            finished.height(),
            request.format.as_str(),
            quality,
            encoded.len() / 1024
        );

        Ok(TranscodeResult {
            bytes: encoded,
            content_type: request.format.content_type(),
            original_width,
            original_height,
            applied_quality: quality,
            applied_size: request.size.as_str(),
        })
    }

    /// 仅通过内存中的图片头信息读取宽高。
    ///
    /// 用于在完整解码前做像素限制检查。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ProxyError> {
        let cursor = Cursor::new(bytes);
        let reader = image::ImageReader::new(cursor)
            .with_guessed_format()
            .map_err(|e| ProxyError::UnsupportedImage(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| ProxyError::UnsupportedImage(format!("无法读取图片尺寸：{}", e)))
    }

    /// 校验像素数量是否超过配置上限。
    fn validate_pixel_limits(
        config: &ProxyConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ProxyError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ProxyError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(ProxyError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &ProxyConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ProxyError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ProxyError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ProxyError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 计算“放入包含盒且永不放大”的目标尺寸。
    ///
    /// 返回 `None` 表示无需缩放（源图已在盒内，或请求 `original`）。
    pub(super) fn fit_inside_box(
        width: u32,
        height: u32,
        box_width: u32,
        box_height: u32,
    ) -> Option<(u32, u32)> {
        if width <= box_width && height <= box_height {
            return None;
        }

        let scale = (box_width as f64 / width as f64)
            .min(box_height as f64 / height as f64)
            .min(1.0);

        let target_width = ((width as f64 * scale).floor() as u32).max(1);
        let target_height = ((height as f64 * scale).floor() as u32).max(1);

        Some((target_width, target_height))
    }

    fn resize_into_bounding_box(
        image: DynamicImage,
        request: &ImageRequest,
        config: &ProxyConfig,
    ) -> Result<DynamicImage, ProxyError> {
        let Some((box_width, box_height)) = request.size.bounding_box() else {
            return Ok(image);
        };

        let (width, height) = image.dimensions();
        let Some((target_width, target_height)) =
            Self::fit_inside_box(width, height, box_width, box_height)
        else {
            return Ok(image);
        };

        log::debug!(
            "🧩 包含盒缩放：{}x{} -> {}x{}（filter={:?}）",
            width,
            height,
            target_width,
            target_height,
            config.resize_filter
        );

        match Self::resize_with_fast_image_resize(
            &image,
            target_width,
            target_height,
            config.resize_filter,
        ) {
            Ok(resized) => Ok(resized),
            Err(err) => {
                log::warn!(
                    "⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}",
                    err
                );
                Ok(image.resize_exact(target_width, target_height, config.resize_filter))
            }
        }
    }

    fn resize_with_fast_image_resize(
        image: &DynamicImage,
        target_width: u32,
        target_height: u32,
        filter: image::imageops::FilterType,
    ) -> Result<DynamicImage, ProxyError> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            src.into_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| ProxyError::TranscodeFailure {
            stage: "resize",
            message: format!("构建源图像缓冲失败：{}", e),
        })?;

        let mut dst_image =
            fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(Self::to_fast_filter(filter)));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| ProxyError::TranscodeFailure {
                stage: "resize",
                message: format!("fast_image_resize 执行失败：{}", e),
            })?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            target_width,
            target_height,
            dst_image.into_vec(),
        )
        .ok_or_else(|| ProxyError::TranscodeFailure {
            stage: "resize",
            message: "fast_image_resize 输出缓冲长度异常".to_string(),
        })?;

        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn to_fast_filter(filter: image::imageops::FilterType) -> fr::FilterType {
        match filter {
            image::imageops::FilterType::Nearest => fr::FilterType::Box,
            image::imageops::FilterType::Triangle => fr::FilterType::Bilinear,
            image::imageops::FilterType::CatmullRom => fr::FilterType::CatmullRom,
            image::imageops::FilterType::Gaussian => fr::FilterType::Mitchell,
            image::imageops::FilterType::Lanczos3 => fr::FilterType::Lanczos3,
        }
    }

    fn encode(
        image: &DynamicImage,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ProxyError> {
        match format {
            OutputFormat::Webp => Self::encode_webp(image, quality),
            OutputFormat::Jpeg => Self::encode_jpeg(image, quality),
            OutputFormat::Png => Self::encode_png(image),
        }
    }

    fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ProxyError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);

        let memory = if quality >= WEBP_LOSSLESS_THRESHOLD {
            encoder.encode_lossless()
        } else {
            encoder.encode(quality as f32)
        };

        Ok(memory.to_vec())
    }

    fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ProxyError> {
        // JPEG 不支持透明通道，先铺到 RGB。
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        // JPEG 规范的尺寸上限是 65535
        let width = u16::try_from(width).map_err(|_| ProxyError::TranscodeFailure {
            stage: "encode",
            message: format!("图片宽度超出 JPEG 上限：{}", width),
        })?;
        let height = u16::try_from(height).map_err(|_| ProxyError::TranscodeFailure {
            stage: "encode",
            message: format!("图片高度超出 JPEG 上限：{}", height),
        })?;

        let mut buffer = Vec::new();
        let mut encoder = jpeg_encoder::Encoder::new(&mut buffer, quality);
        encoder.set_progressive(true);

        encoder
            .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
            .map_err(|e| ProxyError::TranscodeFailure {
                stage: "encode",
                message: format!("JPEG 编码失败：{}", e),
            })?;

        Ok(buffer)
    }

    fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ProxyError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut buffer = Vec::new();

        let encoder = PngEncoder::new_with_quality(
            &mut buffer,
            CompressionType::Default,
            PngFilterType::Adaptive,
        );

        encoder
            .write_image(
                rgba.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| ProxyError::TranscodeFailure {
                stage: "encode",
                message: format!("PNG 编码失败：{}", e),
            })?;

        Ok(buffer)
    }
}
