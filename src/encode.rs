//! Serialization of composed surfaces.
//!
//! Converts an RGBA buffer to encoded bytes (PNG, JPEG or lossless WebP),
//! wraps them in a base64 `data:` URL, and converts data URLs back into a
//! MIME-tagged [`Blob`] or a [`DecodedImage`].

use crate::error::{WatermarkError, WatermarkResult};
use crate::loader::DecodedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use image::{ImageEncoder as _, RgbaImage};
use serde::Deserialize;
use std::io::Cursor;

/// Encoded output format of a composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    WebP,
}

impl OutputFormat {
    /// MIME type used in data URLs and blobs.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(OutputFormat::Png),
            "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
            "image/webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }

    /// Guess the format from a file extension (`out.jpg` -> Jpeg).
    pub fn from_extension(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::WebP),
            other => Err(format!(
                "Unknown output format '{other}'. Expected png, jpeg or webp"
            )),
        }
    }
}

/// Binary image data with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Bytes,
}

impl Blob {
    /// Decode a base64 data URL, keeping its MIME type.
    pub fn from_data_url(url: &str) -> WatermarkResult<Self> {
        let (mime_type, data) = parse_data_url(url)?;
        Ok(Self {
            mime_type,
            data: Bytes::from(data),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        to_data_url(&self.mime_type, &self.data)
    }

    /// Decode the blob's bytes into an image.
    pub fn decode(&self) -> WatermarkResult<DecodedImage> {
        DecodedImage::decode(&self.data, &self.mime_type.replace('/', "."))
            .map_err(WatermarkError::serialization)
    }
}

/// Encode an RGBA buffer in `format`. `quality` (1-100) applies to JPEG.
pub fn encode_image(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
) -> WatermarkResult<Vec<u8>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(WatermarkError::serialization(format!(
            "Cannot encode an empty {width}x{height} surface"
        )));
    }

    let mut output = Cursor::new(Vec::new());
    let result = match format {
        OutputFormat::Png => {
            image::codecs::png::PngEncoder::new(&mut output).write_image(
                image.as_raw(),
                width,
                height,
                image::ColorType::Rgba8,
            )
        }
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = rgba_to_rgb(image.as_raw());
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100))
                .write_image(&rgb, width, height, image::ColorType::Rgb8)
        }
        OutputFormat::WebP => {
            image::codecs::webp::WebPEncoder::new_lossless(&mut output).write_image(
                image.as_raw(),
                width,
                height,
                image::ColorType::Rgba8,
            )
        }
    };

    result.map_err(|e| {
        WatermarkError::serialization(format!("{:?} encoding failed: {e}", format))
    })?;
    Ok(output.into_inner())
}

/// Encode an RGBA buffer straight to a data URL.
pub fn image_to_data_url(
    image: &RgbaImage,
    format: OutputFormat,
    quality: u8,
) -> WatermarkResult<String> {
    let encoded = encode_image(image, format, quality)?;
    Ok(to_data_url(format.mime_type(), &encoded))
}

/// Build a base64 data URL.
pub fn to_data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(data))
}

/// Split a base64 data URL into its MIME type and decoded bytes.
///
/// An omitted MIME type defaults to `text/plain`.
pub fn parse_data_url(url: &str) -> WatermarkResult<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| WatermarkError::serialization("Data URL must start with 'data:'"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| WatermarkError::serialization("Data URL is missing the ',' separator"))?;

    let mut params = header.split(';');
    let mime = params.next().unwrap_or_default().trim();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(WatermarkError::serialization(
            "Only base64 data URLs are supported",
        ));
    }

    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| WatermarkError::serialization(format!("Invalid base64 payload: {e}")))?;

    let mime = if mime.is_empty() { "text/plain" } else { mime };
    Ok((mime.to_string(), data))
}

/// Decode the image carried by a data URL.
pub fn image_from_data_url(url: &str) -> WatermarkResult<DecodedImage> {
    Blob::from_data_url(url)?.decode()
}

/// Convert RGBA to RGB by dropping the alpha channel.
fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let pixel_count = rgba.len() / 4;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    for chunk in rgba.chunks_exact(4) {
        rgb.push(chunk[0]);
        rgb.push(chunk[1]);
        rgb.push(chunk[2]);
    }

    rgb
}
