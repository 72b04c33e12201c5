use archiver_core::sequential_filename;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFormat {
    /// Lossy WebP at `quality`.
    #[default]
    Webp,
    Jpeg,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Webp => "webp",
            TargetFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeSettings {
    pub format: TargetFormat,
    pub quality: u8,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            format: TargetFormat::Webp,
            quality: 85,
        }
    }
}

impl TranscodeSettings {
    /// `image01.webp` for index 1, and so on.
    pub fn filename(&self, index: usize) -> String {
        sequential_filename(index, self.format.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("unsupported or corrupt image: {0}")]
    Unsupported(#[source] image::ImageError),
    #[error("failed to encode {format:?}: {message}")]
    Encode {
        format: TargetFormat,
        message: String,
    },
}

/// Decodes any supported raster image and re-encodes it as `settings.format`.
///
/// Transparent regions are composited onto white; the output never carries
/// an alpha channel. `index` only names the result.
pub fn transcode(
    bytes: &[u8],
    settings: &TranscodeSettings,
    index: usize,
) -> Result<TranscodedImage, TranscodeError> {
    let decoded = image::load_from_memory(bytes).map_err(TranscodeError::Unsupported)?;
    let flat = flatten_onto_white(&decoded);

    let quality = settings.quality.clamp(1, 100);
    let encoded = match settings.format {
        TargetFormat::Webp => encode_webp(&flat, quality)?,
        TargetFormat::Jpeg => encode_jpeg(&flat, quality)?,
    };

    Ok(TranscodedImage {
        filename: settings.filename(index),
        bytes: encoded,
    })
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .map_err(|err| TranscodeError::Encode {
            format: TargetFormat::Jpeg,
            message: err.to_string(),
        })?;
    Ok(out)
}

fn encode_webp(img: &RgbImage, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let encoder = webp::Encoder::from_rgb(img.as_raw(), img.width(), img.height());
    let encoded = encoder
        .encode_simple(false, f32::from(quality))
        .map_err(|err| TranscodeError::Encode {
            format: TargetFormat::Webp,
            message: format!("{err:?}"),
        })?;
    Ok(encoded.to_vec())
}

fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
