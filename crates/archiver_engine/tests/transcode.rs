use std::io::Cursor;

use archiver_engine::{transcode, TargetFormat, TranscodeError, TranscodeSettings};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

/// 16x16 PNG: opaque red on the left half, fully transparent on the right.
fn half_transparent_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(16, 16, |x, _| {
        if x < 8 {
            Rgba([200, 10, 10, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    png
}

#[test]
fn webp_output_has_no_alpha_and_white_background() {
    let settings = TranscodeSettings::default();
    let out = transcode(&half_transparent_png(), &settings, 1).unwrap();

    assert_eq!(out.filename, "image01.webp");
    assert_eq!(&out.bytes[..4], b"RIFF");
    assert_eq!(&out.bytes[8..12], b"WEBP");

    let decoded = image::load_from_memory(&out.bytes).unwrap();
    assert!(!decoded.color().has_alpha());
    let rgb = decoded.to_rgb8();
    let [r, g, b] = rgb.get_pixel(13, 8).0;
    assert!(r > 235 && g > 235 && b > 235, "got {r},{g},{b}");
    let [r, g, b] = rgb.get_pixel(2, 8).0;
    assert!(r > 170 && g < 60 && b < 60, "got {r},{g},{b}");
}

/// 64x64 with per-pixel variation, so the encoder has detail to drop.
fn noisy_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(64, 64, |x, y| {
        let v = (x * 37 + y * 91 + (x * y) % 23) as u8;
        Rgba([v, v.wrapping_mul(3), v.wrapping_add(90), 255])
    });
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    png
}

#[test]
fn webp_quality_controls_output_size() {
    let encode = |quality| {
        let settings = TranscodeSettings {
            format: TargetFormat::Webp,
            quality,
        };
        transcode(&noisy_png(), &settings, 1).unwrap().bytes
    };
    let low = encode(20);
    let default = encode(85);
    let high = encode(100);

    assert!(low.len() < default.len(), "{} vs {}", low.len(), default.len());
    assert!(default.len() < high.len(), "{} vs {}", default.len(), high.len());
    assert_eq!(&default[12..16], b"VP8 ", "lossy bitstream expected");
}

#[test]
fn jpeg_output_is_white_where_input_was_transparent() {
    let settings = TranscodeSettings {
        format: TargetFormat::Jpeg,
        quality: 85,
    };
    let out = transcode(&half_transparent_png(), &settings, 7).unwrap();
    assert_eq!(out.filename, "image07.jpg");

    let decoded = image::load_from_memory_with_format(&out.bytes, ImageFormat::Jpeg).unwrap();
    assert!(!decoded.color().has_alpha());
    let [r, g, b] = decoded.to_rgb8().get_pixel(14, 8).0;
    assert!(r > 240 && g > 240 && b > 240, "got {r},{g},{b}");
}

#[test]
fn opaque_input_keeps_its_colour() {
    let img = RgbaImage::from_pixel(4, 4, Rgba([10, 120, 30, 255]));
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();

    let out = transcode(&png, &TranscodeSettings::default(), 2).unwrap();
    let rgb = image::load_from_memory(&out.bytes).unwrap().to_rgb8();
    let got = rgb.get_pixel(1, 1).0;
    for (channel, expected) in got.into_iter().zip([10u8, 120, 30]) {
        assert!(channel.abs_diff(expected) <= 8, "got {got:?}");
    }
}

#[test]
fn corrupt_input_is_unsupported() {
    let err = transcode(b"<html>not an image</html>", &TranscodeSettings::default(), 1).unwrap_err();
    assert!(matches!(err, TranscodeError::Unsupported(_)));
}
