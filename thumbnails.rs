use crate::config::PhotoDimensions;
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, Rgb, RgbImage};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

fn jpeg_quality(quality: f32) -> Result<u8> {
    if !(quality > 0.0 && quality <= 1.0) {
        return Err(Error::InvalidArgument(format!(
            "photo quality must be in (0, 1], got {quality}"
        )));
    }
    Ok((quality * 100.0).round().clamp(1.0, 100.0) as u8)
}

/// Fits a captured image inside `dims`, centres it on a white canvas of exactly
/// that size and re-encodes it as JPEG.
pub fn resize_for_store(bytes: &[u8], dims: PhotoDimensions) -> Result<Vec<u8>> {
    let quality = jpeg_quality(dims.quality)?;
    if dims.width == 0 || dims.height == 0 {
        return Err(Error::InvalidArgument("photo dimensions must be positive".into()));
    }

    let img = image::load_from_memory(bytes)?;
    let resized = img
        .resize(dims.width, dims.height, FilterType::CatmullRom)
        .to_rgb8();

    let mut canvas = RgbImage::from_pixel(dims.width, dims.height, BACKGROUND);
    let x = (dims.width - resized.width()) / 2;
    let y = (dims.height - resized.height()) / 2;
    imageops::overlay(&mut canvas, &resized, i64::from(x), i64::from(y));

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        canvas.as_raw(),
        canvas.width(),
        canvas.height(),
        ColorType::Rgb8,
    )?;
    log::debug!(
        "Resized {}x{} photo to {}x{} ({} bytes)",
        img.width(),
        img.height(),
        dims.width,
        dims.height,
        out.len()
    );
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat};
    use std::io::Cursor;

    pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([20, 40, 200]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn landscape_is_letterboxed_into_portrait_box() {
        let jpeg = resize_for_store(&sample_png(800, 600), PhotoDimensions::default()).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (360, 480));

        let corner = decoded.get_pixel(2, 2);
        assert!(corner.0.iter().all(|&c| c > 230), "corner {corner:?}");
        let centre = decoded.get_pixel(180, 240);
        assert!(centre.0[2] > 150 && centre.0[0] < 80, "centre {centre:?}");
    }

    #[test]
    fn rejects_bad_quality_and_garbage_input() {
        let dims = PhotoDimensions {
            quality: 1.5,
            ..PhotoDimensions::default()
        };
        assert!(matches!(
            resize_for_store(&sample_png(10, 10), dims),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            resize_for_store(b"not an image", PhotoDimensions::default()),
            Err(Error::Image(_))
        ));
    }

    #[test]
    fn quality_maps_to_percent() {
        assert_eq!(jpeg_quality(0.7).unwrap(), 70);
        assert_eq!(jpeg_quality(1.0).unwrap(), 100);
        assert_eq!(jpeg_quality(0.001).unwrap(), 1);
    }
}
