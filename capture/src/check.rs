use image::ImageFormat;
use tracing::debug;

/// Decides whether an extracted frame is usable for display and capture.
///
/// A rejected frame is "no frame this cycle": the caller keeps whatever it
/// accepted last.
pub trait FrameCheck: Send + Sync {
    fn accept(&mut self, jpeg_data: &[u8]) -> bool;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Accepts any frame the extractor produced (SOI/EOI already verified).
#[derive(Debug, Default)]
pub struct MarkerCheck;

impl FrameCheck for MarkerCheck {
    fn accept(&mut self, _jpeg_data: &[u8]) -> bool {
        true
    }

    fn name(&self) -> &str {
        "markers"
    }
}

/// Fully decodes each frame and rejects the ones the JPEG decoder refuses.
#[derive(Debug, Default)]
pub struct DecodeCheck {
    rejected: u64,
}

impl DecodeCheck {
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl FrameCheck for DecodeCheck {
    fn accept(&mut self, jpeg_data: &[u8]) -> bool {
        match image::load_from_memory_with_format(jpeg_data, ImageFormat::Jpeg) {
            Ok(_) => true,
            Err(e) => {
                self.rejected += 1;
                debug!(error = %e, bytes = jpeg_data.len(), rejected = self.rejected, "frame failed to decode");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "decode"
    }
}

/// Pick the check for a camera configuration.
pub fn for_config(verify_decode: bool) -> Box<dyn FrameCheck> {
    if verify_decode {
        Box::new(DecodeCheck::default())
    } else {
        Box::new(MarkerCheck)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{ImageBuffer, Rgb};

    /// Encode a small gradient as a real JPEG.
    pub(crate) fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, _> = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        });
        let mut buf = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 80))
            .unwrap();
        buf
    }

    #[test]
    fn decode_check_accepts_real_jpeg() {
        let mut check = DecodeCheck::default();
        assert!(check.accept(&test_jpeg(16, 8)));
        assert_eq!(check.rejected(), 0);
    }

    #[test]
    fn decode_check_rejects_marker_only_bytes() {
        let mut check = DecodeCheck::default();
        assert!(!check.accept(&[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]));
        assert_eq!(check.rejected(), 1);
    }

    #[test]
    fn marker_check_accepts_anything() {
        let mut check = MarkerCheck;
        assert!(check.accept(&[0xFF, 0xD8, 0xFF, 0xD9]));
    }

    #[test]
    fn config_selects_check() {
        assert_eq!(for_config(true).name(), "decode");
        assert_eq!(for_config(false).name(), "markers");
    }
}
