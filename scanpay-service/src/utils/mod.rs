use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageOutputFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

/// Smallest edge, in pixels, of a rendered payment code.
const MIN_QR_EDGE: u32 = 256;

/// Render `payload` as a PNG QR code and return it base64 encoded.
pub fn generate_qr_base64(payload: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(payload, EcLevel::M)
        .context("payload does not fit in a QR code")?;
    let image = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .min_dimensions(MIN_QR_EDGE, MIN_QR_EDGE)
        .build();

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image).write_to(&mut buffer, ImageOutputFormat::Png)?;

    Ok(general_purpose::STANDARD.encode(buffer.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_png() {
        let encoded = generate_qr_base64("https://scanpay.com/pay?txn=TXN_1_abcdEFGH").unwrap();
        let bytes = general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
