use crate::frame::CaptureError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Locate a complete JPEG image: first SOI marker to last EOI marker.
pub(crate) fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == SOI)?;
    let end = buffer[start + 2..]
        .windows(2)
        .rposition(|w| w == EOI)
        .map(|idx| start + 2 + idx + 2)?;
    Some((start, end))
}

/// Strip leading noise and trailing padding around an encoded JPEG.
///
/// Camera drivers commonly hand out fixed-size buffers with padding after EOI.
pub(crate) fn trim_to_jpeg(buffer: &[u8]) -> Result<Vec<u8>, CaptureError> {
    if buffer.is_empty() {
        return Err(CaptureError::NotJpeg("empty buffer"));
    }
    let (start, end) = find_jpeg_bounds(buffer)
        .ok_or(CaptureError::NotJpeg("missing SOI/EOI markers"))?;
    Ok(buffer[start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_cover_soi_to_last_eoi() {
        let data = [0x00, 0xFF, 0xD8, 0x01, 0xFF, 0xD9, 0x02, 0xFF, 0xD9, 0x00, 0x00];
        assert_eq!(find_jpeg_bounds(&data), Some((1, 9)));
    }

    #[test]
    fn trim_removes_padding() {
        let mut data = vec![0xFF, 0xD8, 0x10, 0x20, 0xFF, 0xD9];
        data.extend_from_slice(&[0u8; 32]);
        assert_eq!(trim_to_jpeg(&data).unwrap(), vec![0xFF, 0xD8, 0x10, 0x20, 0xFF, 0xD9]);
    }

    #[test]
    fn truncated_image_rejected() {
        assert!(trim_to_jpeg(&[0xFF, 0xD8, 0x10, 0x20]).is_err());
        assert!(trim_to_jpeg(&[]).is_err());
        assert!(trim_to_jpeg(&[0xFF, 0xD9, 0xFF, 0xD8]).is_err());
    }
}
