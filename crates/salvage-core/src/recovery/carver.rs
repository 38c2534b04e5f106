/// Signature carving over raw bytes
///
/// Headers are searched at sector-aligned offsets only. Once a header is found
/// the end of the file is located with a format-specific rule; formats without
/// a terminator get a fixed window. Fragmented files are not reassembled: a
/// carve is one contiguous byte range.
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::recovery::signatures::match_carvable;
use crate::session::CancellationToken;
use crate::FileType;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Smallest window a carve looks at, whatever `max_carve_size` says
pub const MIN_CARVE_WINDOW: usize = 64;

/// Sectors between two progress callbacks
const PROGRESS_STRIDE: usize = 1024;

/// A contiguous byte range believed to hold one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarvedRegion {
    pub offset: u64,
    pub length: u64,
    pub file_type: FileType,
    /// Both the header and a valid end-of-file structure were found
    pub complete: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CarveOptions {
    pub sector_size: usize,
    pub max_carve_size: usize,
    /// Ignore a hit at offset 0 (the container itself, not embedded content)
    pub skip_leading: bool,
}

impl Default for CarveOptions {
    fn default() -> Self {
        Self {
            sector_size: 512,
            max_carve_size: 64 * 1024 * 1024,
            skip_leading: false,
        }
    }
}

/// Carve the file whose header starts at `data[0]`
///
/// Returns `(file_type, length, complete)`, or None when no carvable header
/// is present.
pub fn carve_at(data: &[u8], max_carve_size: usize) -> Option<(FileType, usize, bool)> {
    let signature = match_carvable(data)?;
    let window = &data[..data.len().min(max_carve_size.max(MIN_CARVE_WINDOW))];

    let (length, complete) = match signature.file_type {
        FileType::Jpeg => {
            // FF D8 FF must be followed by a real marker
            if window.len() < 4 || window[3] < 0xC0 {
                return None;
            }
            find_end(window, &[0xFF, 0xD9], 2)
        }
        FileType::Png => {
            if window.len() < PNG_MAGIC.len() || window[..8] != PNG_MAGIC {
                return None;
            }
            walk_png_chunks(window)
        }
        FileType::Gif => find_end(window, &[0x00, 0x3B], 13),
        FileType::Pdf => find_end(window, b"%%EOF", 5),
        FileType::Zip => zip_end(window),
        FileType::Mp4 => {
            if window.len() < 8 {
                return None;
            }
            let first_box = BigEndian::read_u32(&window[..4]);
            if !(8..=512).contains(&first_box) {
                return None;
            }
            walk_mp4_boxes(window)
        }
        _ => (window.len(), false),
    };

    Some((signature.file_type, length.max(1), complete))
}

/// Scan `data` for carvable files
///
/// `base_offset` is the absolute position of `data[0]` on the device. Hits
/// inside an already carved complete region are skipped. Stops early, keeping
/// what it found, when `cancel` fires.
pub fn scan_buffer(
    data: &[u8],
    base_offset: u64,
    options: &CarveOptions,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(f32),
) -> Vec<CarvedRegion> {
    let sector = options.sector_size.max(1);
    let mut regions = Vec::new();
    let mut skip_until = 0usize;
    let mut pos = if options.skip_leading { sector } else { 0 };
    let mut sectors_seen = 0usize;

    while pos < data.len() {
        if cancel.is_cancelled() {
            tracing::debug!("Carve cancelled at offset {}", base_offset + pos as u64);
            break;
        }

        if pos >= skip_until {
            if let Some((file_type, length, complete)) =
                carve_at(&data[pos..], options.max_carve_size)
            {
                tracing::debug!(
                    "Carved {} at offset {} ({} bytes, complete: {})",
                    file_type,
                    base_offset + pos as u64,
                    length,
                    complete
                );
                regions.push(CarvedRegion {
                    offset: base_offset + pos as u64,
                    length: length as u64,
                    file_type,
                    complete,
                });
                if complete {
                    skip_until = pos + length;
                }
            }
        }

        pos += sector;
        sectors_seen += 1;
        if sectors_seen % PROGRESS_STRIDE == 0 {
            on_progress(pos as f32 / data.len() as f32);
        }
    }

    on_progress(1.0);
    regions
}

/// Find `footer` at or after `from`; the file ends right after it
fn find_end(window: &[u8], footer: &[u8], from: usize) -> (usize, bool) {
    if window.len() < from + footer.len() {
        return (window.len(), false);
    }
    match window[from..]
        .windows(footer.len())
        .position(|w| w == footer)
    {
        Some(idx) => {
            (from + idx + footer.len(), true)
        }
        None => (window.len(), false),
    }
}

fn walk_png_chunks(window: &[u8]) -> (usize, bool) {
    let mut pos = PNG_MAGIC.len();
    loop {
        if pos + 12 > window.len() {
            break;
        }
        let len = BigEndian::read_u32(&window[pos..pos + 4]) as usize;
        let end = match pos.checked_add(12 + len) {
            Some(end) if end <= window.len() => end,
            _ => break,
        };
        let crc = BigEndian::read_u32(&window[end - 4..end]);
        if crc32fast::hash(&window[pos + 4..end - 4]) != crc {
            tracing::debug!("PNG chunk CRC mismatch at {}", pos);
            break;
        }
        let chunk_type = &window[pos + 4..pos + 8];
        pos = end;
        if chunk_type == b"IEND" {
            return (pos, true);
        }
    }
    (pos, false)
}

fn zip_end(window: &[u8]) -> (usize, bool) {
    let eocd = b"PK\x05\x06";
    match window
        .get(4..)
        .and_then(|rest| rest.windows(eocd.len()).position(|w| w == eocd))
    {
        Some(idx) => {
            let pos = 4 + idx;
            if pos + 22 > window.len() {
                return (window.len(), false);
            }
            let comment_len = LittleEndian::read_u16(&window[pos + 20..pos + 22]) as usize;
            let end = pos + 22 + comment_len;
            if end > window.len() {
                (window.len(), false)
            } else {
                (end, true)
            }
        }
        None => (window.len(), false),
    }
}

fn walk_mp4_boxes(window: &[u8]) -> (usize, bool) {
    let mut pos = 0usize;
    let mut seen_moov = false;
    let mut seen_mdat = false;

    while pos + 8 <= window.len() {
        let box_type = &window[pos + 4..pos + 8];
        if !box_type
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b' ')
        {
            break;
        }
        let size = match BigEndian::read_u32(&window[pos..pos + 4]) as u64 {
            0 => (window.len() - pos) as u64,
            1 => {
                if pos + 16 > window.len() {
                    break;
                }
                BigEndian::read_u64(&window[pos + 8..pos + 16])
            }
            s => s,
        };
        match (pos as u64).checked_add(size) {
            Some(end) if size >= 8 && end <= window.len() as u64 => {}
            _ => break,
        }
        match box_type {
            b"moov" => seen_moov = true,
            b"mdat" => seen_mdat = true,
            _ => {}
        }
        pos += size as usize;
    }

    if pos == 0 {
        return (window.len(), false);
    }
    (pos, seen_moov && seen_mdat)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal valid PNG: signature, IHDR, IDAT, IEND with correct CRCs
    pub(crate) fn tiny_png() -> Vec<u8> {
        fn chunk(out: &mut Vec<u8>, kind: &[u8], data: &[u8]) {
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            let mut body = kind.to_vec();
            body.extend_from_slice(data);
            out.extend_from_slice(&body);
            out.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
        }
        let mut png = PNG_MAGIC.to_vec();
        chunk(&mut png, b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0]);
        chunk(&mut png, b"IDAT", &[0x78, 0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01]);
        chunk(&mut png, b"IEND", &[]);
        png
    }

    pub(crate) fn tiny_jpeg() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        jpeg.extend_from_slice(b"JFIF\0");
        jpeg.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
        jpeg.extend_from_slice(&[0x12; 40]);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_png_walk_finds_iend() {
        let png = tiny_png();
        let mut data = png.clone();
        data.extend_from_slice(&[0xAA; 100]);
        let (kind, len, complete) = carve_at(&data, 1 << 20).unwrap();
        assert_eq!(kind, FileType::Png);
        assert_eq!(len, png.len());
        assert!(complete);
    }

    #[test]
    fn test_png_bad_crc_is_incomplete() {
        let mut png = tiny_png();
        let last = png.len() - 1;
        png[last] ^= 0xFF;
        let (_, len, complete) = carve_at(&png, 1 << 20).unwrap();
        assert!(!complete);
        assert!(len < png.len());
    }

    #[test]
    fn test_jpeg_ends_at_eoi() {
        let jpeg = tiny_jpeg();
        let mut data = jpeg.clone();
        data.extend_from_slice(&[0u8; 64]);
        assert_eq!(carve_at(&data, 1 << 20), Some((FileType::Jpeg, jpeg.len(), true)));
    }

    #[test]
    fn test_zip_includes_comment() {
        let mut zip = vec![0x50, 0x4B, 0x03, 0x04];
        zip.extend_from_slice(&[0u8; 26]);
        zip.extend_from_slice(b"PK\x05\x06");
        zip.extend_from_slice(&[0u8; 16]);
        zip.extend_from_slice(&3u16.to_le_bytes());
        zip.extend_from_slice(b"abc");
        let expected = zip.len();
        zip.extend_from_slice(&[0xEE; 32]);
        assert_eq!(carve_at(&zip, 1 << 20), Some((FileType::Zip, expected, true)));
    }

    fn mp4_box(kind: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn ftyp() -> Vec<u8> {
        mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2")
    }

    #[test]
    fn test_mp4_with_moov_and_mdat_is_complete() {
        let mut mp4 = ftyp();
        mp4.extend(mp4_box(b"moov", &[0x11; 32]));
        mp4.extend(mp4_box(b"mdat", &[0x22; 128]));
        let expected = mp4.len();
        mp4.extend_from_slice(&[0xFF; 40]);
        assert_eq!(carve_at(&mp4, 1 << 20), Some((FileType::Mp4, expected, true)));
    }

    #[test]
    fn test_mp4_without_moov_is_incomplete() {
        let mut mp4 = ftyp();
        mp4.extend(mp4_box(b"mdat", &[0x22; 64]));
        let expected = mp4.len();
        assert_eq!(carve_at(&mp4, 1 << 20), Some((FileType::Mp4, expected, false)));
    }

    #[test]
    fn test_mp4_huge_extended_size_stops_walk() {
        let mut mp4 = ftyp();
        let ftyp_len = mp4.len();
        mp4.extend_from_slice(&[0, 0, 0, 1]);
        mp4.extend_from_slice(b"mdat");
        mp4.extend_from_slice(&u64::MAX.to_be_bytes());
        mp4.extend_from_slice(&[0x22; 64]);
        assert_eq!(carve_at(&mp4, 1 << 20), Some((FileType::Mp4, ftyp_len, false)));
    }

    #[test]
    fn test_tiny_max_carve_size_is_widened() {
        let mut mp4 = ftyp();
        mp4.extend(mp4_box(b"mdat", &[0x22; 200]));
        // The mdat box runs past the widened window, so the walk stops after ftyp
        let (kind, len, complete) = carve_at(&mp4, 2).unwrap();
        assert_eq!(kind, FileType::Mp4);
        assert_eq!(len, ftyp().len());
        assert!(!complete);

        let jpeg = tiny_jpeg();
        assert!(carve_at(&jpeg, 0).is_some());
    }

    #[test]
    fn test_no_terminator_uses_window() {
        let mut ole = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        ole.extend_from_slice(&[0u8; 1000]);
        assert_eq!(carve_at(&ole, 256), Some((FileType::Doc, 256, false)));
    }

    #[test]
    fn test_scan_buffer_finds_sector_aligned_hits() {
        let mut image = vec![0u8; 4096];
        let png = tiny_png();
        image[1024..1024 + png.len()].copy_from_slice(&png);
        let jpeg = tiny_jpeg();
        image[2560..2560 + jpeg.len()].copy_from_slice(&jpeg);
        // Unaligned header is ignored
        image[3000..3003].copy_from_slice(&[0xFF, 0xD8, 0xFF]);

        let regions = scan_buffer(
            &image,
            1_000_000,
            &CarveOptions::default(),
            &CancellationToken::new(),
            |_| {},
        );
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].offset, 1_001_024);
        assert_eq!(regions[0].file_type, FileType::Png);
        assert_eq!(regions[1].offset, 1_002_560);
        assert_eq!(regions[1].file_type, FileType::Jpeg);
    }

    #[test]
    fn test_scan_buffer_skip_leading() {
        let png = tiny_png();
        let mut data = png.clone();
        data.resize(2048, 0);
        let options = CarveOptions {
            skip_leading: true,
            ..Default::default()
        };
        let regions = scan_buffer(&data, 0, &options, &CancellationToken::new(), |_| {});
        assert!(regions.is_empty());
    }

    #[test]
    fn test_scan_buffer_honours_cancellation() {
        let data = vec![0u8; 64 * 1024];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let regions = scan_buffer(&data, 0, &CarveOptions::default(), &cancel, |_| {});
        assert!(regions.is_empty());
    }
}
