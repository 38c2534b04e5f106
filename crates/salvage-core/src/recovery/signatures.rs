/// Content-based file type identification
///
/// On-disk bytes are ground truth: a signature match beats the file extension,
/// which beats a declared MIME type. Names and metadata are often stale or
/// fabricated after deletion, the magic bytes are not.
use crate::FileType;

/// Number of leading bytes callers should read before classifying
pub const HEADER_PROBE_LEN: usize = 64;

/// One entry of the magic-byte table
#[derive(Debug, Clone, Copy)]
pub struct FileSignature {
    pub signature: &'static [u8],
    pub offset: usize,
    pub file_type: FileType,
    pub description: &'static str,
    /// Strong enough to anchor a raw carve
    pub carvable: bool,
}

impl FileSignature {
    pub fn matches(&self, data: &[u8]) -> bool {
        let end = self.offset + self.signature.len();
        end <= data.len() && &data[self.offset..end] == self.signature
    }
}

/// The signature database, checked in order
pub const SIGNATURES: &[FileSignature] = &[
    FileSignature {
        signature: &[0xFF, 0xD8, 0xFF],
        offset: 0,
        file_type: FileType::Jpeg,
        description: "JPEG Image",
        carvable: true,
    },
    FileSignature {
        signature: &[0x89, 0x50, 0x4E, 0x47],
        offset: 0,
        file_type: FileType::Png,
        description: "PNG Image",
        carvable: true,
    },
    FileSignature {
        signature: b"GIF8",
        offset: 0,
        file_type: FileType::Gif,
        description: "GIF Image",
        carvable: true,
    },
    FileSignature {
        signature: b"%PDF",
        offset: 0,
        file_type: FileType::Pdf,
        description: "PDF Document",
        carvable: true,
    },
    FileSignature {
        signature: &[0x50, 0x4B, 0x03, 0x04],
        offset: 0,
        file_type: FileType::Zip,
        description: "ZIP Archive",
        carvable: true,
    },
    FileSignature {
        signature: &[0x50, 0x4B, 0x05, 0x06],
        offset: 0,
        file_type: FileType::Zip,
        description: "ZIP Archive (empty)",
        carvable: false,
    },
    FileSignature {
        signature: &[0x50, 0x4B, 0x07, 0x08],
        offset: 0,
        file_type: FileType::Zip,
        description: "ZIP Archive (spanned)",
        carvable: false,
    },
    FileSignature {
        signature: &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
        offset: 0,
        file_type: FileType::Doc,
        description: "Microsoft Office Legacy Document",
        carvable: true,
    },
    FileSignature {
        signature: b"ftyp",
        offset: 4,
        file_type: FileType::Mp4,
        description: "ISO-BMFF / MPEG-4",
        carvable: true,
    },
    FileSignature {
        signature: b"ID3",
        offset: 0,
        file_type: FileType::Mp3,
        description: "MP3 Audio with ID3",
        carvable: true,
    },
];

/// Bare MPEG audio frame sync (11 set bits). Too weak to carve on.
fn is_mpeg_frame_sync(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xE0) == 0xE0
}

/// Identify a file type from its leading bytes
pub fn classify_by_signature(data: &[u8]) -> FileType {
    if let Some(sig) = SIGNATURES.iter().find(|sig| sig.matches(data)) {
        return sig.file_type;
    }
    if is_mpeg_frame_sync(data) {
        return FileType::Mp3;
    }
    FileType::Unknown
}

/// Signature lookup restricted to entries strong enough to anchor a carve
pub fn match_carvable(data: &[u8]) -> Option<&'static FileSignature> {
    SIGNATURES
        .iter()
        .filter(|sig| sig.carvable)
        .find(|sig| sig.matches(data))
}

/// Case-insensitive extension lookup; a leading dot is tolerated
pub fn classify_by_extension(extension: &str) -> FileType {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => FileType::Jpeg,
        "png" => FileType::Png,
        "gif" => FileType::Gif,
        "mp4" | "m4v" => FileType::Mp4,
        "mp3" => FileType::Mp3,
        "pdf" => FileType::Pdf,
        "zip" | "rar" => FileType::Zip,
        "doc" => FileType::Doc,
        "docx" => FileType::Docx,
        "xls" => FileType::Xls,
        "xlsx" => FileType::Xlsx,
        "heic" | "heif" | "webp" | "bmp" | "tif" | "tiff" | "dng" => FileType::Image,
        "mov" | "avi" | "mkv" | "webm" | "3gp" => FileType::Video,
        "wav" | "flac" | "aac" | "ogg" | "m4a" | "amr" | "opus" => FileType::Audio,
        "txt" | "rtf" | "odt" | "ods" | "ppt" | "pptx" => FileType::Document,
        _ => FileType::Unknown,
    }
}

/// Prefix/substring match against a declared MIME type
pub fn classify_by_mime(mime: &str) -> FileType {
    let mime = mime.trim().to_ascii_lowercase();
    let exact: &[(&str, FileType)] = &[
        ("image/jpeg", FileType::Jpeg),
        ("image/png", FileType::Png),
        ("image/gif", FileType::Gif),
        ("video/mp4", FileType::Mp4),
        ("audio/mpeg", FileType::Mp3),
        ("application/pdf", FileType::Pdf),
        ("application/zip", FileType::Zip),
        ("application/msword", FileType::Doc),
        ("application/vnd.ms-excel", FileType::Xls),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml",
            FileType::Docx,
        ),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml",
            FileType::Xlsx,
        ),
    ];
    if let Some((_, file_type)) = exact.iter().find(|(prefix, _)| mime.starts_with(prefix)) {
        return *file_type;
    }

    if mime.starts_with("image/") {
        FileType::Image
    } else if mime.starts_with("video/") {
        FileType::Video
    } else if mime.starts_with("audio/") {
        FileType::Audio
    } else if mime.contains("document") {
        FileType::Document
    } else {
        FileType::Unknown
    }
}

/// Every signal available about one piece of content
#[derive(Debug, Clone, Copy, Default)]
pub struct Classification<'a> {
    pub bytes: Option<&'a [u8]>,
    pub extension: Option<&'a str>,
    pub mime: Option<&'a str>,
}

impl<'a> Classification<'a> {
    pub fn bytes(bytes: &'a [u8]) -> Self {
        Self {
            bytes: Some(bytes),
            ..Default::default()
        }
    }

    pub fn extension(extension: &'a str) -> Self {
        Self {
            extension: Some(extension),
            ..Default::default()
        }
    }

    pub fn mime(mime: &'a str) -> Self {
        Self {
            mime: Some(mime),
            ..Default::default()
        }
    }

    pub fn with_extension(mut self, extension: Option<&'a str>) -> Self {
        self.extension = extension;
        self
    }

    pub fn with_mime(mut self, mime: Option<&'a str>) -> Self {
        self.mime = mime;
        self
    }
}

/// Resolve a file type with signature > extension > MIME precedence
///
/// Container families are refined by the weaker signals: a ZIP signature named
/// `.docx` stays a DOCX and an OLE signature named `.xls` stays an XLS, since
/// the bytes agree with the more specific name.
pub fn classify(input: Classification<'_>) -> FileType {
    let by_extension = input
        .extension
        .map(classify_by_extension)
        .unwrap_or_default();
    let by_mime = input.mime.map(classify_by_mime).unwrap_or_default();

    if let Some(bytes) = input.bytes {
        let by_signature = classify_by_signature(bytes);
        if by_signature != FileType::Unknown {
            return refine_family(by_signature, by_extension)
                .or_else(|| refine_family(by_signature, by_mime))
                .unwrap_or(by_signature);
        }
    }

    if by_extension != FileType::Unknown {
        return by_extension;
    }
    by_mime
}

fn refine_family(signature: FileType, hint: FileType) -> Option<FileType> {
    match (signature, hint) {
        (FileType::Zip, FileType::Docx | FileType::Xlsx) => Some(hint),
        (FileType::Doc, FileType::Xls) => Some(hint),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_signature_detection() {
        let jpeg_header = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(classify_by_signature(&jpeg_header), FileType::Jpeg);
    }

    #[test]
    fn test_png_signature_detection() {
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(classify_by_signature(&png_header), FileType::Png);
    }

    #[test]
    fn test_mp4_ftyp_at_offset_four() {
        let mp4 = [0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm'];
        assert_eq!(classify_by_signature(&mp4), FileType::Mp4);
    }

    #[test]
    fn test_short_buffer_is_unknown() {
        assert_eq!(classify_by_signature(&[0x89, 0x50]), FileType::Unknown);
        assert_eq!(classify_by_signature(&[]), FileType::Unknown);
        // "ftyp" needs eight bytes
        assert_eq!(classify_by_signature(&[0, 0, 0, 0x18, b'f', b't']), FileType::Unknown);
    }

    #[test]
    fn test_mpeg_frame_sync_is_classified_but_not_carvable() {
        let frame = [0xFF, 0xFB, 0x90, 0x64];
        assert_eq!(classify_by_signature(&frame), FileType::Mp3);
        assert!(match_carvable(&frame).is_none());
    }

    #[test]
    fn test_extension_lookup_is_case_insensitive() {
        assert_eq!(classify_by_extension("JPG"), FileType::Jpeg);
        assert_eq!(classify_by_extension(".Png"), FileType::Png);
        assert_eq!(classify_by_extension("xyz"), FileType::Unknown);
    }

    #[test]
    fn test_mime_table() {
        assert_eq!(classify_by_mime("image/jpeg"), FileType::Jpeg);
        assert_eq!(classify_by_mime("IMAGE/PNG"), FileType::Png);
        assert_eq!(classify_by_mime("video/quicktime"), FileType::Video);
        assert_eq!(classify_by_mime("audio/ogg"), FileType::Audio);
        assert_eq!(classify_by_mime("application/vnd.oasis.opendocument.text-document"), FileType::Document);
        assert_eq!(classify_by_mime("text/plain"), FileType::Unknown);
    }

    #[test]
    fn test_signature_beats_extension_and_mime() {
        let bytes = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1];
        let kind = classify(
            Classification::bytes(&bytes)
                .with_extension(Some("txt"))
                .with_mime(Some("text/plain")),
        );
        assert_eq!(kind, FileType::Jpeg);
    }

    #[test]
    fn test_extension_beats_mime_without_signature() {
        let kind = classify(Classification::extension("png").with_mime(Some("image/jpeg")));
        assert_eq!(kind, FileType::Png);

        let unmatched = [0u8; 16];
        let kind = classify(Classification::bytes(&unmatched).with_mime(Some("application/pdf")));
        assert_eq!(kind, FileType::Pdf);
    }

    #[test]
    fn test_zip_family_refined_by_extension() {
        let zip = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x06, 0x00];
        assert_eq!(
            classify(Classification::bytes(&zip).with_extension(Some("docx"))),
            FileType::Docx
        );
        // An unrelated name does not override the bytes
        assert_eq!(
            classify(Classification::bytes(&zip).with_extension(Some("jpg"))),
            FileType::Zip
        );
    }
}
