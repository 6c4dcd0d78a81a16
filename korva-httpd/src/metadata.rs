//! Metadata Resolver (component B): derives `ContentType`, `Size`, `Title`,
//! and `DLNAProfile` for a locally-hosted file, per spec §4.B's decision
//! table. Never overwrites a caller-supplied value.

use std::fs;
use std::path::Path;

use korva_didl::UpnpClass;
use korva_errors::KorvaError;

/// Recognized metadata keys for a Host Lease (spec §3 "Metadata Record").
#[derive(Debug, Clone, Default)]
pub struct MetadataRecord {
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub dlna_profile: Option<String>,
}

impl MetadataRecord {
    pub fn upnp_class(&self) -> Option<UpnpClass> {
        let content_type = self.content_type.as_deref()?;
        Some(classify(content_type))
    }
}

fn classify(content_type: &str) -> UpnpClass {
    if content_type.starts_with("video/") {
        UpnpClass::VideoItem
    } else if content_type.starts_with("audio/") {
        UpnpClass::MusicTrack
    } else {
        UpnpClass::Photo
    }
}

/// Fills gaps in `record` from `path`'s filesystem/content properties.
/// `display_name` is used only when `Title` is unset.
pub fn resolve(
    path: &Path,
    display_name: &str,
    mut record: MetadataRecord,
) -> Result<MetadataRecord, KorvaError> {
    let meta = fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KorvaError::FileNotFound(path.display().to_string())
        } else {
            KorvaError::NotAccessible(path.display().to_string())
        }
    })?;
    if !meta.is_file() {
        return Err(KorvaError::FileNotFound(path.display().to_string()));
    }
    fs::File::open(path).map_err(|_| KorvaError::NotAccessible(path.display().to_string()))?;

    if record.size.is_none() {
        record.size = Some(meta.len());
    }
    if record.content_type.is_none() {
        record.content_type = Some(
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        );
    }
    if record.title.is_none() {
        record.title = Some(display_name.to_string());
    }
    if record.dlna_profile.is_none() {
        record.dlna_profile = guess_profile(path, record.content_type.as_deref().unwrap());
    }

    Ok(record)
}

/// Spec §4.B's fixed decision table. Returns `None` when no row matches —
/// the caller is expected to have supplied a profile, or the content has
/// none.
fn guess_profile(path: &Path, content_type: &str) -> Option<String> {
    match content_type {
        "video/mp4" if path_contains_dcim(path) => Some("MPEG4_P2_MP4_SP_L6_AAC".to_string()),
        "image/png" => Some("PNG_LRG".to_string()),
        "image/jpeg" => dimensions(path).and_then(|(w, h)| jpeg_profile_for(w, h)),
        "audio/mpeg" => Some("MP3".to_string()),
        _ => None,
    }
}

fn path_contains_dcim(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().eq_ignore_ascii_case("DCIM"))
}

fn jpeg_profile_for(width: u32, height: u32) -> Option<String> {
    if width <= 640 && height <= 480 {
        Some("JPEG_SM".to_string())
    } else if width <= 1024 && height <= 768 {
        Some("JPEG_MED".to_string())
    } else if width <= 4096 && height <= 4096 {
        Some("JPEG_LRG".to_string())
    } else {
        None
    }
}

fn dimensions(path: &Path) -> Option<(u32, u32)> {
    image::image_dimensions(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, bytes: &[u8]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join(name)).unwrap();
        f.write_all(bytes).unwrap();
        dir
    }

    #[test]
    fn fills_size_and_content_type_and_title() {
        let dir = write_temp("song.mp3", b"\0\0\0\0\0\0\0\0");
        let record = resolve(&dir.path().join("song.mp3"), "My Song", MetadataRecord::default())
            .unwrap();
        assert_eq!(record.size, Some(8));
        assert_eq!(record.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(record.title.as_deref(), Some("My Song"));
        assert_eq!(record.dlna_profile.as_deref(), Some("MP3"));
    }

    #[test]
    fn caller_supplied_values_are_never_overwritten() {
        let dir = write_temp("x.jpg", b"not a real jpeg but bytes exist");
        let mut input = MetadataRecord::default();
        input.content_type = Some("x-custom/content".to_string());
        input.title = Some("T".to_string());
        input.dlna_profile = Some("P".to_string());
        let record = resolve(&dir.path().join("x.jpg"), "ignored", input).unwrap();
        assert_eq!(record.content_type.as_deref(), Some("x-custom/content"));
        assert_eq!(record.title.as_deref(), Some("T"));
        assert_eq!(record.dlna_profile.as_deref(), Some("P"));
        assert_ne!(record.size, Some(123456));
    }

    #[test]
    fn missing_file_fails_with_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(&dir.path().join("nope"), "x", MetadataRecord::default()).unwrap_err();
        assert_eq!(err, KorvaError::FileNotFound(dir.path().join("nope").display().to_string()));
    }

    #[test]
    fn png_is_always_png_lrg() {
        let dir = write_temp("x.png", b"not real png data");
        let record = resolve(&dir.path().join("x.png"), "x", MetadataRecord::default()).unwrap();
        assert_eq!(record.dlna_profile.as_deref(), Some("PNG_LRG"));
    }
}
