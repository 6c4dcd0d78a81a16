//! The `source` map a `Push` call carries (spec §6): recognized keys and
//! the caller-supplied overrides that flow into the Metadata Resolver
//! without ever being silently dropped.

use korva_httpd::MetadataRecord;

/// Recognized `source` keys for `Push` (spec §6). Only `uri` is required;
/// everything else seeds [`korva_httpd::MetadataRecord`] and is never
/// overwritten by the resolver.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    pub uri: Option<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub dlna_profile: Option<String>,
    pub size: Option<u64>,
}

impl SourceMap {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    pub fn into_record(self) -> MetadataRecord {
        MetadataRecord {
            size: self.size,
            content_type: self.content_type,
            title: self.title,
            dlna_profile: self.dlna_profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_record_carries_every_caller_supplied_field() {
        let source = SourceMap {
            uri: Some("file:///a/x.jpg".to_string()),
            title: Some("T".to_string()),
            content_type: Some("x-custom/content".to_string()),
            dlna_profile: Some("P".to_string()),
            size: Some(42),
        };
        let record = source.into_record();
        assert_eq!(record.title.as_deref(), Some("T"));
        assert_eq!(record.content_type.as_deref(), Some("x-custom/content"));
        assert_eq!(record.dlna_profile.as_deref(), Some("P"));
        assert_eq!(record.size, Some(42));
    }
}
