//! DIDL-Lite construction for `AVTransport::SetAVTransportURI`'s
//! `CurrentURIMetaData` argument.
//!
//! Korva only ever pushes a single local file, so this is a deliberately
//! small subset of DIDL-Lite: one `<item>`, one `<res>`, no containers,
//! no search/sort metadata. Compare `pmodidl`, which models the full
//! ContentDirectory browse/search tree because PMOMusic acts as a
//! MediaServer; Korva doesn't.

use serde::Serialize;

/// `UPnPClass` from the Metadata Record (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpnpClass {
    VideoItem,
    MusicTrack,
    Photo,
}

impl UpnpClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpnpClass::VideoItem => "object.item.videoItem",
            UpnpClass::MusicTrack => "object.item.audioItem.musicTrack",
            UpnpClass::Photo => "object.item.imageItem.photo",
        }
    }
}

impl std::fmt::Display for UpnpClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "DIDL-Lite")]
struct DidlLite {
    #[serde(rename = "@xmlns")]
    xmlns: String,
    #[serde(rename = "@xmlns:upnp")]
    xmlns_upnp: String,
    #[serde(rename = "@xmlns:dc")]
    xmlns_dc: String,
    item: Item,
}

#[derive(Debug, Clone, Serialize)]
struct Item {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@parentID")]
    parent_id: String,
    #[serde(rename = "@restricted")]
    restricted: String,
    #[serde(rename = "dc:title")]
    title: String,
    #[serde(rename = "upnp:class")]
    class: String,
    res: Res,
}

#[derive(Debug, Clone, Serialize)]
struct Res {
    #[serde(rename = "@protocolInfo")]
    protocol_info: String,
    #[serde(rename = "@size")]
    size: u64,
    #[serde(rename = "$text")]
    url: String,
}

/// Fields needed to describe a single hosted file as a DIDL-Lite item.
pub struct ItemMetadata<'a> {
    pub class: UpnpClass,
    pub title: &'a str,
    pub size: u64,
    pub protocol_info: &'a str,
    pub url: &'a str,
}

/// Builds the `CurrentURIMetaData` XML for a push (spec §4.E, §4.G step 6).
///
/// The item id is always `"0"` and parentID `"-1"`: Korva never exposes a
/// navigable hierarchy, so these values are placeholders a renderer is not
/// expected to dereference.
pub fn build_item_metadata(meta: &ItemMetadata<'_>) -> Result<String, quick_xml::SeError> {
    let didl = DidlLite {
        xmlns: "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/".to_string(),
        xmlns_upnp: "urn:schemas-upnp-org:metadata-1-0/upnp/".to_string(),
        xmlns_dc: "http://purl.org/dc/elements/1.1/".to_string(),
        item: Item {
            id: "0".to_string(),
            parent_id: "-1".to_string(),
            restricted: "1".to_string(),
            title: meta.title.to_string(),
            class: meta.class.as_str().to_string(),
            res: Res {
                protocol_info: meta.protocol_info.to_string(),
                size: meta.size,
                url: meta.url.to_string(),
            },
        },
    };

    quick_xml::se::to_string(&didl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_well_formed_item() {
        let xml = build_item_metadata(&ItemMetadata {
            class: UpnpClass::Photo,
            title: "beach.jpg",
            size: 123_456,
            protocol_info: "http-get:*:image/jpeg:DLNA.ORG_PN=JPEG_SM;DLNA.ORG_OP=01",
            url: "http://192.168.1.2:4004/item/abc123",
        })
        .unwrap();

        assert!(xml.contains("DIDL-Lite"));
        assert!(xml.contains("object.item.imageItem.photo"));
        assert!(xml.contains("beach.jpg"));
        assert!(xml.contains("123456"));
        assert!(xml.contains("http://192.168.1.2:4004/item/abc123"));
    }

    #[test]
    fn class_strings_match_spec_table() {
        assert_eq!(UpnpClass::VideoItem.as_str(), "object.item.videoItem");
        assert_eq!(
            UpnpClass::MusicTrack.as_str(),
            "object.item.audioItem.musicTrack"
        );
        assert_eq!(UpnpClass::Photo.as_str(), "object.item.imageItem.photo");
    }
}
