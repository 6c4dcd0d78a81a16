//! Half-max-age refetch suppression, so a renderer re-announcing every few
//! seconds doesn't trigger a description re-fetch on every NOTIFY.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

struct Seen {
    last_seen: Instant,
}

pub struct UdnRegistry {
    seen: Mutex<HashMap<String, Seen>>,
}

impl Default for UdnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UdnRegistry {
    pub fn new() -> Self {
        UdnRegistry {
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `udn` should be (re-)fetched: either never seen
    /// before, or more than half of `max_age` seconds have elapsed since it
    /// was last seen.
    pub fn should_fetch(&self, udn: &str, max_age: u64) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        match seen.get_mut(udn) {
            Some(entry) => {
                if now.duration_since(entry.last_seen).as_secs() > max_age / 2 {
                    entry.last_seen = now;
                    true
                } else {
                    false
                }
            }
            None => {
                seen.insert(udn.to_string(), Seen { last_seen: now });
                true
            }
        }
    }

    pub fn forget(&self, udn: &str) {
        self.seen.lock().unwrap().remove(udn);
    }
}

/// Extracts the `uuid:...` UDN from a `USN` header value
/// (`uuid:<udn>::urn:...`).
pub fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    let idx = lower.find("uuid:")?;
    let sub = &lower[idx..];
    match sub.find("::") {
        Some(end) => Some(sub[..end].to_string()),
        None => Some(sub.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_always_fetches() {
        let reg = UdnRegistry::new();
        assert!(reg.should_fetch("uuid:abc", 1800));
    }

    #[test]
    fn immediate_resighting_is_suppressed() {
        let reg = UdnRegistry::new();
        assert!(reg.should_fetch("uuid:abc", 1800));
        assert!(!reg.should_fetch("uuid:abc", 1800));
    }

    #[test]
    fn extracts_udn_with_service_suffix() {
        assert_eq!(
            extract_udn_from_usn(
                "uuid:abc-123::urn:schemas-upnp-org:device:MediaRenderer:1"
            ),
            Some("uuid:abc-123".to_string())
        );
    }

    #[test]
    fn extracts_udn_without_suffix() {
        assert_eq!(extract_udn_from_usn("uuid:abc-123"), Some("uuid:abc-123".to_string()));
    }

    #[test]
    fn none_without_uuid_prefix() {
        assert_eq!(extract_udn_from_usn("upnp:rootdevice"), None);
    }
}
