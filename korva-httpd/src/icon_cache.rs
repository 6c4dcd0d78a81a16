//! Icon Cache (component A): stable filesystem paths for per-device icons.
//!
//! Grounded loosely on `pmocovers::cache`'s directory-under-cache-dir
//! pattern, trimmed to a plain path map — no SQLite index, no webp
//! transcoding, since Korva only ever downloads one icon per device and
//! serves it back verbatim.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use korva_renderer::{DeviceKind, IconStore};

const SERVER_ICON_URL: &str = "https://raw.githubusercontent.com/upnp/ref/master/icons/server.png";
const PLAYER_ICON_URL: &str = "https://raw.githubusercontent.com/upnp/ref/master/icons/player.png";

/// Maps device UIDs to stable icon file paths under a single cache
/// directory, created on first use with owner-only permissions.
pub struct IconCache {
    dir: PathBuf,
    http: reqwest::Client,
}

impl IconCache {
    pub fn new(dir: PathBuf, http: reqwest::Client) -> io::Result<Self> {
        ensure_private_dir(&dir)?;
        Ok(Self { dir, http })
    }

    /// Returns the file URL for `uid`'s icon if it has already been
    /// downloaded, else `None`.
    pub fn lookup(&self, uid: &str) -> Option<String> {
        let path = self.path_for(uid);
        if path.is_file() {
            Some(format!("file://{}", path.display()))
        } else {
            None
        }
    }

    /// Returns the write path for `uid`'s icon. No guarantee the file
    /// exists yet.
    pub fn create_path(&self, uid: &str) -> PathBuf {
        self.path_for(uid)
    }

    /// A built-in icon URL for devices that never yield one of their own.
    pub fn default_for(kind: DeviceKind) -> &'static str {
        match kind {
            DeviceKind::Server => SERVER_ICON_URL,
            DeviceKind::Player => PLAYER_ICON_URL,
        }
    }

    fn path_for(&self, uid: &str) -> PathBuf {
        let digest = md5::compute(uid.as_bytes());
        self.dir.join(hex::encode(digest.0))
    }
}

#[async_trait::async_trait]
impl IconStore for IconCache {
    async fn store(&self, uid: &str, icon_url: &str) -> Option<String> {
        let bytes = match self.http.get(icon_url).send().await {
            Ok(resp) => match resp.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    warn!("icon download for {} failed to read body: {}", uid, e);
                    return None;
                }
            },
            Err(e) => {
                warn!("icon download for {} failed: {}", uid, e);
                return None;
            }
        };
        let path = self.create_path(uid);
        if let Err(e) = fs::write(&path, &bytes) {
            warn!("failed writing icon for {}: {}", uid, e);
            return None;
        }
        Some(format!("file://{}", path.display()))
    }
}

#[cfg(unix)]
fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_none_before_any_download() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IconCache::new(tmp.path().join("icons"), reqwest::Client::new()).unwrap();
        assert!(cache.lookup("uuid:abc").is_none());
    }

    #[test]
    fn create_path_then_write_makes_lookup_succeed() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IconCache::new(tmp.path().join("icons"), reqwest::Client::new()).unwrap();
        let path = cache.create_path("uuid:abc");
        fs::write(&path, b"not actually a png").unwrap();
        assert!(cache.lookup("uuid:abc").is_some());
    }

    #[test]
    fn same_uid_always_maps_to_same_path() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = IconCache::new(tmp.path().join("icons"), reqwest::Client::new()).unwrap();
        assert_eq!(cache.create_path("uuid:abc"), cache.create_path("uuid:abc"));
    }

    #[test]
    fn default_icons_differ_by_kind() {
        assert_ne!(
            IconCache::default_for(DeviceKind::Server),
            IconCache::default_for(DeviceKind::Player)
        );
    }
}
