//! JSON snapshots of feed state, one file per feed under the state directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;
use twap_oracle::{CacheSnapshot, TwapCache};

/// Snapshot file for `feed` inside `state_dir`.
///
/// Path separators in the feed name are replaced, so `ETH/USD` maps to
/// `ETH-USD.json`.
pub fn snapshot_path(state_dir: &Path, feed: &str) -> PathBuf {
    let file_name: String = feed
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    state_dir.join(format!("{file_name}.json"))
}

/// Write `snapshot` for `feed`, replacing any earlier one.
pub fn save(state_dir: &Path, feed: &str, snapshot: &CacheSnapshot) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("creating {}", state_dir.display()))?;
    let path = snapshot_path(state_dir, feed);
    let tmp = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;

    debug!(feed, path = %path.display(), "snapshot saved");
    Ok(path)
}

/// Restore `feed` from its snapshot, or `None` if it has never been saved.
///
/// A snapshot that fails validation is an error rather than a fresh start.
pub fn load(state_dir: &Path, feed: &str) -> anyhow::Result<Option<TwapCache>> {
    let path = snapshot_path(state_dir, feed);
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot: CacheSnapshot =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    let cache = TwapCache::restore(snapshot).with_context(|| format!("restoring {}", path.display()))?;
    Ok(Some(cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use twap_oracle::{Price, TwapEngine};

    const T0: u64 = 1_700_000_000;

    fn state_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("twapd-snapshot-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_snapshot_path_replaces_separators() {
        let dir = Path::new("/var/lib/twapd");
        assert_eq!(
            snapshot_path(dir, "ETH/USD"),
            PathBuf::from("/var/lib/twapd/ETH-USD.json")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = state_dir("roundtrip");
        let mut cache = TwapCache::new(TwapEngine::new(2).expect("engine"));
        for (i, price) in [400u64, 405, 410].into_iter().enumerate() {
            cache
                .record_observation(Price::from_integer(price), T0 + 15 * i as u64)
                .expect("record");
        }
        cache.get_price(45, T0 + 45).expect("twap");

        let path = save(&dir, "ETH/USD", &cache.snapshot()).expect("save");
        assert!(path.ends_with("ETH-USD.json"));

        let restored = load(&dir, "ETH/USD").expect("load").expect("present");
        std::fs::remove_dir_all(&dir).expect("cleanup");

        assert_eq!(restored.snapshot(), cache.snapshot());
        assert_eq!(restored.peek(45, T0 + 45), cache.peek(45, T0 + 45));
    }

    #[test]
    fn test_load_absent_snapshot() {
        let dir = state_dir("absent");
        assert!(load(&dir, "ETH/USD").expect("load").is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_error() {
        let dir = state_dir("corrupt");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(snapshot_path(&dir, "ETH/USD"), "{\"engine\": 7}").expect("write");
        let result = load(&dir, "ETH/USD");
        std::fs::remove_dir_all(&dir).expect("cleanup");
        assert!(result.is_err());
    }
}
