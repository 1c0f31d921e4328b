use dashmap::DashMap;

use visync_shared::{TokenVersion, VisualId};

/// Per-visual registration versions. A packet built against an older version
/// than the current one is stale and must not reach the wire.
pub struct VisualTokenService {
    versions: DashMap<VisualId, TokenVersion>,
}

impl VisualTokenService {
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
        }
    }

    /// Advances the id's version and returns it. The first bump yields 1.
    pub fn bump(&self, id: VisualId) -> TokenVersion {
        let mut version = self.versions.entry(id).or_insert(0);
        *version += 1;
        *version
    }

    /// Current version, or 0 for an id that was never registered.
    pub fn current(&self, id: VisualId) -> TokenVersion {
        self.versions.get(&id).map(|version| *version).unwrap_or(0)
    }

    /// Packets that carry no id or no version opt out of the check and are always current.
    pub fn is_current(&self, id: Option<VisualId>, version: Option<TokenVersion>) -> bool {
        match (id, version) {
            (Some(id), Some(version)) => self.current(id) == version,
            _ => true,
        }
    }

    pub fn clear(&self) {
        self.versions.clear();
    }
}

impl Default for VisualTokenService {
    fn default() -> Self {
        Self::new()
    }
}
