use std::collections::HashMap;
use std::path::PathBuf;

/// Read-only view of the host's storage pools, provided by the caller.
pub trait StoragePools: Send + Sync {
    fn has_pool(&self, pool: &str) -> bool;
    /// Backing path of `volume` in `pool`, or `None` if it does not exist.
    fn volume_path(&self, pool: &str, volume: &str) -> Option<PathBuf>;
}

/// In-memory pool table.
#[derive(Debug, Clone, Default)]
pub struct StaticPools {
    pools: HashMap<String, HashMap<String, PathBuf>>,
}

impl StaticPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool(&mut self, pool: impl Into<String>) -> &mut Self {
        self.pools.entry(pool.into()).or_default();
        self
    }

    pub fn add_volume(
        &mut self,
        pool: impl Into<String>,
        volume: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> &mut Self {
        self.pools
            .entry(pool.into())
            .or_default()
            .insert(volume.into(), path.into());
        self
    }
}

impl StoragePools for StaticPools {
    fn has_pool(&self, pool: &str) -> bool {
        self.pools.contains_key(pool)
    }

    fn volume_path(&self, pool: &str, volume: &str) -> Option<PathBuf> {
        self.pools.get(pool)?.get(volume).cloned()
    }
}
