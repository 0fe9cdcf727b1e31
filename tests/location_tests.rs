//! Tests for install location resolution.

use std::sync::Arc;

use tempfile::TempDir;
use virt_install_source::{Error, InstallLocation, LocationResolver, StaticPools};

// =============================================================================
// Local paths
// =============================================================================

#[test]
fn test_local_directory_is_canonical_and_idempotent() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("tree")).unwrap();
    let raw = format!("{}/./tree/../tree", dir.path().display());

    let resolver = LocationResolver::new();
    let first = resolver.resolve(&raw).unwrap();
    let expected = std::fs::canonicalize(dir.path().join("tree")).unwrap();
    assert_eq!(first, InstallLocation::DirectoryTree(expected));

    let second = resolver.resolve(&first.to_string()).unwrap();
    assert_eq!(first, second, "resolving twice must not change the location");
}

#[test]
fn test_local_file_is_local_path() {
    let dir = TempDir::new().unwrap();
    let iso = dir.path().join("boot.iso");
    std::fs::write(&iso, b"CD001").unwrap();

    let loc = LocationResolver::new().resolve(iso.to_str().unwrap()).unwrap();
    assert!(matches!(loc, InstallLocation::LocalPath(ref p) if p.is_absolute()));
    assert!(loc.is_local_media());
    assert!(!loc.is_network());
}

#[test]
fn test_relative_path_becomes_absolute() {
    let loc = LocationResolver::new().resolve(".").unwrap();
    let InstallLocation::DirectoryTree(path) = loc else {
        panic!("current dir should resolve to a tree");
    };
    assert!(path.is_absolute());
}

// =============================================================================
// Network forms
// =============================================================================

#[test]
fn test_nfs_uri_normalized_exactly() {
    let resolver = LocationResolver::new().with_privilege(true);
    for (raw, expected) in [
        ("nfs://host/path", "nfs:host:/path"),
        ("nfs://10.0.0.1/exports/fedora/9", "nfs:10.0.0.1:/exports/fedora/9"),
        ("nfs://host:/path", "nfs:host:/path"),
    ] {
        assert_eq!(resolver.resolve(raw).unwrap().to_string(), expected, "input {raw}");
    }
}

#[test]
fn test_nfs_uri_without_path_is_invalid() {
    let resolver = LocationResolver::new().with_privilege(true);
    let err = resolver.resolve("nfs://host").unwrap_err();
    assert!(matches!(err, Error::InvalidLocation { .. }));
}

#[test]
fn test_nfs_needs_root() {
    let err = LocationResolver::new()
        .with_privilege(false)
        .resolve("nfs://host/path")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLocation { .. }));
}

#[test]
fn test_nogood_is_invalid() {
    let err = LocationResolver::new().resolve("nogood").unwrap_err();
    assert!(matches!(err, Error::InvalidLocation { ref location, .. } if location == "nogood"));
}

// =============================================================================
// Storage pool volumes
// =============================================================================

fn pools(dir: &TempDir) -> Arc<StaticPools> {
    let mut pools = StaticPools::new();
    pools.add_pool("empty");
    pools.add_volume("isos", "f9.iso", dir.path().join("f9.iso"));
    Arc::new(pools)
}

#[test]
fn test_pool_volume_resolves_to_backing_path() {
    let dir = TempDir::new().unwrap();
    let resolver = LocationResolver::new().with_pools(pools(&dir));

    let loc = resolver.resolve_volume("isos", "f9.iso").unwrap();
    assert_eq!(
        loc,
        InstallLocation::PoolVolume {
            pool: "isos".into(),
            volume: "f9.iso".into(),
            path: dir.path().join("f9.iso"),
        }
    );
}

#[test]
fn test_missing_pool_or_volume_is_invalid() {
    let dir = TempDir::new().unwrap();
    let resolver = LocationResolver::new().with_pools(pools(&dir));

    let err = resolver.resolve_volume("nopool", "f9.iso").unwrap_err();
    assert!(err.to_string().contains("no storage pool named 'nopool'"));

    let err = resolver.resolve_volume("empty", "f9.iso").unwrap_err();
    assert!(matches!(err, Error::InvalidLocation { .. }));
}

#[test]
fn test_pools_required_for_volume_references() {
    let err = LocationResolver::new().resolve_volume("isos", "f9.iso").unwrap_err();
    assert!(matches!(err, Error::InvalidLocation { .. }));
}
