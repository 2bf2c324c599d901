use divrank::profile_cache::ProfileCache;

#[test]
fn entries_survive_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles_az_boys_u11.json");

    let cache = ProfileCache::load(&path);
    assert!(cache.is_empty());
    cache.insert("2015 phoenix premier united", "4711").unwrap();
    cache.insert("2015 rush tucson", "4712").unwrap();

    let reloaded = ProfileCache::load(&path);
    assert_eq!(reloaded.len(), 2);
    assert_eq!(
        reloaded.get("2015 phoenix premier united").as_deref(),
        Some("4711")
    );
}

#[test]
fn a_404_style_invalidation_removes_the_entry_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles_az_boys_u11.json");

    let cache = ProfileCache::load(&path);
    cache.insert("2015 phoenix premier united", "4711").unwrap();
    cache.invalidate("2015 phoenix premier united").unwrap();
    assert_eq!(cache.get("2015 phoenix premier united"), None);

    let reloaded = ProfileCache::load(&path);
    assert!(reloaded.is_empty());

    // Invalidating a missing key is a no-op.
    cache.invalidate("never seen").unwrap();
}

#[test]
fn a_corrupt_cache_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles_az_boys_u11.json");
    std::fs::write(&path, "{ not json").unwrap();
    let cache = ProfileCache::load(&path);
    assert!(cache.is_empty());
}
