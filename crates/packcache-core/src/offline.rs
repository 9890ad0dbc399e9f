//! Fixed locators, storage keys and seed identifiers shared by the
//! foreground coordinator and the background agent.

/// Key holding the raw active launch identifier
pub const ACTIVE_PACK_STORAGE_KEY: &str = "travelpacks.activePackSlug";

/// Key holding the JSON-serialized downloaded pack map
pub const DOWNLOADED_PACKS_STORAGE_KEY: &str = "travelpacks.downloadedPacks";

/// Packs the agent seeds on first install, in launch fallback order.
pub const MANDATORY_PACK_SLUGS: [&str; 3] = ["bangkok", "istanbul", "london"];

/// Placeholder version used for seeded packs
pub const MANDATORY_PACK_VERSION: &str = "bootstrap";

/// Identifier reported when the whole mandatory seed run completes
pub const MANDATORY_SENTINEL_SLUG: &str = "mandatory";

/// Entry point a home-screen shortcut opens
pub const OFFLINE_LAUNCH_PATH: &str = "/launch";

pub const APP_MANIFEST_PATH: &str = "/manifest.webmanifest";

pub const PACK_INDEX_PATH: &str = "/content/packs/index.json";

/// Prefix of every committed pack partition name
pub const PACK_CACHE_PREFIX: &str = "travel-pack-cache";

/// Prefix of every in-flight download partition name. Distinct from
/// `PACK_CACHE_PREFIX` so no version string can make a committed partition
/// look temporary.
pub const PACK_TEMP_PREFIX: &str = "travel-pack-tmp";

pub const PACK_REGISTRY_CACHE: &str = "travel-pack-registry-v1";

pub const PACK_REGISTRY_PATH: &str = "/__offline__/pack-registry.json";

/// Records which agent build last completed its install step
pub const AGENT_INSTALL_PATH: &str = "/__offline__/agent-install.json";

pub fn pack_data_path(slug: &str) -> String {
    format!("/content/packs/{}.json", slug)
}

pub fn pack_manifest_path(slug: &str) -> String {
    format!("/manifests/{}.webmanifest", slug)
}

pub fn pack_page_path(slug: &str) -> String {
    format!("/city/{}", slug)
}

/// Name of the committed partition for one (identifier, version) pair.
pub fn final_partition_name(slug: &str, version: &str) -> String {
    format!("{}:{}:{}", PACK_CACHE_PREFIX, slug, version)
}

/// Prefix shared by every committed partition belonging to `slug`.
pub fn partition_prefix(slug: &str) -> String {
    format!("{}:{}:", PACK_CACHE_PREFIX, slug)
}

/// Name of the partition one download attempt fills before committing.
pub fn temp_partition_name(slug: &str, version: &str, token: &str) -> String {
    format!("{}:{}:{}:{}", PACK_TEMP_PREFIX, slug, version, token)
}

pub fn is_temp_partition(name: &str) -> bool {
    name.starts_with(&format!("{}:", PACK_TEMP_PREFIX))
}

pub fn is_pack_partition(name: &str) -> bool {
    name.starts_with(&format!("{}:", PACK_CACHE_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_prefix_does_not_match_longer_slug() {
        let other = final_partition_name("paris-east", "v1");
        assert!(!other.starts_with(&partition_prefix("paris")));
        assert!(final_partition_name("paris", "v1").starts_with(&partition_prefix("paris")));
    }

    #[test]
    fn test_temp_partition_classification() {
        let final_name = final_partition_name("paris", "v1");
        let temp = temp_partition_name("paris", "v1", "1700000000000-0000abcd");
        assert!(is_temp_partition(&temp));
        assert!(!is_pack_partition(&temp));
        assert!(!temp.starts_with(&partition_prefix("paris")));
        assert!(is_pack_partition(&final_name));
        assert!(!is_pack_partition(PACK_REGISTRY_CACHE));
    }

    #[test]
    fn test_version_cannot_make_committed_partition_temporary() {
        let committed = final_partition_name("paris", "2026:tmp-build");
        assert!(is_pack_partition(&committed));
        assert!(!is_temp_partition(&committed));
        assert!(committed.starts_with(&partition_prefix("paris")));
    }
}
