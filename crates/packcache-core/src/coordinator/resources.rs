use std::collections::HashSet;

use crate::models::CityPack;
use crate::offline::{
    pack_data_path, pack_manifest_path, pack_page_path, APP_MANIFEST_PATH, OFFLINE_LAUNCH_PATH,
};

/// Everything a pack needs to open offline: the launch entry point, the app
/// and pack manifests, the pack page and data, then the pack's own declared
/// resources. Duplicates are dropped, first occurrence wins.
pub fn build_offline_resource_set(pack: &CityPack) -> Vec<String> {
    let required = [
        OFFLINE_LAUNCH_PATH.to_string(),
        APP_MANIFEST_PATH.to_string(),
        pack_manifest_path(&pack.slug),
        pack_page_path(&pack.slug),
        pack_data_path(&pack.slug),
    ];

    let mut seen = HashSet::new();
    required
        .into_iter()
        .chain(pack.offline_resources.iter().cloned())
        .filter(|resource| seen.insert(resource.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::service::tests::city_pack;

    #[test]
    fn test_resource_set_order_and_dedupe() {
        let pack = city_pack("paris", "v1", &["/content/packs/paris.json", "/img/paris-map.png"]);
        assert_eq!(
            build_offline_resource_set(&pack),
            vec![
                "/launch",
                "/manifest.webmanifest",
                "/manifests/paris.webmanifest",
                "/city/paris",
                "/content/packs/paris.json",
                "/img/paris-map.png",
            ]
        );
    }
}
