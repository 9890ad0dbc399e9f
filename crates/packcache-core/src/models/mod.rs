//! Data models for city packs and offline bookkeeping.
//!
//! - `CityPack`, `PackCatalogEntry`: pack content as served by providers
//! - `DownloadedPackRecord`, `DownloadedPackMap`: what has been cached and when
//! - `validate`: the schema boundary that turns untyped JSON into packs

pub mod pack;
pub mod record;
pub mod validate;

pub use pack::{CityPack, EmergencyContact, PackCatalogEntry, PackCatalogResponse, PackHero, PackSection};
pub use record::{parse_downloaded_pack_map, DownloadedPackMap, DownloadedPackRecord};
pub use validate::{parse_catalog_entries, parse_catalog_response, parse_city_pack, ValidationError};
