use serde::{Deserialize, Serialize};

/// One row of the pack catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackCatalogEntry {
    pub slug: String,
    pub city: String,
    pub country: String,
    pub rank: f64,
    pub international_arrivals_millions: f64,
    pub mandatory: bool,
    pub tagline: String,
    pub accent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackCatalogResponse {
    pub generated_at: String,
    pub dataset: String,
    pub packs: Vec<PackCatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackHero {
    pub title: String,
    pub subtitle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackSection {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub label: String,
    pub value: String,
}

/// A full travel pack for one city.
///
/// Only `slug`, `version` and `offline_resources` matter to the offline
/// subsystem; the rest is content for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityPack {
    pub slug: String,
    pub city: String,
    pub country: String,
    pub rank: f64,
    pub international_arrivals_millions: f64,
    pub version: String,
    pub updated_at: String,
    pub hero: PackHero,
    pub pain_points: Vec<String>,
    pub sections: Vec<PackSection>,
    pub emergency: Vec<EmergencyContact>,
    pub offline_resources: Vec<String>,
}

impl CityPack {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}
