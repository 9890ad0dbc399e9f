//! Structural validation of pack payloads.
//!
//! Every field is required and a type mismatch fails closed. The error keeps
//! the path of the offending field, e.g. `pack.sections[1].actions[0]`.

use serde_json::{Map, Value};
use thiserror::Error;

use super::pack::{
    CityPack, EmergencyContact, PackCatalogEntry, PackCatalogResponse, PackHero, PackSection,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {path}: expected {expected}")]
pub struct ValidationError {
    pub path: String,
    pub expected: &'static str,
}

type Validated<T> = Result<T, ValidationError>;

fn invalid<T>(path: &str, expected: &'static str) -> Validated<T> {
    Err(ValidationError {
        path: path.to_string(),
        expected,
    })
}

fn as_object<'a>(value: &'a Value, path: &str) -> Validated<&'a Map<String, Value>> {
    match value.as_object() {
        Some(obj) => Ok(obj),
        None => invalid(path, "object"),
    }
}

/// An object being read field by field under a path prefix.
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    path: &'a str,
}

impl<'a> Fields<'a> {
    fn new(value: &'a Value, path: &'a str) -> Validated<Self> {
        Ok(Self {
            obj: as_object(value, path)?,
            path,
        })
    }

    fn field_path(&self, field: &str) -> String {
        format!("{}.{}", self.path, field)
    }

    fn get(&self, field: &str) -> &'a Value {
        self.obj.get(field).unwrap_or(&Value::Null)
    }

    fn string(&self, field: &str) -> Validated<String> {
        match self.get(field) {
            Value::String(s) => Ok(s.clone()),
            _ => invalid(&self.field_path(field), "string"),
        }
    }

    fn number(&self, field: &str) -> Validated<f64> {
        match self.get(field).as_f64() {
            Some(n) if !n.is_nan() => Ok(n),
            _ => invalid(&self.field_path(field), "number"),
        }
    }

    fn boolean(&self, field: &str) -> Validated<bool> {
        match self.get(field) {
            Value::Bool(b) => Ok(*b),
            _ => invalid(&self.field_path(field), "boolean"),
        }
    }

    fn array<T>(
        &self,
        field: &str,
        parse: impl Fn(&Value, &str) -> Validated<T>,
    ) -> Validated<Vec<T>> {
        let path = self.field_path(field);
        let Some(items) = self.get(field).as_array() else {
            return invalid(&path, "array");
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| parse(item, &format!("{}[{}]", path, i)))
            .collect()
    }

    fn strings(&self, field: &str) -> Validated<Vec<String>> {
        self.array(field, |value, path| match value {
            Value::String(s) => Ok(s.clone()),
            _ => invalid(path, "string"),
        })
    }
}

fn parse_catalog_entry(value: &Value, path: &str) -> Validated<PackCatalogEntry> {
    let f = Fields::new(value, path)?;
    Ok(PackCatalogEntry {
        slug: f.string("slug")?,
        city: f.string("city")?,
        country: f.string("country")?,
        rank: f.number("rank")?,
        international_arrivals_millions: f.number("internationalArrivalsMillions")?,
        mandatory: f.boolean("mandatory")?,
        tagline: f.string("tagline")?,
        accent: f.string("accent")?,
    })
}

/// Validate a catalog index document.
pub fn parse_catalog_response(value: &Value) -> Validated<PackCatalogResponse> {
    let f = Fields::new(value, "catalog")?;
    Ok(PackCatalogResponse {
        generated_at: f.string("generatedAt")?,
        dataset: f.string("dataset")?,
        packs: f.array("packs", parse_catalog_entry)?,
    })
}

/// Validate a bare list of catalog entries, as returned by the pack API.
pub fn parse_catalog_entries(value: &Value, path: &str) -> Validated<Vec<PackCatalogEntry>> {
    let Some(items) = value.as_array() else {
        return invalid(path, "array");
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_catalog_entry(item, &format!("{}[{}]", path, i)))
        .collect()
}

fn parse_section(value: &Value, path: &str) -> Validated<PackSection> {
    let f = Fields::new(value, path)?;
    Ok(PackSection {
        id: f.string("id")?,
        title: f.string("title")?,
        summary: f.string("summary")?,
        actions: f.strings("actions")?,
    })
}

fn parse_emergency_contact(value: &Value, path: &str) -> Validated<EmergencyContact> {
    let f = Fields::new(value, path)?;
    Ok(EmergencyContact {
        label: f.string("label")?,
        value: f.string("value")?,
    })
}

/// Validate a city pack document.
pub fn parse_city_pack(value: &Value) -> Validated<CityPack> {
    let f = Fields::new(value, "pack")?;
    let hero_path = f.field_path("hero");
    let hero = Fields::new(f.get("hero"), &hero_path)?;

    Ok(CityPack {
        slug: f.string("slug")?,
        city: f.string("city")?,
        country: f.string("country")?,
        rank: f.number("rank")?,
        international_arrivals_millions: f.number("internationalArrivalsMillions")?,
        version: f.string("version")?,
        updated_at: f.string("updatedAt")?,
        hero: PackHero {
            title: hero.string("title")?,
            subtitle: hero.string("subtitle")?,
        },
        pain_points: f.strings("painPoints")?,
        sections: f.array("sections", parse_section)?,
        emergency: f.array("emergency", parse_emergency_contact)?,
        offline_resources: f.strings("offlineResources")?,
    })
}
