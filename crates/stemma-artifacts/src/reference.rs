//! Reference-data classification.
//!
//! Slow-changing reference entities (dimensions, lookups, seeds) earn a
//! longer freshness threshold and a UI hint. Classification is a pure
//! function of the asset's normalized attributes, evaluated in a fixed
//! decision order where the first match wins.

use serde::Serialize;

use crate::model::{Asset, AssetKind};

/// Tags that mark an asset as reference data.
const REFERENCE_TAGS: &[&str] = &["ref", "reference", "lookup", "static", "dimension"];

/// Known slow-changing reference entities, matched by lower-cased name.
const REFERENCE_TABLE_NAMES: &[&str] = &[
    "addresstype",
    "contacttype",
    "countryregion",
    "countryregioncurrency",
    "culture",
    "currency",
    "phonenumbertype",
    "productcategory",
    "productsubcategory",
    "salesreason",
    "scrapreason",
    "shipmethod",
    "stateprovince",
    "unitmeasure",
];

/// Name substrings that indicate lookup-style entities.
const REFERENCE_NAME_PATTERNS: &[&str] = &["lookup", "reference", "_type", "_reason"];

/// Canonical key/value column pairs of classic lookup tables.
const KEY_VALUE_COLUMN_PAIRS: &[(&str, &str)] = &[
    ("id", "name"),
    ("id", "description"),
    ("code", "name"),
    ("code", "description"),
    ("key", "value"),
    ("type", "description"),
    ("status", "description"),
];

/// The outcome of reference classification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReferenceClassification {
    /// True when the asset is reference-like.
    pub is_reference: bool,
    /// Which rule matched (`not_reference` when none did).
    pub reason: String,
}

impl ReferenceClassification {
    fn matched(reason: &str) -> Self {
        Self {
            is_reference: true,
            reason: reason.to_string(),
        }
    }
}

/// Classifies an asset as reference data or not.
///
/// Decision order, first match wins: explicit metadata flag, metadata
/// data class, reference tag, seed kind/materialization, known table
/// name, name pattern, canonical key/value column shape.
#[must_use]
pub fn classify(asset: &Asset) -> ReferenceClassification {
    if asset.meta_flag("reference_table") {
        return ReferenceClassification::matched("meta.reference_table");
    }

    if asset
        .meta_str("data_class")
        .is_some_and(|v| v.eq_ignore_ascii_case("reference"))
    {
        return ReferenceClassification::matched("meta.data_class=reference");
    }

    if asset
        .tags
        .iter()
        .any(|tag| REFERENCE_TAGS.contains(&tag.to_ascii_lowercase().as_str()))
    {
        return ReferenceClassification::matched("tag");
    }

    let materialized_seed = asset
        .materialized
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("seed"));
    if asset.kind == AssetKind::Seed || materialized_seed {
        return ReferenceClassification::matched("seed");
    }

    let name = asset.name.to_ascii_lowercase();
    if REFERENCE_TABLE_NAMES.contains(&name.as_str()) {
        return ReferenceClassification::matched("hardcoded_table_name");
    }

    if REFERENCE_NAME_PATTERNS
        .iter()
        .any(|pattern| name.contains(pattern))
    {
        return ReferenceClassification::matched("name_pattern");
    }

    let column_names: Vec<String> = asset
        .columns
        .keys()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if KEY_VALUE_COLUMN_PAIRS.iter().any(|(key, value)| {
        column_names.iter().any(|c| c == key) && column_names.iter().any(|c| c == value)
    }) {
        return ReferenceClassification::matched("key_value_columns");
    }

    ReferenceClassification {
        is_reference: false,
        reason: "not_reference".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnSpec;
    use std::collections::BTreeMap;

    fn asset(name: &str) -> Asset {
        Asset {
            unique_id: format!("model.app.{name}"),
            name: name.to_string(),
            kind: AssetKind::Model,
            database: None,
            schema: None,
            description: None,
            tags: Vec::new(),
            columns: BTreeMap::new(),
            meta: serde_json::Map::new(),
            materialized: Some("table".to_string()),
            severity: None,
            depends_on: Vec::new(),
            test_metadata: None,
            file_key_name: None,
            created_at: None,
        }
    }

    #[test]
    fn explicit_meta_flag_wins_over_everything() {
        let mut a = asset("orders");
        a.meta.insert(
            "reference_table".to_string(),
            serde_json::Value::Bool(true),
        );
        // Would not match any other rule.
        assert_eq!(classify(&a).reason, "meta.reference_table");
    }

    #[test]
    fn data_class_reference_matches() {
        let mut a = asset("orders");
        a.meta.insert(
            "data_class".to_string(),
            serde_json::Value::String("Reference".to_string()),
        );
        assert_eq!(classify(&a).reason, "meta.data_class=reference");
    }

    #[test]
    fn tags_match_case_insensitively() {
        let mut a = asset("orders");
        a.tags.push("Dimension".to_string());
        assert_eq!(classify(&a).reason, "tag");
    }

    #[test]
    fn seeds_are_reference_like() {
        let mut a = asset("country_codes");
        a.kind = AssetKind::Seed;
        assert_eq!(classify(&a).reason, "seed");

        let mut b = asset("country_codes");
        b.materialized = Some("seed".to_string());
        assert_eq!(classify(&b).reason, "seed");
    }

    #[test]
    fn known_table_names_match() {
        let a = asset("countryregion");
        assert_eq!(classify(&a).reason, "hardcoded_table_name");
    }

    #[test]
    fn name_patterns_match() {
        assert_eq!(classify(&asset("address_type")).reason, "name_pattern");
        assert_eq!(classify(&asset("scrap_reason")).reason, "name_pattern");
        assert_eq!(classify(&asset("price_lookup")).reason, "name_pattern");
    }

    #[test]
    fn key_value_columns_match() {
        let mut a = asset("statuses");
        a.columns.insert("Code".to_string(), ColumnSpec::default());
        a.columns.insert("Name".to_string(), ColumnSpec::default());
        assert_eq!(classify(&a).reason, "key_value_columns");
    }

    #[test]
    fn plain_fact_table_is_not_reference() {
        let mut a = asset("orders");
        a.columns
            .insert("order_id".to_string(), ColumnSpec::default());
        a.columns
            .insert("amount".to_string(), ColumnSpec::default());
        let classification = classify(&a);
        assert!(!classification.is_reference);
        assert_eq!(classification.reason, "not_reference");
    }
}
