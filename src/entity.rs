//! Typed model of Wikidata and Wikimedia Commons entities.
//!
//! The JSON shape follows the entity dump format: enumerated strings map to
//! enums, statements keep their serialization order vectors, and all
//! human-readable text is normalized to NFC on the way in. Decoding is
//! strict — an unknown field anywhere in an entity is an error, which is
//! how format drift in the dumps gets noticed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datavalue::DataValue;
use crate::text::de_nfc;

/// Kind of a dump entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Item,
    Property,
    #[serde(rename = "mediainfo")]
    MediaInfo,
}

/// Statements only ever carry the type `statement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementRank {
    Preferred,
    Normal,
    Deprecated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnakType {
    Value,
    SomeValue,
    NoValue,
}

/// Property data type as spelled in the dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "wikibase-item")]
    WikiBaseItem,
    #[serde(rename = "external-id")]
    ExternalId,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "quantity")]
    Quantity,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "globe-coordinate")]
    GlobeCoordinate,
    #[serde(rename = "commonsMedia")]
    CommonsMedia,
    #[serde(rename = "monolingualtext")]
    MonolingualText,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "geo-shape")]
    GeoShape,
    #[serde(rename = "wikibase-lexeme")]
    WikiBaseLexeme,
    #[serde(rename = "wikibase-sense")]
    WikiBaseSense,
    #[serde(rename = "wikibase-property")]
    WikiBaseProperty,
    #[serde(rename = "math")]
    Math,
    #[serde(rename = "musical-notation")]
    MusicalNotation,
    #[serde(rename = "wikibase-form")]
    WikiBaseForm,
    #[serde(rename = "tabular-data")]
    TabularData,
}

/// A string in a given language (labels, descriptions, aliases).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanguageValue {
    pub language: String,
    #[serde(deserialize_with = "de_nfc")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteLink {
    pub site: String,
    #[serde(deserialize_with = "de_nfc")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Atomic value carrier of a statement: a value, an unknown value
/// (`somevalue`), or an explicit no-value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snak {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "snaktype")]
    pub snak_type: SnakType,
    pub property: String,
    #[serde(rename = "datatype", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(rename = "datavalue", default, skip_serializing_if = "Option::is_none")]
    pub data_value: Option<DataValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub snaks: HashMap<String, Vec<Snak>>,
    #[serde(rename = "snaks-order", default, skip_serializing_if = "Vec::is_empty")]
    pub snaks_order: Vec<String>,
}

/// One property-value assertion with qualifiers and references.
///
/// `qualifiers_order` preserves the serialization order of the `qualifiers`
/// map keys, mirroring the dump format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Statement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "type")]
    pub statement_type: StatementType,
    #[serde(rename = "mainsnak")]
    pub main_snak: Snak,
    pub rank: StatementRank,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub qualifiers: HashMap<String, Vec<Snak>>,
    #[serde(
        rename = "qualifiers-order",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub qualifiers_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

/// A Wikidata or Commons entity as found in the entity dumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "pageid", default)]
    pub page_id: i64,
    #[serde(rename = "ns", default)]
    pub namespace: i64,
    #[serde(default, deserialize_with = "de_nfc", skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(rename = "datatype", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, LanguageValue>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub descriptions: HashMap<String, LanguageValue>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub aliases: HashMap<String, Vec<LanguageValue>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub claims: HashMap<String, Vec<Statement>>,
    #[serde(rename = "sitelinks", default, skip_serializing_if = "HashMap::is_empty")]
    pub site_links: HashMap<String, SiteLink>,
    #[serde(rename = "lastrevid", default)]
    pub last_rev_id: i64,
}

/// Commons MediaInfo entity: identical to [`Entity`] except that the dump
/// spells the claims key `statements`. Decoded separately and converted;
/// the two shapes are parallel types, not a hierarchy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CommonsEntity {
    pub id: String,
    #[serde(rename = "pageid", default)]
    pub page_id: i64,
    #[serde(rename = "ns", default)]
    pub namespace: i64,
    #[serde(default, deserialize_with = "de_nfc")]
    pub title: String,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(rename = "datatype", default)]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub labels: HashMap<String, LanguageValue>,
    #[serde(default)]
    pub descriptions: HashMap<String, LanguageValue>,
    #[serde(default)]
    pub aliases: HashMap<String, Vec<LanguageValue>>,
    #[serde(rename = "statements", default)]
    pub claims: HashMap<String, Vec<Statement>>,
    #[serde(rename = "sitelinks", default)]
    pub site_links: HashMap<String, SiteLink>,
    #[serde(rename = "lastrevid", default)]
    pub last_rev_id: i64,
}

impl From<CommonsEntity> for Entity {
    fn from(entity: CommonsEntity) -> Self {
        Entity {
            id: entity.id,
            page_id: entity.page_id,
            namespace: entity.namespace,
            title: entity.title,
            modified: entity.modified,
            entity_type: entity.entity_type,
            data_type: entity.data_type,
            labels: entity.labels,
            descriptions: entity.descriptions,
            aliases: entity.aliases,
            claims: entity.claims,
            site_links: entity.site_links,
            last_rev_id: entity.last_rev_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_json() -> serde_json::Value {
        json!({
            "id": "Q42",
            "pageid": 138,
            "ns": 0,
            "title": "Q42",
            "modified": "2024-02-01T12:30:45Z",
            "type": "item",
            "labels": {
                "en": {"language": "en", "value": "Douglas Adams"},
                "de": {"language": "de", "value": "Douglas Adams"},
            },
            "descriptions": {
                "en": {"language": "en", "value": "English writer"},
            },
            "aliases": {
                "en": [{"language": "en", "value": "DNA"}],
            },
            "claims": {
                "P31": [{
                    "id": "Q42$f1",
                    "type": "statement",
                    "mainsnak": {
                        "hash": "abc",
                        "snaktype": "value",
                        "property": "P31",
                        "datatype": "wikibase-item",
                        "datavalue": {
                            "type": "wikibase-entityid",
                            "value": {"entity-type": "item", "id": "Q5"},
                        },
                    },
                    "rank": "normal",
                    "qualifiers": {
                        "P580": [{
                            "snaktype": "value",
                            "property": "P580",
                            "datatype": "time",
                            "datavalue": {
                                "type": "time",
                                "value": {
                                    "time": "+1952-00-00T00:00:00Z",
                                    "precision": 9,
                                    "calendarmodel": "https://www.wikidata.org/wiki/Q1985727",
                                },
                            },
                        }],
                    },
                    "qualifiers-order": ["P580"],
                    "references": [{
                        "hash": "ref1",
                        "snaks": {
                            "P854": [{
                                "snaktype": "value",
                                "property": "P854",
                                "datatype": "url",
                                "datavalue": {"type": "string", "value": "https://example.org"},
                            }],
                        },
                        "snaks-order": ["P854"],
                    }],
                }],
            },
            "sitelinks": {
                "enwiki": {"site": "enwiki", "title": "Douglas Adams", "badges": []},
            },
            "lastrevid": 1234567,
        })
    }

    #[test]
    fn item_decodes_with_nested_statements() {
        let entity: Entity = serde_json::from_value(item_json()).unwrap();
        assert_eq!(entity.id, "Q42");
        assert_eq!(entity.entity_type, EntityType::Item);
        assert_eq!(entity.labels["en"].value, "Douglas Adams");
        let statement = &entity.claims["P31"][0];
        assert_eq!(statement.rank, StatementRank::Normal);
        assert_eq!(statement.main_snak.snak_type, SnakType::Value);
        assert_eq!(statement.qualifiers_order, vec!["P580"]);
        assert_eq!(statement.references.len(), 1);
        assert_eq!(entity.site_links["enwiki"].title, "Douglas Adams");
    }

    #[test]
    fn entity_json_round_trips() {
        let entity: Entity = serde_json::from_value(item_json()).unwrap();
        let first = serde_json::to_value(&entity).unwrap();
        let again: Entity = serde_json::from_value(first.clone()).unwrap();
        assert_eq!(entity, again);
        assert_eq!(serde_json::to_value(&again).unwrap(), first);
    }

    #[test]
    fn property_carries_data_type() {
        let entity: Entity = serde_json::from_value(json!({
            "id": "P569",
            "type": "property",
            "datatype": "time",
            "lastrevid": 1,
        }))
        .unwrap();
        assert_eq!(entity.entity_type, EntityType::Property);
        assert_eq!(entity.data_type, Some(DataType::Time));
    }

    #[test]
    fn unknown_entity_fields_are_rejected() {
        let err = serde_json::from_value::<Entity>(json!({
            "id": "Q1",
            "type": "item",
            "brand_new_field": true,
        }))
        .unwrap_err();
        assert!(err.to_string().contains("brand_new_field"));
    }

    #[test]
    fn unknown_enumeration_strings_are_rejected() {
        assert!(serde_json::from_value::<EntityType>(json!("lexeme-bundle")).is_err());
        assert!(serde_json::from_value::<StatementRank>(json!("best")).is_err());
        assert!(serde_json::from_value::<SnakType>(json!("maybe")).is_err());
        assert!(serde_json::from_value::<DataType>(json!("hologram")).is_err());
    }

    #[test]
    fn data_type_strings_match_the_dump_spelling() {
        assert_eq!(
            serde_json::to_value(DataType::CommonsMedia).unwrap(),
            json!("commonsMedia")
        );
        assert_eq!(
            serde_json::to_value(DataType::WikiBaseItem).unwrap(),
            json!("wikibase-item")
        );
        assert_eq!(
            serde_json::from_value::<DataType>(json!("musical-notation")).unwrap(),
            DataType::MusicalNotation
        );
    }

    #[test]
    fn label_values_are_normalized_to_nfc() {
        let entity: Entity = serde_json::from_value(json!({
            "id": "Q1",
            "type": "item",
            "labels": {"fr": {"language": "fr", "value": "Ame\u{0301}lie"}},
        }))
        .unwrap();
        assert_eq!(entity.labels["fr"].value, "Am\u{00e9}lie");
    }

    #[test]
    fn commons_entity_uses_statements_key() {
        let commons: CommonsEntity = serde_json::from_value(json!({
            "id": "M77", "pageid": 77, "ns": 6, "title": "File:Example.jpg",
            "type": "mediainfo",
            "labels": {"en": {"language": "en", "value": "An example"}},
            "descriptions": {},
            "statements": {
                "P180": [{
                    "id": "M77$s1",
                    "type": "statement",
                    "mainsnak": {
                        "snaktype": "value",
                        "property": "P180",
                        "datavalue": {
                            "type": "wikibase-entityid",
                            "value": {"entity-type": "item", "id": "Q42"},
                        },
                    },
                    "rank": "normal",
                }],
            },
            "lastrevid": 99,
        }))
        .unwrap();
        let entity = Entity::from(commons);
        assert_eq!(entity.entity_type, EntityType::MediaInfo);
        assert_eq!(entity.claims["P180"].len(), 1);
        // Canonical serialization always uses the claims key.
        let serialized = serde_json::to_value(&entity).unwrap();
        assert!(serialized.get("claims").is_some());
        assert!(serialized.get("statements").is_none());
    }

    #[test]
    fn snak_without_value_omits_datavalue() {
        let snak: Snak = serde_json::from_value(json!({
            "snaktype": "novalue",
            "property": "P40",
        }))
        .unwrap();
        assert_eq!(snak.snak_type, SnakType::NoValue);
        assert!(snak.data_value.is_none());
        let serialized = serde_json::to_value(&snak).unwrap();
        assert_eq!(serialized, json!({"snaktype": "novalue", "property": "P40"}));
    }
}
