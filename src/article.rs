//! Typed model of Wikimedia Enterprise HTML dump articles.
//!
//! The field set mirrors the Enterprise dump schema. Decoding is strict:
//! a field this model does not know is an error. Protection type/level and
//! expiry, event and infobox types, and entity-ref aspects are deliberately
//! kept as free-form strings — the dumps do not document closed value sets
//! for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn is_zero(n: &i64) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Editor {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub identifier: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_bot: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_patroller: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_advanced_rights: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub edit_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Probability {
    #[serde(rename = "false")]
    pub false_: f64,
    #[serde(rename = "true")]
    pub true_: f64,
}

/// One ORES model output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Score {
    pub prediction: bool,
    pub probability: Probability,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damaging: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goodfaith: Option<Score>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Size {
    #[serde(default)]
    pub value: i64,
    #[serde(rename = "unit_text", default)]
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Version {
    #[serde(default)]
    pub identifier: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<Editor>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_tag_needs_citation: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_minor_edit: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_flagged_stable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Scores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub number_of_characters: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Protection {
    #[serde(rename = "type", default)]
    pub protection_type: String,
    #[serde(default)]
    pub level: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expiry: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Namespace {
    #[serde(default)]
    pub identifier: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InLanguage {
    #[serde(default)]
    pub identifier: String,
}

/// Reference to a Wikidata entity. Aspects stay unparsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRef {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Category {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Redirect {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsPartOf {
    #[serde(default)]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticleBody {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub wikitext: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct License {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Visibility {
    #[serde(default)]
    pub text: bool,
    #[serde(default)]
    pub editor: bool,
    #[serde(default)]
    pub comment: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Image {
    #[serde(default)]
    pub content_url: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub width: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub height: i64,
}

/// Kafka-ish event metadata attached to each article snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Event {
    #[serde(default)]
    pub identifier: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub partition: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub offset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
}

/// Structured infobox node; nested parts recurse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InfoBox {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub infobox_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has_parts: Vec<InfoBox>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

/// One article from a Wikimedia Enterprise HTML dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Article {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identifier: i64,
    #[serde(rename = "abstract", default, skip_serializing_if = "String::is_empty")]
    pub abstract_text: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub watchers_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_previously_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protection: Vec<Protection>,
    #[serde(default)]
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<Version>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub namespace: Namespace,
    #[serde(default)]
    pub in_language: InLanguage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_entity: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_entities: Vec<EntityRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirects: Vec<Redirect>,
    #[serde(default)]
    pub is_part_of: IsPartOf,
    #[serde(default)]
    pub article_body: ArticleBody,
    #[serde(rename = "license", default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(default)]
    pub event: Event,
    #[serde(rename = "infobox", default, skip_serializing_if = "Vec::is_empty")]
    pub infoboxes: Vec<InfoBox>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article_json() -> serde_json::Value {
        json!({
            "name": "Edison Avenue",
            "identifier": 50662815,
            "abstract": "Edison Avenue is a street.",
            "date_created": "2016-06-09T20:30:19Z",
            "date_modified": "2022-07-20T19:32:23Z",
            "protection": [
                {"type": "edit", "level": "autoconfirmed", "expiry": "infinity"},
            ],
            "version": {
                "identifier": 1099455169,
                "comment": "fixed typo",
                "tags": ["wikieditor"],
                "is_minor_edit": true,
                "editor": {
                    "identifier": 14904681,
                    "name": "Example Editor",
                    "edit_count": 4506,
                    "groups": ["extendedconfirmed", "user"],
                },
                "scores": {
                    "damaging": {"prediction": false, "probability": {"false": 0.98, "true": 0.02}},
                    "goodfaith": {"prediction": true, "probability": {"false": 0.01, "true": 0.99}},
                },
                "size": {"value": 4339, "unit_text": "B"},
                "number_of_characters": 4317,
                "event": {
                    "identifier": "7ac9b642",
                    "type": "update",
                    "date_created": "2022-07-20T19:32:31Z",
                    "partition": 0,
                    "offset": 359387127,
                },
            },
            "url": "https://en.wikipedia.org/wiki/Edison_Avenue",
            "namespace": {"identifier": 0},
            "in_language": {"identifier": "en"},
            "main_entity": {"identifier": "Q98404230", "url": "https://www.wikidata.org/entity/Q98404230"},
            "additional_entities": [],
            "categories": [
                {"name": "Category:Streets", "url": "https://en.wikipedia.org/wiki/Category:Streets"},
            ],
            "templates": [
                {"name": "Template:Infobox street", "url": "https://en.wikipedia.org/wiki/Template:Infobox_street"},
            ],
            "redirects": [
                {"name": "Edison Ave", "url": "https://en.wikipedia.org/wiki/Edison_Ave"},
            ],
            "is_part_of": {"identifier": "enwiki"},
            "article_body": {"html": "<html>...</html>", "wikitext": "'''Edison Avenue'''"},
            "license": [
                {"identifier": "CC-BY-SA-3.0", "name": "Creative Commons", "url": "https://creativecommons.org"},
            ],
            "event": {
                "identifier": "57838d1c",
                "type": "update",
                "date_created": "2022-07-20T19:32:31Z",
            },
            "infobox": [{
                "name": "Infobox street",
                "type": "infobox",
                "has_parts": [{
                    "name": "Length",
                    "type": "field",
                    "value": "1.5 km",
                }],
            }],
        })
    }

    #[test]
    fn article_decodes() {
        let article: Article = serde_json::from_value(article_json()).unwrap();
        assert_eq!(article.name, "Edison Avenue");
        assert_eq!(article.identifier, 50662815);
        assert_eq!(article.version.size.as_ref().unwrap().unit, "B");
        assert_eq!(article.protection[0].expiry, "infinity");
        assert_eq!(article.main_entity.as_ref().unwrap().identifier, "Q98404230");
        assert_eq!(article.infoboxes[0].has_parts[0].value, "1.5 km");
        assert!(article.version.scores.as_ref().unwrap().goodfaith.unwrap().prediction);
    }

    #[test]
    fn article_json_round_trips() {
        let article: Article = serde_json::from_value(article_json()).unwrap();
        let first = serde_json::to_value(&article).unwrap();
        let again: Article = serde_json::from_value(first.clone()).unwrap();
        assert_eq!(article, again);
        assert_eq!(serde_json::to_value(&again).unwrap(), first);
    }

    #[test]
    fn unknown_article_fields_are_rejected() {
        let err = serde_json::from_value::<Article>(json!({
            "name": "X",
            "identifier": 1,
            "unheard_of": true,
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unheard_of"));
    }

    #[test]
    fn ores_probabilities_use_false_true_keys() {
        let score: Score = serde_json::from_value(json!({
            "prediction": true,
            "probability": {"false": 0.25, "true": 0.75},
        }))
        .unwrap();
        assert_eq!(score.probability.true_, 0.75);
        let round = serde_json::to_value(score).unwrap();
        assert_eq!(round["probability"]["false"], 0.25);
    }

    #[test]
    fn empty_collections_are_omitted_on_output() {
        let article = Article {
            name: "Minimal".to_owned(),
            identifier: 7,
            ..Article::default()
        };
        let value = serde_json::to_value(&article).unwrap();
        assert!(value.get("protection").is_none());
        assert!(value.get("categories").is_none());
        assert!(value.get("infobox").is_none());
        assert!(value.get("abstract").is_none());
        // Required scalar fields stay present.
        assert_eq!(value["name"], "Minimal");
        assert!(value.get("version").is_some());
    }
}
