//! Wikimedia Commons dump entry points and the image metadata decoder.

use reqwest::blocking::Client;
use serde_json::{Map, Value};

use crate::cancel::Cancel;
use crate::decompress::Compression;
use crate::entity::{CommonsEntity, Entity};
use crate::errors::{snippet, Error, Result};
use crate::php;
use crate::pipeline::{process, DumpConfig};
use crate::runs::latest_run;
use crate::source::CacheNaming;
use crate::tokenize::FileType;

/// Always-current alias for the newest complete Commons MediaInfo dump.
pub const LATEST_COMMONS_MEDIAINFO_URL: &str =
    "https://dumps.wikimedia.org/commonswiki/entities/latest-mediainfo.json.bz2";

const COMMONS_ENTITIES_RUNS_URL: &str = "https://dumps.wikimedia.org/commonswiki/entities/";
const COMMONS_DUMPS_URL: &str = "https://dumps.wikimedia.org/commonswiki/";

/// URL of the newest dated Commons MediaInfo entities run whose file exists.
pub fn latest_commons_entities_run(cancel: &Cancel, client: &Client) -> Result<String> {
    latest_run(cancel, client, COMMONS_ENTITIES_RUNS_URL, |date| {
        format!(
            "https://dumps.wikimedia.org/commonswiki/entities/{date}/commons-{date}-mediainfo.json.bz2"
        )
    })
}

/// URL of the newest dated Commons `image` table dump whose file exists.
pub fn latest_commons_image_metadata_run(cancel: &Cancel, client: &Client) -> Result<String> {
    latest_run(cancel, client, COMMONS_DUMPS_URL, |date| {
        format!("https://dumps.wikimedia.org/commonswiki/{date}/commonswiki-{date}-image.sql.gz")
    })
}

/// Download (unless cached), decompress, decode, and call `handler` once per
/// entity in a Commons MediaInfo entities JSON dump.
///
/// MediaInfo entities spell the claims key `statements`; they are decoded
/// through a Commons-shaped DTO and converted, so the handler sees ordinary
/// [`Entity`] values.
pub fn process_commons_entities_dump<H>(
    cancel: &Cancel,
    config: DumpConfig,
    handler: H,
) -> Result<()>
where
    H: Fn(&Cancel, Entity) -> Result<()> + Sync,
{
    let explicit_url = config.url.clone();
    let url = explicit_url
        .clone()
        .unwrap_or_else(|| LATEST_COMMONS_MEDIAINFO_URL.to_owned());
    let naming = if explicit_url.is_some() {
        CacheNaming::Basename
    } else {
        CacheNaming::LastModified {
            prefix: "commons".to_owned(),
            suffix: "mediainfo.json.bz2".to_owned(),
        }
    };
    let process_config =
        config.into_process_config(url, naming, FileType::JsonArray, Compression::Bzip2);
    process::<CommonsEntity, _>(cancel, &process_config, |cancel, entity| {
        handler(cancel, Entity::from(entity))
    })
}

/// Decode the `img_metadata` column of a MediaWiki `image` table row.
///
/// The column holds either JSON (newer rows, starting with `{`), a
/// PHP-serialized blob, or one of the empty sentinels `""`, `"0"`, `"-1"`.
/// PHP values convert recursively: sequential arrays become JSON lists,
/// every other array becomes a map with its keys stringified. The top
/// level itself must be a map.
///
/// See: <https://www.mediawiki.org/wiki/Manual:Image_table>
pub fn decode_image_metadata(value: &Value) -> Result<Map<String, Value>> {
    let Value::String(metadata) = value else {
        return Err(Error::UnexpectedType(format!(
            "image metadata is not a string: {value}"
        )));
    };
    if metadata.is_empty() || metadata == "0" || metadata == "-1" {
        return Ok(Map::new());
    }
    if metadata.starts_with('{') {
        return serde_json::from_str(metadata).map_err(|e| Error::JsonDecode {
            record: snippet(metadata.as_bytes()),
            source: e,
        });
    }
    match php::from_bytes(metadata.as_bytes())? {
        Value::Object(map) => Ok(map),
        other => Err(Error::UnexpectedType(format!(
            "PHP image metadata is not a map: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sentinels_decode_to_empty_map() {
        for sentinel in ["", "0", "-1"] {
            let map = decode_image_metadata(&json!(sentinel)).unwrap();
            assert!(map.is_empty(), "for sentinel {sentinel:?}");
        }
    }

    #[test]
    fn json_metadata_is_decoded_directly() {
        let value = json!("{\"width\": 800, \"height\": 600}");
        let map = decode_image_metadata(&value).unwrap();
        assert_eq!(map["width"], json!(800));
        assert_eq!(map["height"], json!(600));
    }

    #[test]
    fn php_metadata_decodes_lists_and_maps() {
        let value = json!("a:2:{s:5:\"width\";i:800;s:4:\"data\";a:2:{i:0;s:1:\"x\";i:1;s:1:\"y\";}}");
        let map = decode_image_metadata(&value).unwrap();
        assert_eq!(map["width"], json!(800));
        // Sequential nested arrays recurse element-wise.
        assert_eq!(map["data"], json!(["x", "y"]));
    }

    #[test]
    fn non_string_metadata_is_rejected() {
        assert!(matches!(
            decode_image_metadata(&json!(17)),
            Err(Error::UnexpectedType(_))
        ));
        assert!(matches!(
            decode_image_metadata(&Value::Null),
            Err(Error::UnexpectedType(_))
        ));
    }

    #[test]
    fn malformed_json_metadata_is_an_error() {
        assert!(matches!(
            decode_image_metadata(&json!("{broken")),
            Err(Error::JsonDecode { .. })
        ));
    }

    #[test]
    fn malformed_php_metadata_is_an_error() {
        assert!(decode_image_metadata(&json!("x:nonsense")).is_err());
    }

    #[test]
    fn php_scalar_metadata_is_rejected() {
        assert!(matches!(
            decode_image_metadata(&json!("i:42;")),
            Err(Error::UnexpectedType(_))
        ));
    }
}
