//! Wikidata entities dump entry points.

use reqwest::blocking::Client;

use crate::cancel::Cancel;
use crate::decompress::Compression;
use crate::entity::Entity;
use crate::errors::Result;
use crate::pipeline::{process, DumpConfig};
use crate::runs::latest_run;
use crate::source::CacheNaming;
use crate::tokenize::FileType;

/// Always-current alias for the newest complete Wikidata entities dump.
pub const LATEST_WIKIDATA_ENTITIES_URL: &str =
    "https://dumps.wikimedia.org/wikidatawiki/entities/latest-all.json.bz2";

const WIKIDATA_ENTITIES_RUNS_URL: &str = "https://dumps.wikimedia.org/wikidatawiki/entities/";

/// URL of the newest dated Wikidata entities run whose file exists.
pub fn latest_wikidata_entities_run(cancel: &Cancel, client: &Client) -> Result<String> {
    latest_run(cancel, client, WIKIDATA_ENTITIES_RUNS_URL, |date| {
        format!(
            "https://dumps.wikimedia.org/wikidatawiki/entities/{date}/wikidata-{date}-all.json.bz2"
        )
    })
}

/// Download (unless cached), decompress, decode, and call `handler` once per
/// entity in a Wikidata entities JSON dump.
pub fn process_wikidata_dump<H>(cancel: &Cancel, config: DumpConfig, handler: H) -> Result<()>
where
    H: Fn(&Cancel, Entity) -> Result<()> + Sync,
{
    let explicit_url = config.url.clone();
    let url = explicit_url
        .clone()
        .unwrap_or_else(|| LATEST_WIKIDATA_ENTITIES_URL.to_owned());
    // `latest-all` is a stable name; a dated cache name comes from the
    // response instead.
    let naming = if explicit_url.is_some() {
        CacheNaming::Basename
    } else {
        CacheNaming::LastModified {
            prefix: "wikidata".to_owned(),
            suffix: "all.json.bz2".to_owned(),
        }
    };
    let process_config =
        config.into_process_config(url, naming, FileType::JsonArray, Compression::Bzip2);
    process::<Entity, _>(cancel, &process_config, handler)
}
