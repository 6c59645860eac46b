//! Wikipedia Enterprise HTML dump entry points.

use reqwest::blocking::Client;

use crate::article::Article;
use crate::cancel::Cancel;
use crate::decompress::Compression;
use crate::errors::{Error, Result};
use crate::pipeline::{process, DumpConfig};
use crate::runs::latest_run;
use crate::source::CacheNaming;
use crate::tokenize::FileType;

const WIKIPEDIA_RUNS_URL: &str = "https://dumps.wikimedia.org/other/enterprise_html/runs/";

/// URL of the newest Enterprise HTML run for `wiki` (e.g. `enwiki`) and
/// `namespace` (0 for articles) whose file exists.
pub fn latest_wikipedia_run(
    cancel: &Cancel,
    client: &Client,
    wiki: &str,
    namespace: i64,
) -> Result<String> {
    latest_run(cancel, client, WIKIPEDIA_RUNS_URL, |date| {
        format!("{WIKIPEDIA_RUNS_URL}{date}/{wiki}-NS{namespace}-{date}-ENTERPRISE-HTML.json.tar.gz")
    })
}

/// URL of the newest `image` table dump for `wiki` whose file exists.
pub fn latest_wikipedia_image_metadata_run(
    cancel: &Cancel,
    client: &Client,
    wiki: &str,
) -> Result<String> {
    let index_url = format!("https://dumps.wikimedia.org/{wiki}/");
    latest_run(cancel, client, &index_url, |date| {
        format!("https://dumps.wikimedia.org/{wiki}/{date}/{wiki}-{date}-image.sql.gz")
    })
}

/// Download (unless cached), decompress, decode, and call `handler` once per
/// article in a Wikipedia Enterprise HTML dump.
///
/// Without an explicit URL the newest English Wikipedia articles run is
/// located first, which requires a client.
pub fn process_wikipedia_dump<H>(cancel: &Cancel, config: DumpConfig, handler: H) -> Result<()>
where
    H: Fn(&Cancel, Article) -> Result<()> + Sync,
{
    let url = match &config.url {
        Some(url) => url.clone(),
        None => {
            let client = config.client.as_ref().ok_or_else(|| {
                Error::InvalidValue("client is a required configuration option".to_owned())
            })?;
            latest_wikipedia_run(cancel, client, "enwiki", 0)?
        }
    };
    let process_config = config.into_process_config(
        url,
        CacheNaming::Basename,
        FileType::Ndjson,
        Compression::GzipTar,
    );
    process::<Article, _>(cancel, &process_config, handler)
}
