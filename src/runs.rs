//! Dump run discovery: find the newest dated run directory whose file
//! actually exists.
//!
//! Wikimedia publishes dumps under per-run `YYYYMMDD/` directories listed on
//! a plain HTML index page. Recent runs can still be in progress (directory
//! listed, file missing), so candidates are probed newest-first with `HEAD`
//! until one answers 200. Nothing is cached; every call re-reads the index.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use tracing::debug;

use crate::cancel::Cancel;
use crate::errors::{Error, Result};
use crate::source::{get_with_retry, head_ok};

static RUN_DIR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{8})/$").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// Scrape `index_url` for run directories and return the URL produced by
/// `file_url` for the newest run whose file exists.
pub(crate) fn latest_run(
    cancel: &Cancel,
    client: &Client,
    index_url: &str,
    file_url: impl Fn(&str) -> String,
) -> Result<String> {
    let body = get_with_retry(cancel, client, index_url)?
        .text()
        .map_err(|e| Error::network(index_url, e))?;

    let mut dates = run_dates(&body);
    dates.sort();
    for date in dates.iter().rev() {
        let candidate = file_url(date);
        debug!(%candidate, "probing dump run");
        if head_ok(cancel, client, &candidate)? {
            return Ok(candidate);
        }
        // The run exists but its file does not (yet); try the previous run.
    }
    Err(Error::NotFound)
}

/// Extract `YYYYMMDD` anchor targets from a run index page.
fn run_dates(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| {
            RUN_DIR_REGEX
                .captures(href)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_dates_match_dated_directories_only() {
        let body = r#"
            <html><body>
            <a href="../">../</a>
            <a href="20240101/">20240101/</a>
            <a href="20240301/">20240301/</a>
            <a href="latest/">latest/</a>
            <a href="20231215/">20231215/</a>
            <a href="readme.txt">readme.txt</a>
            <a href="2024/">2024/</a>
            </body></html>
        "#;
        let dates = run_dates(body);
        assert_eq!(dates, vec!["20240101", "20240301", "20231215"]);
    }

    #[test]
    fn run_dates_of_empty_page_are_empty() {
        assert!(run_dates("<html><body>nothing here</body></html>").is_empty());
    }
}
