//! Apache-style directory index parsing.
//!
//! An index page is a `<table>` whose data rows hold an icon cell, a name
//! cell with the link, a last-modified cell and a size cell. Rows with fewer
//! than four cells (headers, separators) are ignored, as are links to the
//! parent directory, subdirectories and the column-sort links.

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};
use url::Url;

use crate::download::RemoteFile;

#[allow(clippy::expect_used)]
static TABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<table[^>]*>(.*?)</table>").expect("table regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("row regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static CELL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("cell regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static HREF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["']"#).expect("href regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*([KMGT])?$").expect("size regex is valid") // Static pattern, safe to panic
});

/// Parses an index page into remote files.
///
/// Returns `None` when the page has no table at all, which usually means the
/// URL does not point at a directory index.
#[must_use]
pub fn parse_listing(html: &str, base: &Url) -> Option<Vec<RemoteFile>> {
    let table = TABLE_PATTERN.captures(html)?.get(1)?.as_str();

    let mut files = Vec::new();
    for row in ROW_PATTERN.captures_iter(table) {
        let Some(row) = row.get(1) else { continue };
        let cells: Vec<&str> = CELL_PATTERN
            .captures_iter(row.as_str())
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if cells.len() < 4 {
            continue;
        }

        let Some(href) = HREF_PATTERN
            .captures(cells[1])
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str()))
        else {
            continue;
        };
        if !is_file_link(&href) {
            trace!(%href, "skipping non-file link");
            continue;
        }

        let Ok(url) = base.join(&href) else {
            debug!(%href, "skipping unjoinable href");
            continue;
        };
        let name = urlencoding::decode(&href).map_or_else(|_| href.clone(), |n| n.into_owned());
        if !is_plain_file_name(&name) {
            debug!(%href, %name, "skipping href that does not name a single file");
            continue;
        }

        let last_modified = cell_text(cells[2]);
        let size = parse_size(&cell_text(cells[3]));

        let mut file = RemoteFile::new(name, url.as_str(), size);
        if !last_modified.is_empty() {
            file = file.with_last_modified(last_modified);
        }
        files.push(file);
    }

    debug!(count = files.len(), "parsed directory listing");
    Some(files)
}

/// Parses a listing size cell.
///
/// Only plain byte counts are exact. Unit-suffixed values (`176M`, `1.2K`)
/// are rounded by the server and therefore reported as unknown, as are `-`
/// and empty cells.
#[must_use]
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let captures = SIZE_PATTERN.captures(text)?;
    if captures.get(2).is_some() {
        return None;
    }
    captures.get(1)?.as_str().parse::<u64>().ok()
}

fn is_file_link(href: &str) -> bool {
    !(href.is_empty()
        || href.starts_with('?')
        || href.starts_with('#')
        || href.starts_with('/')
        || href.starts_with("../")
        || href.ends_with('/')
        || href.contains("://"))
}

/// True when `name` is a single path component, so joining it onto the
/// download directory cannot leave that directory.
#[must_use]
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn cell_text(cell: &str) -> String {
    decode_entities(&TAG_PATTERN.replace_all(cell, ""))
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
