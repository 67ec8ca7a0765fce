use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{identifier_segments, RawContent};

const MAX_SLUG_LEN: usize = 120;

/// Filesystem-safe name for a page identifier, built from its host and every
/// path segment so pages sharing a trailing segment stay distinct.
pub fn slug(identifier: &str) -> String {
    let joined = identifier_segments(identifier).join("-");
    let mut slug = String::with_capacity(joined.len());
    for c in joined.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '-' };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let slug = slug.trim_matches('-');
    // Keep the tail, which carries the most specific segments.
    let slug = match slug.char_indices().rev().nth(MAX_SLUG_LEN - 1) {
        Some((start, _)) => slug[start..].trim_start_matches('-'),
        None => slug,
    };
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug.to_string()
    }
}

/// Writes the raw markup of a page to `<dir>/<slug>.html`.
pub async fn save_snapshot(dir: &Path, raw: &RawContent) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.html", slug(&raw.identifier)));
    save_text(&raw.body, &path).await?;
    Ok(path)
}

pub async fn save_text(content: &str, path: &Path) -> io::Result<()> {
    tokio::fs::write(path, content).await?;
    debug!(path = %path.display(), bytes = content.len(), "file written");
    Ok(())
}

pub async fn save_json(data: &serde_json::Value, path: &Path) -> io::Result<()> {
    let body = serde_json::to_string_pretty(data)?;
    save_text(&body, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_filesystem_safe() {
        assert_eq!(
            slug("https://www.equityapartments.com/san-francisco/soma/855-brannan-apartments"),
            "www-equityapartments-com-san-francisco-soma-855-brannan-apartments"
        );
        assert_eq!(slug("https://example.com/a b?x=1"), "example-com-a-b");
        assert_eq!(slug("///"), "page");
    }

    #[test]
    fn pages_with_the_same_tail_get_distinct_slugs() {
        let bennett = slug("https://www.essexapartmenthomes.com/apartments/san-francisco/bennett-lofts/floor-plans-and-pricing");
        let folsom = slug("https://www.essexapartmenthomes.com/apartments/san-francisco/500-folsom/floor-plans-and-pricing");
        assert_ne!(bennett, folsom);
        assert!(bennett.contains("bennett-lofts"));
    }

    #[test]
    fn long_identifiers_keep_their_tail() {
        let long = format!("https://example.com/{}/azure", "x".repeat(300));
        let s = slug(&long);
        assert!(s.len() <= MAX_SLUG_LEN);
        assert!(s.ends_with("-azure"));
    }

    #[tokio::test]
    async fn snapshot_lands_under_slug() {
        let mut dir = std::env::temp_dir();
        dir.push("listing_pipeline_snapshots");
        let _ = std::fs::remove_dir_all(&dir);

        let raw = RawContent::new("https://example.com/apartments/azure-apartments", "<div>Azure</div>");
        let path = save_snapshot(&dir, &raw).await.unwrap();
        assert_eq!(path, dir.join("example-com-apartments-azure-apartments.html"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<div>Azure</div>");
    }
}
