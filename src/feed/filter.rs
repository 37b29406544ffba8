use chrono::{DateTime, Utc};

use super::definition::FeedDefinition;
use super::extract::RawEntry;

/// Renders the canonical single-line markdown form of one item.
///
/// This string is the unit of identity: two items are the same iff their
/// rendered lines are byte-equal. The fixed-width UTC date prefix makes a
/// plain lexicographic sort chronological.
pub fn render_item(
    published: DateTime<Utc>,
    feed_title: &str,
    display_title: &str,
    url: &str,
) -> String {
    format!(
        "<{}> [[{}]]: [{}]({})",
        published.format("%Y-%m-%d %H:%M"),
        feed_title,
        display_title,
        url
    )
}

/// Applies a feed's title filter to one raw entry.
///
/// Returns `None` when the title does not match. Otherwise the rewrite
/// template is applied (first match only, `$1`-style captures) and the
/// rendered line is produced.
pub fn render_entry(def: &FeedDefinition, entry: &RawEntry) -> Option<String> {
    if !def.title_filter.is_match(&entry.title) {
        return None;
    }
    let display = def
        .title_filter
        .replace(&entry.title, def.title_rewrite.as_str());
    Some(render_item(
        entry.published,
        &def.title,
        &display,
        &entry.url,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Block;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn def(text: &str) -> FeedDefinition {
        FeedDefinition::parse(&Block::new("b1", text)).unwrap()
    }

    fn entry(title: &str) -> RawEntry {
        RawEntry {
            title: title.to_string(),
            url: "https://example.com/post".to_string(),
            published: Utc.with_ymd_and_hms(2024, 1, 4, 10, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_item_format() {
        let line = render_item(
            Utc.with_ymd_and_hms(2024, 1, 4, 10, 30, 59).unwrap(),
            "Blog",
            "A title",
            "https://x/p",
        );
        // Minute precision; seconds are dropped.
        assert_eq!(line, "<2024-01-04 10:30> [[Blog]]: [A title](https://x/p)");
    }

    #[test]
    fn test_default_filter_is_identity() {
        let d = def("[Blog](https://x/feed.xml)\nSCHEDULED: <2024-01-01 Mon 00:00 .+1d>");
        let line = render_entry(&d, &entry("Anything goes")).unwrap();
        assert_eq!(
            line,
            "<2024-01-04 10:30> [[Blog]]: [Anything goes](https://example.com/post)"
        );
    }

    #[test]
    fn test_release_filter_rewrites_matching_title() {
        let d = def(
            "[Blog](https://x/feed.xml)\nSCHEDULED: <2024-01-01 Mon 00:00 .+1d>\n<!-- REGEXP: /^Release (.+)$/$1 -->",
        );
        let line = render_entry(&d, &entry("Release v2.0")).unwrap();
        assert_eq!(
            line,
            "<2024-01-04 10:30> [[Blog]]: [v2.0](https://example.com/post)"
        );
    }

    #[test]
    fn test_non_matching_title_dropped() {
        let d = def(
            "[Blog](https://x/feed.xml)\nSCHEDULED: <2024-01-01 Mon 00:00 .+1d>\n<!-- REGEXP: /^Release (.+)$/$1 -->",
        );
        assert_eq!(render_entry(&d, &entry("Draft v2.0")), None);
    }

    #[test]
    fn test_rewrite_replaces_first_match_only() {
        let d = def(
            "[Blog](https://x/feed.xml)\nSCHEDULED: <2024-01-01 Mon 00:00 .+1d>\n<!-- REGEXP: /o/0 -->",
        );
        let line = render_entry(&d, &entry("foo boo")).unwrap();
        assert!(line.contains("[f0o boo]"));
    }
}
