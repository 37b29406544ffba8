use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::store::Block;

/// Grammar for one feed-definition block:
///
/// ```text
/// [<title>](<url>)
/// SCHEDULED: <YYYY-MM-DD dow HH:MM .+N{h|d|w|m|y}>
/// <!-- REGEXP: /<pattern>/<replacement> -->      (optional)
/// <!-- WINDOW: <milliseconds> -->                 (optional)
/// ```
///
/// The `head` capture spans everything up to and including the date/time so
/// a schedule rewrite can replace exactly that substring in the original
/// block text, leaving the interval suffix and annotation lines untouched.
static GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<head>\[(?P<title>.+?)\]\((?P<url>.+?)\)\s*\nSCHEDULED: <(?P<date>[\d-]+) (?P<dow>\w+) (?P<time>[\d:]+)) \.\+(?P<count>\d+)(?P<unit>\w)>\n(?:<!-- REGEXP: /(?P<rule>.+?)/? -->\n)?(?:<!-- WINDOW: (?P<window>\d+) -->\n)?$",
    )
    .expect("definition grammar regex is valid")
});

const DEFAULT_FILTER: &str = "(.+)";
const DEFAULT_REWRITE: &str = "$1";

/// A feed block that does not conform to the definition grammar.
///
/// Fatal to the whole refresh run: a half-parsed feed list must never be
/// acted on.
#[derive(Debug, Error)]
#[error("Malformed feed definition in block {block_id}: {reason}")]
pub struct MalformedDefinition {
    pub block_id: String,
    pub reason: String,
}

/// One feed's configuration, parsed from a single document block.
#[derive(Debug, Clone)]
pub struct FeedDefinition {
    /// Id of the block this definition was parsed from.
    pub source_block_id: String,
    /// The block's text, byte-for-byte as stored.
    pub raw_text: String,
    /// Source tag applied to emitted items.
    pub title: String,
    pub url: String,
    /// When the feed next becomes due.
    pub next_refresh_at: DateTime<Utc>,
    /// Recurrence period, always positive.
    pub interval_seconds: i64,
    /// Items whose title does not match are dropped.
    pub title_filter: Regex,
    /// Replacement template producing the display title (`$1` style).
    pub title_rewrite: String,
    /// Parsed and carried through; matching does not consult it yet.
    pub dedup_window_ms: i64,
    /// Exact substring of `raw_text` ending in the schedule's date/time.
    schedule_head: String,
}

impl FeedDefinition {
    /// Parses a feed-definition block.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedDefinition`] carrying the block id if the text
    /// does not match the grammar, the URL or filter pattern is invalid, or
    /// the interval works out to zero.
    pub fn parse(block: &Block) -> Result<Self, MalformedDefinition> {
        let malformed = |reason: String| MalformedDefinition {
            block_id: block.id.clone(),
            reason,
        };

        // The grammar anchors on a trailing newline after the last line.
        let padded = format!("{}\n", block.text);
        let caps = GRAMMAR
            .captures(&padded)
            .ok_or_else(|| malformed("text does not match the definition grammar".into()))?;

        let title = caps["title"].to_string();
        let url = caps["url"].to_string();
        let parsed =
            Url::parse(&url).map_err(|e| malformed(format!("invalid feed URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(malformed(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let next_refresh_at = parse_schedule_datetime(&caps["date"], &caps["time"])
            .ok_or_else(|| {
                malformed(format!(
                    "invalid schedule date/time: {} {}",
                    &caps["date"], &caps["time"]
                ))
            })?;

        let unit = &caps["unit"];
        let unit_seconds = unit_seconds(unit)
            .ok_or_else(|| malformed(format!("unknown schedule unit: {unit}")))?;
        let count: i64 = caps["count"]
            .parse()
            .map_err(|_| malformed(format!("interval magnitude out of range: {}", &caps["count"])))?;
        let interval_seconds = count * unit_seconds;
        if interval_seconds <= 0 {
            return Err(malformed("schedule interval must be positive".into()));
        }

        let (pattern, rewrite) = match caps.name("rule") {
            Some(rule) => rule
                .as_str()
                .split_once('/')
                .map(|(p, r)| (p.to_string(), r.to_string()))
                .ok_or_else(|| malformed(format!("REGEXP rule has no replacement: {}", rule.as_str())))?,
            None => (DEFAULT_FILTER.to_string(), DEFAULT_REWRITE.to_string()),
        };
        let title_filter = Regex::new(&pattern)
            .map_err(|e| malformed(format!("invalid title filter /{pattern}/: {e}")))?;

        let dedup_window_ms = caps
            .name("window")
            .map(|w| w.as_str().parse::<i64>())
            .transpose()
            .map_err(|_| malformed("WINDOW value out of range".into()))?
            .unwrap_or(0);

        Ok(Self {
            source_block_id: block.id.clone(),
            raw_text: block.text.clone(),
            title,
            url,
            next_refresh_at,
            interval_seconds,
            title_filter,
            title_rewrite: rewrite,
            dedup_window_ms,
            schedule_head: caps["head"].to_string(),
        })
    }

    /// Returns the block text with the schedule's date/time replaced by
    /// `next`, everything else byte-for-byte unchanged.
    pub fn with_next_refresh(&self, next: DateTime<Utc>) -> String {
        // The date/time starts at the last '<' of the head; titles may
        // legally contain '<' themselves.
        let cut = self
            .schedule_head
            .rfind('<')
            .unwrap_or(self.schedule_head.len());
        let new_head = format!(
            "{}{}",
            &self.schedule_head[..cut],
            next.format("<%Y-%m-%d %a %H:%M")
        );
        self.raw_text.replacen(&self.schedule_head, &new_head, 1)
    }
}

fn parse_schedule_datetime(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let combined = format!("{date} {time}");
    NaiveDateTime::parse_from_str(&combined, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&combined, "%Y-%m-%d %H:%M"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn unit_seconds(unit: &str) -> Option<i64> {
    match unit {
        "h" => Some(3600),
        "d" => Some(86_400),
        "w" => Some(7 * 86_400),
        "m" => Some(30 * 86_400),
        "y" => Some(365 * 86_400),
        _ => None,
    }
}
