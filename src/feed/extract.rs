use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors for bodies that cannot be processed as a feed document at all.
///
/// Individual entries with missing fields are not errors; they are skipped
/// with a debug log so partial feeds still yield their parseable entries.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The body is not well-formed XML.
    #[error("Feed body is not valid XML: {0}")]
    Xml(String),

    /// The body parsed but contains no root element.
    #[error("Feed body has no root element")]
    NoRoot,
}

/// One raw entry pulled out of a feed document, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub url: String,
    pub published: DateTime<Utc>,
}

/// Which dialect the document's root element announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// `<feed>` root: Atom. Entries are `<entry>` with `<title>`,
    /// `<link href>`, `<updated>`.
    Atom,
    /// Anything else: treated as RSS. Items are `<item>` with `<title>`,
    /// `<origLink>` or `<link>`, `<pubDate>` or `<date>`.
    Rss,
}

/// Fields accumulated for the entry currently being read.
#[derive(Debug, Default)]
struct PendingEntry {
    title: Option<String>,
    link: Option<String>,
    orig_link: Option<String>,
    pub_date: Option<String>,
    date: Option<String>,
}

/// Which child element's text is currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    OrigLink,
    PubDate,
    Date,
}

/// Extracts raw entries from a fetched feed body.
///
/// The dialect is auto-detected from the root element name; namespaced
/// element names (`feedburner:origLink`, `dc:date`) are matched on their
/// local part. Entries missing a required field are skipped.
///
/// # Errors
///
/// Returns [`ExtractError`] if the body is not a well-formed XML document.
pub fn extract_entries(body: &str) -> Result<Vec<RawEntry>, ExtractError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut dialect: Option<Dialect> = None;
    let mut in_entry = false;
    let mut pending = PendingEntry::default();
    let mut field: Option<Field> = None;
    let mut skipped = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                let dialect = *dialect.get_or_insert_with(|| {
                    if local == b"feed" {
                        Dialect::Atom
                    } else {
                        Dialect::Rss
                    }
                });
                if local == entry_tag(dialect) {
                    in_entry = true;
                    pending = PendingEntry::default();
                } else if in_entry {
                    field = classify(dialect, &local);
                    if dialect == Dialect::Atom && local.as_slice() == b"link" {
                        capture_atom_link(&e, &mut pending);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if dialect == Some(Dialect::Atom) && in_entry && local == b"link" {
                    capture_atom_link(&e, &mut pending);
                }
            }
            Ok(Event::Text(t)) => {
                if in_entry {
                    if let Ok(text) = t.unescape() {
                        append_field(&mut pending, field, &text);
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if in_entry {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    append_field(&mut pending, field, &text);
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if let Some(dialect) = dialect {
                    if local == entry_tag(dialect) && in_entry {
                        in_entry = false;
                        match finalize(dialect, std::mem::take(&mut pending)) {
                            Some(entry) => entries.push(entry),
                            None => skipped += 1,
                        }
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
    }

    if dialect.is_none() {
        return Err(ExtractError::NoRoot);
    }
    if skipped > 0 {
        tracing::debug!(skipped, "Entries missing required fields were dropped");
    }
    Ok(entries)
}

fn entry_tag(dialect: Dialect) -> &'static [u8] {
    match dialect {
        Dialect::Atom => b"entry",
        Dialect::Rss => b"item",
    }
}

fn classify(dialect: Dialect, local: &[u8]) -> Option<Field> {
    match (dialect, local) {
        (_, b"title") => Some(Field::Title),
        (Dialect::Rss, b"link") => Some(Field::Link),
        (Dialect::Rss, b"origLink") => Some(Field::OrigLink),
        (Dialect::Rss, b"pubDate") => Some(Field::PubDate),
        (Dialect::Rss, b"date") => Some(Field::Date),
        (Dialect::Atom, b"updated") => Some(Field::Date),
        _ => None,
    }
}

fn capture_atom_link(e: &quick_xml::events::BytesStart<'_>, pending: &mut PendingEntry) {
    if pending.link.is_some() {
        return;
    }
    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed link attribute");
                continue;
            }
        };
        if attr.key.local_name().as_ref() == b"href" {
            if let Ok(value) = attr.unescape_value() {
                pending.link = Some(value.into_owned());
            }
        }
    }
}

fn append_field(pending: &mut PendingEntry, field: Option<Field>, text: &str) {
    let slot = match field {
        Some(Field::Title) => &mut pending.title,
        Some(Field::Link) => &mut pending.link,
        Some(Field::OrigLink) => &mut pending.orig_link,
        Some(Field::PubDate) => &mut pending.pub_date,
        Some(Field::Date) => &mut pending.date,
        None => return,
    };
    match slot {
        Some(existing) => existing.push_str(text),
        None => *slot = Some(text.to_string()),
    }
}

fn finalize(dialect: Dialect, pending: PendingEntry) -> Option<RawEntry> {
    let title = pending.title?;
    let (url, date_str) = match dialect {
        Dialect::Atom => (pending.link?, pending.date?),
        // Prefer the de-proxied original link when the feed carries one.
        Dialect::Rss => (
            pending.orig_link.or(pending.link)?,
            pending.pub_date.or(pending.date)?,
        ),
    };
    let published = parse_entry_date(&date_str)?;
    Some(RawEntry {
        title,
        url,
        published,
    })
}

fn parse_entry_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}
