use chrono::{DateTime, Utc};
use feed_rs::parser;

/// A feed document reduced to the fields the fetcher stores.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: String,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: String,
    pub content: Option<String>,
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl ParsedEntry {
    /// GUID, falling back to the link. `None` means the entry cannot be
    /// deduplicated and must be dropped.
    pub fn dedup_key(&self) -> Option<&str> {
        non_empty(self.guid.as_deref()).or_else(|| non_empty(self.link.as_deref()))
    }

    /// Body content, falling back to the summary/description.
    pub fn body(&self) -> &str {
        non_empty(self.content.as_deref())
            .or(self.description.as_deref())
            .unwrap_or_default()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, parser::ParseFeedError> {
    // feed-rs invents ids for entries that lack one; keep them empty so the
    // link fallback and the discard rule see what the origin actually sent.
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| ParsedEntry {
            guid: Some(entry.id).filter(|id| !id.trim().is_empty()),
            link: entry.links.first().map(|l| l.href.clone()),
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            content: entry.content.and_then(|c| c.body),
            description: entry.summary.map(|s| s.content),
            published: entry.published.or(entry.updated),
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content.trim().to_string()).unwrap_or_default(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example Blog</title>
    <item>
        <guid>g1</guid>
        <title>First</title>
        <link>https://example.com/1</link>
        <description>Summary one</description>
        <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
        <guid>g2</guid>
        <title>Second</title>
        <link>https://example.com/2</link>
    </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Example</title>
    <id>urn:example:feed</id>
    <updated>2024-02-01T00:00:00Z</updated>
    <entry>
        <id>urn:example:1</id>
        <title>Atom Entry</title>
        <link href="https://example.com/atom/1"/>
        <updated>2024-02-01T00:00:00Z</updated>
        <content type="html">Full body</content>
        <summary>Short</summary>
    </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title, "Example Blog");
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.guid.as_deref(), Some("g1"));
        assert_eq!(first.link.as_deref(), Some("https://example.com/1"));
        assert_eq!(first.body(), "Summary one");
        assert_eq!(
            first.published.map(|p| p.to_rfc3339()),
            Some("2024-01-01T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_parse_atom_prefers_content_and_falls_back_to_updated() {
        let feed = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(feed.title, "Atom Example");
        let entry = &feed.entries[0];
        assert_eq!(entry.dedup_key(), Some("urn:example:1"));
        assert_eq!(entry.body(), "Full body");
        assert!(entry.published.is_some());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }

    #[test]
    fn test_link_only_item_keys_on_link() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><title>Linked</title><link>https://example.com/linked</link></item>
</channel></rss>"#;
        let feed = parse_feed(rss.as_bytes()).unwrap();
        let entry = &feed.entries[0];
        assert_eq!(entry.guid, None);
        assert_eq!(entry.dedup_key(), Some("https://example.com/linked"));
    }

    #[test]
    fn test_item_without_guid_or_link_has_no_key() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><title>No ids here</title><description>Body</description></item>
</channel></rss>"#;
        let feed = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].guid, None);
        assert_eq!(feed.entries[0].dedup_key(), None);
    }

    #[test]
    fn test_dedup_key_falls_back_to_link() {
        let entry = ParsedEntry {
            guid: Some("  ".into()),
            link: Some("https://example.com/x".into()),
            ..Default::default()
        };
        assert_eq!(entry.dedup_key(), Some("https://example.com/x"));
    }

    #[test]
    fn test_dedup_key_missing_both() {
        let entry = ParsedEntry {
            title: "orphan".into(),
            ..Default::default()
        };
        assert_eq!(entry.dedup_key(), None);
    }

    #[test]
    fn test_body_falls_back_to_description() {
        let entry = ParsedEntry {
            content: Some(String::new()),
            description: Some("desc".into()),
            ..Default::default()
        };
        assert_eq!(entry.body(), "desc");
        assert_eq!(ParsedEntry::default().body(), "");
    }
}
