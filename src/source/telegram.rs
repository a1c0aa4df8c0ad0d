use crate::source::message::Message;
use crate::source::parser::{ArchiveParser, ParseError};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use tracing::debug;

const DATE_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const DATE_FORMAT_WITH_OFFSET: &str = "%d.%m.%Y %H:%M:%S UTC%:z";

/// Parser for Telegram Desktop "Export chat history" HTML files.
pub struct TelegramHtmlParser {
    header: Selector,
    message: Selector,
    date: Selector,
    text: Selector,
    hashtag: Regex,
}

impl TelegramHtmlParser {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            header: selector("div.page_header div.text.bold")?,
            message: selector("div.message.default")?,
            date: selector("div.date[title]")?,
            text: selector("div.text")?,
            hashtag: Regex::new(r"#([\p{L}\p{N}_]+)")
                .map_err(|e| ParseError::Malformed(format!("hashtag pattern: {}", e)))?,
        })
    }

    /// Parse an already loaded export page. `fallback_group` is used when
    /// the page has no chat title.
    pub fn parse_html(&self, html: &str, fallback_group: &str) -> Vec<Message> {
        let document = Html::parse_document(html);

        let group = document
            .select(&self.header)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| fallback_group.to_string());

        document
            .select(&self.message)
            .filter_map(|el| self.parse_message(el, &group))
            .collect()
    }

    fn parse_message(&self, el: ElementRef<'_>, group: &str) -> Option<Message> {
        let message_id = el.value().attr("id")?.strip_prefix("message")?.to_string();

        let Some(datetime) = el
            .select(&self.date)
            .next()
            .and_then(|date| date.value().attr("title"))
            .and_then(parse_datetime)
        else {
            debug!(message_id = %message_id, group = %group, "Skipping message without date");
            return None;
        };

        let tags = el
            .select(&self.text)
            .next()
            .map(|text| self.extract_tags(&text.text().collect::<String>()))
            .unwrap_or_default();

        Some(Message {
            uuid: Message::derive_uuid(group, &message_id),
            message_id,
            datetime,
            group: group.to_string(),
            tags,
        })
    }

    fn extract_tags(&self, text: &str) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for caps in self.hashtag.captures_iter(text) {
            let tag = caps[1].to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

impl ArchiveParser for TelegramHtmlParser {
    fn parse_file(&self, path: &Path) -> Result<Vec<Message>, ParseError> {
        let html = std::fs::read_to_string(path)?;
        let fallback_group = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ParseError::Malformed(format!("no parent directory for {}", path.display()))
            })?;

        Ok(self.parse_html(&html, &fallback_group))
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Malformed(format!("selector '{}': {}", css, e)))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Export dates look like `15.01.2024 10:30:00 UTC+03:00`; older exports
/// omit the offset, in which case the time is taken as UTC.
fn parse_datetime(title: &str) -> Option<DateTime<Utc>> {
    let title = title.trim();
    if let Ok(dt) = DateTime::parse_from_str(title, DATE_FORMAT_WITH_OFFSET) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(title, DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    const EXPORT: &str = r#"
<!DOCTYPE html>
<html>
<body>
 <div class="page_wrap">
  <div class="page_header">
   <div class="content">
    <div class="text bold">
      Rust Beginners
    </div>
   </div>
  </div>
  <div class="page_body chat_page">
   <div class="history">
    <div class="message service" id="message-1">
     <div class="body details">15 January 2024</div>
    </div>
    <div class="message default clearfix" id="message101">
     <div class="body">
      <div class="pull_right date details" title="15.01.2024 10:30:00 UTC+03:00">10:30</div>
      <div class="from_name">Alice</div>
      <div class="text">Borrow checker question <a href="" onclick="return ShowHashtag(&quot;help&quot;)">#help</a> <a href="">#lifetimes</a> again #help</div>
     </div>
    </div>
    <div class="message default clearfix joined" id="message102">
     <div class="body">
      <div class="pull_right date details" title="15.01.2024 10:31:05">10:31</div>
      <div class="text">no tags here</div>
     </div>
    </div>
    <div class="message default clearfix" id="message103">
     <div class="body">
      <div class="text">missing date #ignored</div>
     </div>
    </div>
   </div>
  </div>
 </div>
</body>
</html>
"#;

    #[test]
    fn test_parse_export_page() {
        let parser = TelegramHtmlParser::new().unwrap();
        let messages = parser.parse_html(EXPORT, "fallback");

        assert_eq!(messages.len(), 2);

        let first = &messages[0];
        assert_eq!(first.message_id, "101");
        assert_eq!(first.group, "Rust Beginners");
        assert_eq!(first.tags, vec!["help".to_string(), "lifetimes".to_string()]);
        assert_eq!(
            first.datetime,
            Utc.with_ymd_and_hms(2024, 1, 15, 7, 30, 0).unwrap()
        );
        assert_eq!(first.uuid, Message::derive_uuid("Rust Beginners", "101"));

        let second = &messages[1];
        assert_eq!(second.message_id, "102");
        assert!(second.tags.is_empty());
        assert_eq!(
            second.datetime,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 31, 5).unwrap()
        );
    }

    #[test]
    fn test_fallback_group_from_directory() {
        let dir = TempDir::new().unwrap();
        let export_dir = dir.path().join("ChatExport_2024");
        fs::create_dir(&export_dir).unwrap();
        let path = export_dir.join("messages.html");
        fs::write(
            &path,
            r#"<div class="message default" id="message7"><div class="date" title="01.02.2024 00:00:00"></div><div class="text">#x</div></div>"#,
        )
        .unwrap();

        let parser = TelegramHtmlParser::new().unwrap();
        let messages = parser.parse_file(&path).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].group, "ChatExport_2024");
        assert_eq!(messages[0].tags, vec!["x".to_string()]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let parser = TelegramHtmlParser::new().unwrap();

        let err = parser.parse_file(&dir.path().join("nope.html")).unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(
            parse_datetime("31.12.2023 23:59:59 UTC-01:00"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 59, 59).unwrap())
        );
        assert_eq!(parse_datetime("not a date"), None);
    }
}
