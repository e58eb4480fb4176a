//! Login page scraping
//!
//! The service serves its login pages as Shift_JIS more often than not, so
//! every page is decoded to UTF-8 before it reaches the HTML parser.

use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use scraper::{Html, Selector};

/// Bytes scanned for a `<meta>` charset declaration
const META_SNIFF_LIMIT: usize = 1024;

/// Decode a page body to UTF-8.
///
/// Charset resolution order: byte-order mark, `Content-Type` header,
/// `<meta>` declaration, valid UTF-8, then Shift_JIS.
pub fn normalize_page(content_type: Option<&str>, body: &[u8]) -> String {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| meta_charset(body))
        .unwrap_or_else(|| {
            if std::str::from_utf8(body).is_ok() {
                UTF_8
            } else {
                SHIFT_JIS
            }
        });

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!(encoding = used.name(), "page contained undecodable bytes");
    }
    text.into_owned()
}

/// Value of the first `<input name="...">` in the page
pub fn input_value(html: &str, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!("input[name=\"{}\"]", name)).ok()?;
    let document = Html::parse_document(html);
    let value = document
        .select(&selector)
        .next()?
        .value()
        .attr("value")?
        .trim()
        .to_string();
    (!value.is_empty()).then_some(value)
}

/// Text content of the `<textarea id="...">` in the page
pub fn textarea_text(html: &str, id: &str) -> Option<String> {
    let selector = Selector::parse(&format!("textarea#{}", id)).ok()?;
    let document = Html::parse_document(html);
    let text: String = document.select(&selector).next()?.text().collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(META_SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(|c: char| c == '"' || c == '\'')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    Encoding::for_label(label.as_bytes())
}
