use archiver_core::{identifier_date, SourceItem};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

use crate::markup::escape_text;
use crate::sanitize::RuleError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub published: Option<NaiveDate>,
    pub canonical_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub metadata: PageMetadata,
    /// Either the whole input or a standalone document around the article body.
    pub html: String,
}

/// Pulls metadata out of a page and, when selectors are configured, narrows
/// the page down to its article body.
#[derive(Debug)]
pub struct ContentExtractor {
    content: Vec<Selector>,
    title: Vec<(Selector, &'static str)>,
    published: Vec<(Selector, &'static str)>,
    canonical: Vec<(Selector, &'static str)>,
}

impl ContentExtractor {
    pub fn new(content_selectors: &[String]) -> Result<Self, RuleError> {
        let content = content_selectors
            .iter()
            .map(|css| {
                Selector::parse(css).map_err(|err| RuleError::Selector {
                    selector: css.clone(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            content,
            title: fixed(&[
                ("meta[property=\"og:title\"]", "content"),
                ("meta[name=\"twitter:title\"]", "content"),
                ("title", ""),
                ("h1", ""),
            ]),
            published: fixed(&[
                ("meta[property=\"article:published_time\"]", "content"),
                ("time[datetime]", "datetime"),
            ]),
            canonical: fixed(&[
                ("link[rel=\"canonical\"]", "href"),
                ("a.p-canonical", "href"),
                ("meta[property=\"og:url\"]", "content"),
            ]),
        })
    }

    pub fn extract(&self, html: &str, item: &SourceItem) -> ExtractedPage {
        let doc = Html::parse_document(html);

        let title = first_value(&doc, &self.title).map(|t| strip_site_suffix(&t));
        let published = first_value(&doc, &self.published)
            .and_then(|value| parse_date_prefix(&value))
            .or_else(|| identifier_date(item));
        let canonical_url = first_value(&doc, &self.canonical);
        let metadata = PageMetadata {
            title,
            published,
            canonical_url,
        };

        let body = self
            .content
            .iter()
            .find_map(|sel| doc.select(sel).next());
        let html = match body {
            Some(node) => standalone_document(metadata.title.as_deref(), &node.inner_html()),
            None => html.to_string(),
        };

        ExtractedPage { metadata, html }
    }
}

fn fixed(specs: &[(&str, &'static str)]) -> Vec<(Selector, &'static str)> {
    specs
        .iter()
        .filter_map(|(css, attr)| Selector::parse(css).ok().map(|sel| (sel, *attr)))
        .collect()
}

/// First non-empty value; an empty attribute name means the element's text.
fn first_value(doc: &Html, candidates: &[(Selector, &'static str)]) -> Option<String> {
    candidates.iter().find_map(|(sel, attr)| {
        doc.select(sel).find_map(|el| value_of(el, attr))
    })
}

fn value_of(el: ElementRef<'_>, attr: &str) -> Option<String> {
    let raw = if attr.is_empty() {
        el.text().collect::<String>()
    } else {
        el.value().attr(attr)?.to_string()
    };
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn strip_site_suffix(title: &str) -> String {
    match title.rsplit_once(" | ") {
        Some((head, _)) if !head.trim().is_empty() => head.trim().to_string(),
        _ => title.to_string(),
    }
}

fn parse_date_prefix(value: &str) -> Option<NaiveDate> {
    let prefix = value.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn standalone_document(title: Option<&str>, body: &str) -> String {
    let mut out = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    if let Some(title) = title {
        out.push_str("<title>");
        escape_text(title, &mut out);
        out.push_str("</title>");
    }
    out.push_str("</head><body><article>");
    out.push_str(body);
    out.push_str("</article></body></html>");
    out
}
