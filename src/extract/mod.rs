//! Structured content extraction
//!
//! Turns a fetched body into title, description, cleaned text, keywords,
//! outbound links, metadata, and a content hash. HTML goes through a DOM
//! walk (never a regex over markup); plain text is cleaned and counted;
//! JSON is re-serialized with stable indentation; PDF is a declared-only
//! stub. All work here is synchronous and performs no I/O.

pub mod selectors;

use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{content_hash, PageLink};
use crate::url_utils;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_CONTENT_CHARS: usize = 50_000;
const MAX_ANCHOR_TEXT_CHARS: usize = 100;
const MAX_KEYWORDS: usize = 20;
const MAX_LANGUAGE_CHARS: usize = 5;
const MIN_MAIN_CONTENT_CHARS: usize = 100;

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: String,
    pub keywords: Vec<String>,
    pub links: Vec<PageLink>,
    pub metadata: HashMap<String, String>,
    pub language: String,
    pub word_count: u32,
    /// SHA-256 hex of `content`; the change-detection key
    pub content_hash: String,
}

/// Stateless content extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract structured content, or `None` for unusable input
    pub fn extract(
        &self,
        body: &str,
        content_type: &str,
        url: &str,
    ) -> Option<ExtractedContent> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "text/html" => Some(self.extract_html(body, url)),
            "text/plain" => Some(self.extract_plain_text(body)),
            "application/json" => self.extract_json(body),
            // Declared supported; a real text extractor can slot in here
            "application/pdf" => Some(finish(ExtractedContent::default())),
            _ => None,
        }
    }

    fn extract_html(&self, html: &str, url: &str) -> ExtractedContent {
        let mut document = Html::parse_document(html);
        let base = Url::parse(url).ok();

        // Read everything that may live inside noise elements first;
        // detaching happens before the content pass only
        let title = resolve_title(&document);
        let description = resolve_description(&document);
        let keywords = extract_keywords(&document);
        let links = extract_links(&document, base.as_ref());
        let metadata = extract_metadata(&document);
        let language = resolve_language(&document, &metadata);

        detach_noise(&mut document);

        let content = resolve_main_content(&document);

        finish(ExtractedContent {
            title,
            description,
            content,
            keywords,
            links,
            metadata,
            language,
            ..Default::default()
        })
    }

    fn extract_plain_text(&self, body: &str) -> ExtractedContent {
        finish(ExtractedContent {
            content: clean_text(body, MAX_CONTENT_CHARS),
            language: String::from("en"),
            ..Default::default()
        })
    }

    /// Parse and re-serialize so semantically equal documents hash equally
    fn extract_json(&self, body: &str) -> Option<ExtractedContent> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let pretty = serde_json::to_string_pretty(&value).ok()?;

        Some(finish(ExtractedContent {
            content: truncate_chars(&pretty, MAX_CONTENT_CHARS),
            language: String::from("en"),
            ..Default::default()
        }))
    }
}

/// Fill in the derived fields: word count, hash, language default
fn finish(mut extracted: ExtractedContent) -> ExtractedContent {
    if extracted.language.is_empty() {
        extracted.language = String::from("en");
    }
    extracted.word_count = extracted.content.split_whitespace().count() as u32;
    extracted.content_hash = content_hash(&extracted.content);
    extracted
}

/// Collapse whitespace runs to single spaces and truncate
fn clean_text(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

/// Truncate on a character boundary
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// First element whose cleaned text is non-empty
fn first_text(document: &Html, selectors: &[Selector], max_chars: usize) -> Option<String> {
    for selector in selectors {
        for el in document.select(selector) {
            let text = clean_text(&element_text(el), max_chars);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// First meta tag with a non-empty content attribute
fn first_meta(document: &Html, selectors: &[Selector], max_chars: usize) -> Option<String> {
    for selector in selectors {
        for el in document.select(selector) {
            if let Some(content) = el.value().attr("content") {
                let text = clean_text(content, max_chars);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn resolve_title(document: &Html) -> Option<String> {
    first_text(document, &selectors::TITLE_TEXT, MAX_TITLE_CHARS)
        .or_else(|| first_meta(document, &selectors::TITLE_META, MAX_TITLE_CHARS))
        .or_else(|| first_text(document, &selectors::TITLE_CLASSES, MAX_TITLE_CHARS))
}

fn resolve_description(document: &Html) -> Option<String> {
    first_meta(document, &selectors::DESCRIPTION_META, MAX_DESCRIPTION_CHARS)
        .or_else(|| first_text(document, &selectors::DESCRIPTION_CLASSES, MAX_DESCRIPTION_CHARS))
}

fn extract_keywords(document: &Html) -> Vec<String> {
    let raw = match first_meta(
        document,
        std::slice::from_ref(&*selectors::META_KEYWORDS),
        usize::MAX,
    ) {
        Some(raw) => raw,
        None => return Vec::new(),
    };

    let mut seen = HashSet::new();
    raw.split(',')
        .map(|kw| kw.trim().to_lowercase())
        .filter(|kw| kw.len() > 2)
        .filter(|kw| seen.insert(kw.clone()))
        .take(MAX_KEYWORDS)
        .collect()
}

fn extract_links(document: &Html, base: Option<&Url>) -> Vec<PageLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in document.select(&selectors::ANCHORS) {
        let href = match el.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') || href.starts_with("mailto:") {
            continue;
        }

        let text = clean_text(&element_text(el), MAX_ANCHOR_TEXT_CHARS);
        if text.is_empty() {
            continue;
        }

        let resolved = match url_utils::normalize(href, base) {
            Some(u) => u,
            None => continue,
        };
        if !seen.insert(resolved.clone()) {
            continue;
        }

        let title = el
            .value()
            .attr("title")
            .map(|t| clean_text(t, MAX_ANCHOR_TEXT_CHARS))
            .filter(|t| !t.is_empty());

        links.push(PageLink {
            url: resolved,
            text,
            title,
        });
    }

    links
}

fn extract_metadata(document: &Html) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    for el in document.select(&selectors::OG_META) {
        if let (Some(property), Some(content)) =
            (el.value().attr("property"), el.value().attr("content"))
        {
            metadata.insert(property.to_string(), content.to_string());
        }
    }

    for el in document.select(&selectors::TWITTER_META) {
        if let (Some(name), Some(content)) = (el.value().attr("name"), el.value().attr("content"))
        {
            metadata.insert(name.to_string(), content.to_string());
        }
    }

    let schema_type = document
        .select(&selectors::ITEMTYPE)
        .next()
        .and_then(|el| el.value().attr("itemtype"))
        .or_else(|| {
            document
                .select(&selectors::TYPEOF)
                .next()
                .and_then(|el| el.value().attr("typeof"))
        });
    if let Some(schema_type) = schema_type {
        metadata.insert(String::from("schemaType"), schema_type.to_string());
    }

    metadata
}

fn resolve_language(document: &Html, metadata: &HashMap<String, String>) -> String {
    let candidate = document
        .select(&selectors::HTML_LANG)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(str::to_string)
        .or_else(|| {
            document
                .select(&selectors::CONTENT_LANGUAGE)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(str::to_string)
        })
        .or_else(|| {
            document
                .select(&selectors::META_LANGUAGE)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(str::to_string)
        })
        .or_else(|| metadata.get("og:locale").cloned())
        .map(|lang| truncate_chars(lang.trim(), MAX_LANGUAGE_CHARS).to_lowercase())
        .filter(|lang| !lang.is_empty());

    candidate.unwrap_or_else(|| String::from("en"))
}

fn detach_noise(document: &mut Html) {
    let ids: Vec<_> = selectors::NOISE
        .iter()
        .flat_map(|selector| document.select(selector).map(|el| el.id()))
        .collect();

    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn resolve_main_content(document: &Html) -> String {
    for selector in selectors::MAIN_CONTENT.iter() {
        for el in document.select(selector) {
            let text = clean_text(&element_text(el), MAX_CONTENT_CHARS);
            if text.chars().count() > MIN_MAIN_CONTENT_CHARS {
                return text;
            }
        }
    }

    // Nothing substantial matched; fall back to the whole body
    document
        .select(&selectors::BODY)
        .next()
        .map(|el| clean_text(&element_text(el), MAX_CONTENT_CHARS))
        .unwrap_or_default()
}
