//! CSS selector tables for content extraction
//!
//! Selector chains are ordered: the first non-empty match wins. Noise
//! selectors name the elements detached from the DOM before any text is
//! read.

use lazy_static::lazy_static;
use scraper::Selector;

// Selectors are hardcoded and valid; a parse failure here is a programming
// error, caught by the test at the bottom of this module.
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    /// Elements removed before text extraction
    pub static ref NOISE: Vec<Selector> = vec![
        parse_selector!("script"),
        parse_selector!("style"),
        parse_selector!("nav"),
        parse_selector!("footer"),
        parse_selector!("aside"),
        parse_selector!(".advertisement"),
        parse_selector!(".ads"),
        parse_selector!(".sidebar"),
        parse_selector!(".menu"),
        parse_selector!(".navigation"),
    ];

    /// Title sources read from element text, in priority order
    pub static ref TITLE_TEXT: Vec<Selector> = vec![
        parse_selector!("title"),
        parse_selector!("h1"),
    ];

    /// Title sources read from meta content attributes
    pub static ref TITLE_META: Vec<Selector> = vec![
        parse_selector!(r#"meta[property="og:title"]"#),
        parse_selector!(r#"meta[name="twitter:title"]"#),
    ];

    /// Title fallbacks read from class-named elements
    pub static ref TITLE_CLASSES: Vec<Selector> = vec![
        parse_selector!(".title"),
        parse_selector!(".page-title"),
    ];

    /// Description sources from meta tags, in priority order
    pub static ref DESCRIPTION_META: Vec<Selector> = vec![
        parse_selector!(r#"meta[name="description"]"#),
        parse_selector!(r#"meta[property="og:description"]"#),
        parse_selector!(r#"meta[name="twitter:description"]"#),
    ];

    /// Description fallbacks from class-named elements
    pub static ref DESCRIPTION_CLASSES: Vec<Selector> = vec![
        parse_selector!(".description"),
        parse_selector!(".summary"),
    ];

    /// Main-content candidates; the first whose text passes the length
    /// threshold wins
    pub static ref MAIN_CONTENT: Vec<Selector> = vec![
        parse_selector!("main"),
        parse_selector!("article"),
        parse_selector!(".content"),
        parse_selector!(".main-content"),
        parse_selector!(".post-content"),
        parse_selector!(".article-content"),
        parse_selector!("#content"),
        parse_selector!(".page-content"),
    ];

    pub static ref BODY: Selector = parse_selector!("body");

    pub static ref ANCHORS: Selector = parse_selector!("a[href]");

    pub static ref META_KEYWORDS: Selector = parse_selector!(r#"meta[name="keywords"]"#);

    /// Open Graph metadata
    pub static ref OG_META: Selector = parse_selector!(r#"meta[property^="og:"]"#);

    /// Twitter Card metadata
    pub static ref TWITTER_META: Selector = parse_selector!(r#"meta[name^="twitter:"]"#);

    /// Microdata / RDFa type markers
    pub static ref ITEMTYPE: Selector = parse_selector!("[itemtype]");
    pub static ref TYPEOF: Selector = parse_selector!("[typeof]");

    /// Language sources, in priority order
    pub static ref HTML_LANG: Selector = parse_selector!("html[lang]");
    pub static ref CONTENT_LANGUAGE: Selector =
        parse_selector!(r#"meta[http-equiv="content-language" i]"#);
    pub static ref META_LANGUAGE: Selector = parse_selector!(r#"meta[name="language"]"#);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_selectors_parse() {
        // Touching each lazy_static forces the parse
        assert_eq!(NOISE.len(), 10);
        assert_eq!(TITLE_TEXT.len(), 2);
        assert_eq!(TITLE_META.len(), 2);
        assert_eq!(TITLE_CLASSES.len(), 2);
        assert_eq!(DESCRIPTION_META.len(), 3);
        assert_eq!(DESCRIPTION_CLASSES.len(), 2);
        assert_eq!(MAIN_CONTENT.len(), 8);
        let _ = &*ANCHORS;
        let _ = &*META_KEYWORDS;
        let _ = &*OG_META;
        let _ = &*TWITTER_META;
        let _ = &*ITEMTYPE;
        let _ = &*TYPEOF;
        let _ = &*HTML_LANG;
        let _ = &*CONTENT_LANGUAGE;
        let _ = &*META_LANGUAGE;
        let _ = &*BODY;
    }
}
