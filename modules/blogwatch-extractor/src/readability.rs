//! HTML → cleaned article content via a readability heuristic (spec §4.D):
//! link density, paragraph density, and text-to-tag ratio pick the primary
//! content subtree; decorative subtrees are stripped before and after.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

const MIN_CANDIDATE_WORDS: usize = 15;

/// Strips scripts, styles, comments, and other non-content noise from raw HTML
/// before parsing, so the readability scoring pass never has to look at it.
fn strip_decorative_markup(html: &str) -> String {
    let comment_re = Regex::new(r"(?s)<!--.*?-->").unwrap();
    let tag_re = Regex::new(r"(?si)<(script|style|noscript|nav|footer|form)\b[^>]*>.*?</\1>").unwrap();

    let without_comments = comment_re.replace_all(html, "");
    tag_re.replace_all(&without_comments, "").into_owned()
}

/// The primary content subtree plus the cleaned HTML/text derived from it.
pub struct ExtractedBody {
    pub html: String,
    pub text: String,
}

pub fn extract_body(raw_html: &str) -> ExtractedBody {
    let stripped = strip_decorative_markup(raw_html);
    let document = Html::parse_document(&stripped);

    let candidate_sel = Selector::parse("article, main, [role=main], div, section").unwrap();
    let p_sel = Selector::parse("p").unwrap();
    let a_sel = Selector::parse("a").unwrap();

    let mut best: Option<(f64, ElementRef)> = None;

    for candidate in document.select(&candidate_sel) {
        let text: String = candidate.text().collect();
        let text_len = text.split_whitespace().count();
        if text_len < MIN_CANDIDATE_WORDS {
            continue;
        }

        let link_text_len: usize = candidate
            .select(&a_sel)
            .map(|a| a.text().collect::<String>().split_whitespace().count())
            .sum();
        let link_density = link_text_len as f64 / text_len.max(1) as f64;

        let paragraph_count = candidate.select(&p_sel).count();

        let score = (text_len as f64) * (1.0 - link_density).max(0.0)
            + (paragraph_count as f64) * 25.0;

        if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, candidate));
        }
    }

    let Some((_, candidate)) = best else {
        return ExtractedBody {
            html: String::new(),
            text: String::new(),
        };
    };

    let cleaned_html = strip_decorative_markup(&candidate.html());
    let text = normalize_whitespace(&html2text::from_read(cleaned_html.as_bytes(), 100).unwrap_or_default());

    ExtractedBody {
        html: cleaned_html,
        text,
    }
}

/// Collapses runs of blank lines to one and trims trailing whitespace per line
/// (spec §4.D: "collapse runs of blank lines to one").
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            if blank_run {
                continue;
            }
            blank_run = true;
        } else {
            blank_run = false;
        }
        out.push_str(trimmed);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Largest in-article `<img>` with explicit `width`/`height`, used as the last
/// hero-image tier after OpenGraph and Schema.org (spec §4.D).
pub fn largest_image_in(html: &str) -> Option<String> {
    let document = Html::parse_fragment(html);
    let img_sel = Selector::parse("img[src]").unwrap();

    document
        .select(&img_sel)
        .filter_map(|img| {
            let src = img.value().attr("src")?;
            let w: u32 = img.value().attr("width")?.parse().ok()?;
            let h: u32 = img.value().attr("height")?.parse().ok()?;
            Some((w * h, src.to_string()))
        })
        .max_by_key(|(area, _)| *area)
        .map(|(_, src)| src)
}
