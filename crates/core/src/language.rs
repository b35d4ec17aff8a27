//! Primary-language classification used to decide whether an assembled final report is
//! written in English, per the `force_english_output` gate.

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageStats {
    pub primary_language: &'static str,
    pub english_words: u64,
    pub chinese_chars: u64,
    pub english_ratio: f64,
    pub chinese_ratio: f64,
}

fn is_english_word_char(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_chinese_char(c: char) -> bool {
    matches!(c as u32, 0x4e00..=0x9fff)
}

/// Strips code fences, inline code, markdown links (keeping the link text), bare URLs, and
/// table pipes before counting, so formatting and citations don't skew the language ratio.
fn sanitize_for_counting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_fence = false;

    while let Some(c) = chars.next() {
        if c == '`' {
            // Detect a ``` fence vs a single inline-code backtick.
            if chars.peek() == Some(&'`') {
                let mut lookahead = chars.clone();
                lookahead.next();
                if lookahead.peek() == Some(&'`') {
                    chars.next();
                    chars.next();
                    in_fence = !in_fence;
                    out.push(' ');
                    continue;
                }
            }
            if !in_fence {
                // Inline code: skip to the closing backtick.
                for next in chars.by_ref() {
                    if next == '`' {
                        break;
                    }
                }
                out.push(' ');
            }
            continue;
        }
        if in_fence {
            continue;
        }
        out.push(c);
    }

    let without_links = strip_markdown_links(&out);
    let without_urls = strip_urls(&without_links);
    without_urls.replace('|', " ")
}

fn strip_markdown_links(text: &str) -> String {
    // [label](target) -> label
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;
    while i < text.len() {
        let c = text[i..].chars().next().unwrap();
        if c == '[' {
            if let Some(close_rel) = text[i..].find(']') {
                let label_end = i + close_rel;
                if bytes.get(label_end + 1) == Some(&b'(') {
                    if let Some(paren_close_rel) = text[label_end + 1..].find(')') {
                        let target_end = label_end + 1 + paren_close_rel;
                        out.push_str(&text[i + 1..label_end]);
                        i = target_end + 1;
                        continue;
                    }
                }
            }
        }
        out.push(c);
        i += c.len_utf8();
    }
    out
}

fn strip_urls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let next = rest
            .find("http://")
            .into_iter()
            .chain(rest.find("https://"))
            .chain(rest.find("www."))
            .min();
        match next {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let tail = &rest[start..];
                let end = tail
                    .find(char::is_whitespace)
                    .unwrap_or(tail.len());
                out.push(' ');
                rest = &tail[end..];
            }
        }
    }
    out
}

pub fn analyze_report_language(text: &str) -> LanguageStats {
    let cleaned = sanitize_for_counting(text);

    let mut english_words = 0u64;
    let mut in_word = false;
    for c in cleaned.chars() {
        if is_english_word_char(c) {
            if !in_word {
                english_words += 1;
                in_word = true;
            }
        } else if c == '\'' || c == '\u{2019}' || c == '-' {
            // Apostrophes/hyphens inside a word don't start a new one.
        } else {
            in_word = false;
        }
    }
    let chinese_chars = cleaned.chars().filter(|c| is_chinese_char(*c)).count() as u64;

    let total_units = english_words + chinese_chars;
    if total_units == 0 {
        return LanguageStats {
            primary_language: "en",
            english_words,
            chinese_chars,
            english_ratio: 0.0,
            chinese_ratio: 0.0,
        };
    }

    let chinese_ratio = chinese_chars as f64 / total_units as f64;
    let english_ratio = english_words as f64 / total_units as f64;
    let primary_language = if chinese_ratio > 0.5 { "zh-CN" } else { "en" };

    LanguageStats {
        primary_language,
        english_words,
        chinese_chars,
        english_ratio,
        chinese_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_english_text_classifies_as_en() {
        let stats = analyze_report_language("This paper presents a novel method for review.");
        assert_eq!(stats.primary_language, "en");
        assert_eq!(stats.chinese_chars, 0);
    }

    #[test]
    fn majority_chinese_text_classifies_as_zh() {
        let stats = analyze_report_language("这是一篇关于深度学习的论文，内容非常丰富。");
        assert_eq!(stats.primary_language, "zh-CN");
    }

    #[test]
    fn code_fences_and_urls_are_excluded_from_counts() {
        let stats = analyze_report_language("See https://example.com/paper and `let x = 1;` here.");
        assert!(stats.english_words >= 2);
    }
}
