//! Link extraction. A scheme prefix is the only validity signal: people post links
//! informally (CJK punctuation glued on, no surrounding spaces), so no URL grammar is enforced.

use std::fmt;

const SCHEMES: [&str; 2] = ["http://", "https://"];

/// Length of "https://". A candidate must be strictly longer to be kept.
pub const MIN_LINK_LEN: usize = 8;

/// Trailing ASCII and CJK punctuation stripped from a candidate.
const TRAILING_PUNCTUATION: &[char] = &[
    ',', '.', ';', '!', '?', '，', '。', '；', '！', '？', '、',
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtractedLink(String);

impl ExtractedLink {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtractedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts links from message text, dropping blacklisted ones. Holds only the
/// lowercased blacklist, so the same text always yields the same links.
#[derive(Debug, Clone, Default)]
pub struct LinkExtractor {
    blacklist: Vec<String>,
}

impl LinkExtractor {
    pub fn new(blacklist: &[String]) -> Self {
        Self {
            blacklist: blacklist.iter().map(|b| b.to_lowercase()).collect(),
        }
    }

    /// Links in first-occurrence order.
    pub fn extract(&self, text: &str) -> Vec<ExtractedLink> {
        let mut links = Vec::new();
        for line in text.split('\n') {
            let mut rest = line.trim();
            while let Some(start) = find_scheme(rest) {
                let tail = &rest[start..];
                let end = tail.find(is_boundary).unwrap_or(tail.len());
                let candidate = tail[..end].trim_end_matches(TRAILING_PUNCTUATION);
                if candidate.len() > MIN_LINK_LEN && !self.is_blacklisted(candidate) {
                    links.push(ExtractedLink(candidate.to_string()));
                }
                rest = &tail[end..];
            }
        }
        links
    }

    fn is_blacklisted(&self, link: &str) -> bool {
        let lowered = link.to_lowercase();
        self.blacklist.iter().any(|b| lowered.contains(b.as_str()))
    }
}

/// Earliest position of any scheme marker.
fn find_scheme(s: &str) -> Option<usize> {
    SCHEMES.iter().filter_map(|scheme| s.find(scheme)).min()
}

fn is_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn extract(text: &str, blacklist: &[&str]) -> Vec<String> {
        let blacklist: Vec<String> = blacklist.iter().map(|s| s.to_string()).collect();
        LinkExtractor::new(&blacklist)
            .extract(text)
            .into_iter()
            .map(|link| link.to_string())
            .collect()
    }

    #[test]
    fn trims_comma_and_skips_blacklisted() {
        let links = extract(
            "check https://a.example.com/x, and https://blocked.test/y",
            &["blocked.test"],
        );
        assert_eq!(links, vec!["https://a.example.com/x"]);
    }

    #[rstest]
    #[case::cjk_full_stop("订阅：https://sub.example.com/api?token=1。", "https://sub.example.com/api?token=1")]
    #[case::stacked_punctuation("see http://x.example/y?!,", "http://x.example/y")]
    #[case::ideographic_comma("链接https://x.example/a、", "https://x.example/a")]
    #[case::glued_cjk_kept("https://x.example/a链接", "https://x.example/a链接")]
    #[case::tab_boundary("a\thttps://x.example/a\tb", "https://x.example/a")]
    fn single_link(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(extract(text, &[]), vec![expected]);
    }

    #[test]
    fn keeps_first_occurrence_order_across_lines() {
        let text = "first https://one.example/1 then http://two.example/2\r\n\
                    nothing here\n  https://three.example/3  ";
        assert_eq!(
            extract(text, &[]),
            vec![
                "https://one.example/1",
                "http://two.example/2",
                "https://three.example/3",
            ]
        );
    }

    #[test]
    fn bare_scheme_is_too_short() {
        assert!(extract("https:// and http://x", &[]).is_empty());
        assert_eq!(extract("http://ab", &[]), vec!["http://ab"]);
    }

    #[test]
    fn blacklist_is_case_insensitive() {
        assert!(extract("https://T.ME/joinchat/abc", &["t.me"]).is_empty());
        assert!(extract("https://t.me/joinchat/abc", &["T.Me"]).is_empty());
    }

    #[test]
    fn extraction_is_repeatable() {
        let extractor = LinkExtractor::new(&["bad".to_string()]);
        let text = "https://a.example/1, https://bad.example/2 https://c.example/3。";
        assert_eq!(extractor.extract(text), extractor.extract(text));
    }

    #[test]
    fn every_link_respects_length_and_blacklist() {
        let extractor = LinkExtractor::new(&["Spam".to_string()]);
        let text = "http:// https:// https://spam.example https://ok.example/x http://s https://SPAM.io/a";
        let links = extractor.extract(text);
        assert_eq!(links.len(), 1);
        for link in &links {
            assert!(link.as_str().len() > MIN_LINK_LEN);
            assert!(!link.as_str().to_lowercase().contains("spam"));
        }
    }
}
