// src/bot/evaluator.rs - Rule, link and attachment checks for a single message

use log::debug;
use regex::Regex;
use std::sync::Arc;
use url::Url;

use crate::bot::rules::RuleStore;
use crate::types::RuleMatch;

pub const SUSPICIOUS_LINK: &str = "Suspicious Link";
pub const IMAGE_UPLOADED: &str = "Image Uploaded";

const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".png", ".gif"];

pub struct ViolationEvaluator {
    rules: Arc<RuleStore>,
    link_pattern: Regex,
    image_overrides_rule_match: bool,
}

impl ViolationEvaluator {
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self {
            rules,
            link_pattern: Regex::new(r"(?i)https?://").expect("static link pattern is valid"),
            image_overrides_rule_match: true,
        }
    }

    /// When disabled, an image attachment no longer replaces a rule or link
    /// match found in the text; it is only reported when nothing else matched.
    pub fn with_image_override(mut self, enabled: bool) -> Self {
        self.image_overrides_rule_match = enabled;
        self
    }

    /// Checks run in order: rules (first match wins), then the generic link
    /// check if no rule matched, then attachments. An image attachment
    /// replaces whatever the text checks found.
    pub fn evaluate(&self, text: &str, attachment_urls: &[&str]) -> Option<RuleMatch> {
        let normalized = text.to_lowercase();

        let mut found = self
            .rules
            .rules()
            .iter()
            .find(|rule| rule.matches(&normalized, text))
            .map(|rule| RuleMatch {
                title: rule.title.clone(),
                severity: rule.severity,
            });

        if found.is_none() && self.link_pattern.is_match(text) {
            found = Some(RuleMatch {
                title: SUSPICIOUS_LINK.to_string(),
                severity: 1,
            });
        }

        let has_image = attachment_urls.iter().any(|url| is_image_url(url));
        if has_image && (found.is_none() || self.image_overrides_rule_match) {
            found = Some(RuleMatch {
                title: IMAGE_UPLOADED.to_string(),
                severity: 1,
            });
        }

        if let Some(ref hit) = found {
            debug!("Message matched '{}' (severity {})", hit.title, hit.severity);
        }
        found
    }
}

/// True when the URL, or its path with the query string and fragment
/// stripped, ends with an image extension (case-insensitive).
pub fn is_image_url(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    let has_extension = |s: &str| IMAGE_EXTENSIONS.iter().any(|ext| s.ends_with(ext));

    if has_extension(lowered.as_str()) {
        return true;
    }
    Url::parse(&lowered).map_or(false, |url| has_extension(url.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::rules::RuleDefinition;

    fn evaluator() -> ViolationEvaluator {
        ViolationEvaluator::new(Arc::new(RuleStore::builtin()))
    }

    #[test]
    fn test_clean_message() {
        assert_eq!(evaluator().evaluate("hello there", &[]), None);
    }

    #[test]
    fn test_keyword_is_case_insensitive_substring() {
        let hit = evaluator().evaluate("You are a BADWORD1er", &[]).unwrap();
        assert_eq!(hit.title, "Bad Word");
        assert_eq!(hit.severity, 1);
    }

    #[test]
    fn test_regex_rule_beats_generic_link() {
        let hit = evaluator().evaluate("https://scam.example/free", &[]).unwrap();
        assert_eq!(hit.title, "Suspicious Regex");
        assert_eq!(hit.severity, 2);
    }

    #[test]
    fn test_link_inside_text_is_suspicious_link() {
        let hit = evaluator().evaluate("check this out http://example.com", &[]).unwrap();
        assert_eq!(hit.title, SUSPICIOUS_LINK);
        assert_eq!(hit.severity, 1);
    }

    #[test]
    fn test_first_rule_wins() {
        let rules = RuleStore::from_definitions(vec![
            RuleDefinition {
                title: "First".to_string(),
                keywords: vec!["spam".to_string()],
                severity: 3,
                regex: None,
            },
            RuleDefinition {
                title: "Second".to_string(),
                keywords: vec!["spam".to_string()],
                severity: 1,
                regex: None,
            },
        ]);
        let hit = ViolationEvaluator::new(Arc::new(rules)).evaluate("spam", &[]).unwrap();
        assert_eq!(hit.title, "First");
    }

    #[test]
    fn test_image_attachment_overwrites_keyword_match() {
        let hit = evaluator()
            .evaluate("badword2", &["https://cdn.example.com/a/cat.PNG"])
            .unwrap();
        assert_eq!(hit.title, IMAGE_UPLOADED);
        assert_eq!(hit.severity, 1);
    }

    #[test]
    fn test_image_override_can_be_disabled() {
        let evaluator = evaluator().with_image_override(false);

        let hit = evaluator.evaluate("badword2", &["https://cdn.example.com/cat.png"]).unwrap();
        assert_eq!(hit.title, "Bad Word");

        let hit = evaluator.evaluate("nice cat", &["https://cdn.example.com/cat.png"]).unwrap();
        assert_eq!(hit.title, IMAGE_UPLOADED);
    }

    #[test]
    fn test_non_image_attachment_is_ignored() {
        assert_eq!(evaluator().evaluate("notes", &["https://cdn.example.com/notes.txt"]), None);
    }

    #[test]
    fn test_empty_rule_store_still_checks_links_and_images() {
        let evaluator = ViolationEvaluator::new(Arc::new(RuleStore::default()));
        assert_eq!(evaluator.evaluate("badword1", &[]), None);
        assert!(evaluator.evaluate("https://x.example", &[]).is_some());
        assert!(evaluator.evaluate("", &["https://x.example/a.gif"]).is_some());
    }

    #[test]
    fn test_query_ending_in_image_extension_is_an_image() {
        let evaluator = ViolationEvaluator::new(Arc::new(RuleStore::default()));
        let hit = evaluator
            .evaluate("hi", &["https://cdn.example.com/download?file=cat.png"])
            .unwrap();
        assert_eq!(hit.title, IMAGE_UPLOADED);
        assert!(is_image_url("https://cdn.example.com/view#preview.JPG"));
    }

    #[test]
    fn test_image_url_detection() {
        assert!(is_image_url("https://cdn.discordapp.com/attachments/1/2/photo.jpg?ex=abc&is=def"));
        assert!(is_image_url("photo.GIF"));
        assert!(!is_image_url("https://example.com/photo.jpeg"));
        assert!(!is_image_url("https://example.com/png"));
    }
}
