// src/bot/rules.rs - Static moderation rule set

use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rule as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub severity: u32,
    #[serde(default)]
    pub regex: Option<String>,
}

/// A loaded rule. Keywords are stored lowercased and the regex is anchored
/// to the whole message and compiled case-insensitive.
#[derive(Debug, Clone)]
pub struct Rule {
    pub title: String,
    pub keywords: Vec<String>,
    pub severity: u32,
    pub regex: Option<Regex>,
}

impl Rule {
    pub fn from_definition(definition: RuleDefinition) -> Self {
        let regex = definition.regex.as_deref().and_then(|pattern| {
            match Regex::new(&format!("(?i)^(?:{})$", pattern)) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!("Rule '{}' has an invalid regex '{}', keeping keywords only: {}",
                          definition.title, pattern, e);
                    None
                }
            }
        });

        let severity = if definition.severity == 0 {
            warn!("Rule '{}' has severity 0, raising to 1", definition.title);
            1
        } else {
            definition.severity
        };

        Self {
            title: definition.title,
            keywords: definition.keywords.iter().map(|k| k.to_lowercase()).collect(),
            severity,
            regex,
        }
    }

    /// `normalized` must already be lowercase; `raw` is the message text as sent.
    pub fn matches(&self, normalized: &str, raw: &str) -> bool {
        if self.keywords.iter().any(|k| !k.is_empty() && normalized.contains(k.as_str())) {
            return true;
        }
        self.regex.as_ref().map_or(false, |r| r.is_match(raw))
    }
}

/// Ordered, immutable rule list built once at startup
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Vec<Rule>,
}

impl RuleStore {
    /// The embedded rule set
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_definitions())
    }

    pub fn from_definitions(definitions: Vec<RuleDefinition>) -> Self {
        let rules: Vec<Rule> = definitions.into_iter().map(Rule::from_definition).collect();
        info!("Loaded {} moderation rules", rules.len());
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub fn builtin_definitions() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            title: "Bad Word".to_string(),
            keywords: vec!["badword1".to_string(), "badword2".to_string()],
            severity: 1,
            regex: None,
        },
        RuleDefinition {
            title: "Suspicious Regex".to_string(),
            keywords: Vec::new(),
            severity: 2,
            regex: Some("https?://.*".to_string()),
        },
    ]
}
