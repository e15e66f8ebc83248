//! Regex pattern extraction over raw text
//!
//! A [`PatternSet`] combines built-in patterns with caller-supplied ones.
//! Matches from all patterns are merged into one left-to-right sequence.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Catalog of well-known data shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinPattern {
    Email,
    PhoneIntl,
    #[serde(rename = "PhoneUS")]
    PhoneUs,
    Url,
    #[serde(rename = "IPv4")]
    Ipv4,
    #[serde(rename = "IPv6")]
    Ipv6,
    Uuid,
    Currency,
    Percentage,
    Number,
    DateIso,
    #[serde(rename = "DateUS")]
    DateUs,
    Time24h,
    #[serde(rename = "PostalUS")]
    PostalUs,
    #[serde(rename = "PostalUK")]
    PostalUk,
    HexColor,
    TwitterHandle,
    Hashtag,
    MacAddr,
    Iban,
    CreditCard,
}

impl BuiltinPattern {
    pub const ALL: [BuiltinPattern; 21] = [
        BuiltinPattern::Email,
        BuiltinPattern::PhoneIntl,
        BuiltinPattern::PhoneUs,
        BuiltinPattern::Url,
        BuiltinPattern::Ipv4,
        BuiltinPattern::Ipv6,
        BuiltinPattern::Uuid,
        BuiltinPattern::Currency,
        BuiltinPattern::Percentage,
        BuiltinPattern::Number,
        BuiltinPattern::DateIso,
        BuiltinPattern::DateUs,
        BuiltinPattern::Time24h,
        BuiltinPattern::PostalUs,
        BuiltinPattern::PostalUk,
        BuiltinPattern::HexColor,
        BuiltinPattern::TwitterHandle,
        BuiltinPattern::Hashtag,
        BuiltinPattern::MacAddr,
        BuiltinPattern::Iban,
        BuiltinPattern::CreditCard,
    ];

    /// Label attached to matches of this pattern
    pub fn label(self) -> &'static str {
        match self {
            BuiltinPattern::Email => "Email",
            BuiltinPattern::PhoneIntl => "PhoneIntl",
            BuiltinPattern::PhoneUs => "PhoneUS",
            BuiltinPattern::Url => "Url",
            BuiltinPattern::Ipv4 => "IPv4",
            BuiltinPattern::Ipv6 => "IPv6",
            BuiltinPattern::Uuid => "Uuid",
            BuiltinPattern::Currency => "Currency",
            BuiltinPattern::Percentage => "Percentage",
            BuiltinPattern::Number => "Number",
            BuiltinPattern::DateIso => "DateIso",
            BuiltinPattern::DateUs => "DateUS",
            BuiltinPattern::Time24h => "Time24h",
            BuiltinPattern::PostalUs => "PostalUS",
            BuiltinPattern::PostalUk => "PostalUK",
            BuiltinPattern::HexColor => "HexColor",
            BuiltinPattern::TwitterHandle => "TwitterHandle",
            BuiltinPattern::Hashtag => "Hashtag",
            BuiltinPattern::MacAddr => "MacAddr",
            BuiltinPattern::Iban => "Iban",
            BuiltinPattern::CreditCard => "CreditCard",
        }
    }

    /// Regular form of this pattern
    pub fn source(self) -> &'static str {
        match self {
            BuiltinPattern::Email => r"[\w.+-]+@[\w-]+\.[\w.-]+",
            BuiltinPattern::PhoneIntl => r"\+\d{1,3}[ .-]?\(?\d{2,4}\)?[ .-]?\d{3,4}[ .-]?\d{4}",
            BuiltinPattern::PhoneUs => r"\(?\b\d{3}\)?[ .-]?\d{3}[ .-]?\d{4}\b",
            BuiltinPattern::Url => r#"https?://[^\s"'<>]+"#,
            BuiltinPattern::Ipv4 => r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b",
            BuiltinPattern::Ipv6 => r"(?i)\b[0-9a-f]{1,4}(?::[0-9a-f]{1,4}){7}\b",
            BuiltinPattern::Uuid => {
                r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}\b"
            }
            BuiltinPattern::Currency => r"(?:USD|EUR|GBP|RM|[$€¥£])\s?\d+(?:[.,]\d{3})*(?:[.,]\d{2})?",
            BuiltinPattern::Percentage => r"\d+(?:\.\d+)?%",
            BuiltinPattern::Number => r"\b\d{1,3}(?:,\d{3})*(?:\.\d+)?\b",
            BuiltinPattern::DateIso => r"\b\d{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12]\d|3[01])\b",
            BuiltinPattern::DateUs => r"\b(?:0?[1-9]|1[0-2])/(?:0?[1-9]|[12]\d|3[01])/(?:\d{4}|\d{2})\b",
            BuiltinPattern::Time24h => r"\b(?:[01]?\d|2[0-3]):[0-5]\d(?::[0-5]\d)?\b",
            BuiltinPattern::PostalUs => r"\b\d{5}(?:-\d{4})?\b",
            BuiltinPattern::PostalUk => r"\b[A-Z]{1,2}\d[A-Z\d]? ?\d[A-Z]{2}\b",
            BuiltinPattern::HexColor => r"#[0-9A-Fa-f]{6}\b",
            BuiltinPattern::TwitterHandle => r"(?:^|[^\w@])(@\w{1,15})\b",
            BuiltinPattern::Hashtag => r"(?:^|[^\w&])(#[A-Za-z_][\w-]*)",
            BuiltinPattern::MacAddr => r"\b(?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}\b",
            BuiltinPattern::Iban => r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b",
            BuiltinPattern::CreditCard => {
                r"\b(?:4\d{12}(?:\d{3})?|5[1-5]\d{14}|3[47]\d{13}|6(?:011|5\d{2})\d{12})\b"
            }
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    fn regex(self) -> &'static Regex {
        &BUILTIN_REGEXES[self as usize]
    }
}

// Indexed by discriminant; sources are constants covered by tests
static BUILTIN_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    BuiltinPattern::ALL
        .iter()
        .map(|p| Regex::new(p.source()).expect("built-in pattern must compile"))
        .collect()
});

/// Serializable description of a pattern set (the cache payload form)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSetDefinition {
    #[serde(default)]
    pub builtins: Vec<BuiltinPattern>,
    /// Label -> regex, in declaration order
    #[serde(default)]
    pub custom: IndexMap<String, String>,
}

impl PatternSetDefinition {
    pub fn builtins(builtins: impl IntoIterator<Item = BuiltinPattern>) -> Self {
        Self {
            builtins: builtins.into_iter().collect(),
            custom: IndexMap::new(),
        }
    }

    pub fn with_custom(mut self, label: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.custom.insert(label.into(), pattern.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty() && self.custom.is_empty()
    }

    pub fn compile(&self) -> Result<PatternSet, ConfigError> {
        let mut set = PatternSet::default();
        for builtin in &self.builtins {
            set.push(builtin.label().to_string(), builtin.regex().clone())?;
        }
        for (label, pattern) in &self.custom {
            if label.trim().is_empty() {
                return Err(ConfigError::EmptyFieldName);
            }
            let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                label: label.clone(),
                reason: e.to_string(),
            })?;
            set.push(label.clone(), re)?;
        }
        Ok(set)
    }
}

/// Compiled, immutable label -> pattern collection
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<(String, Regex)>,
}

impl PatternSet {
    fn push(&mut self, label: String, regex: Regex) -> Result<(), ConfigError> {
        if self.patterns.iter().any(|(l, _)| *l == label) {
            return Err(ConfigError::DuplicateLabel { label });
        }
        self.patterns.push((label, regex));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(l, _)| l.as_str())
    }

    /// Scan `text` with every pattern; matches are ordered by start offset,
    /// ties broken by pattern declaration order.
    pub fn extract(&self, text: &str) -> Vec<Match> {
        let mut found: Vec<(usize, Match)> = Vec::new();

        for (index, (label, re)) in self.patterns.iter().enumerate() {
            for caps in re.captures_iter(text) {
                // Prefer the first capture group when the pattern declares one
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if m.as_str().is_empty() {
                    continue;
                }
                found.push((
                    index,
                    Match {
                        label: label.clone(),
                        value: m.as_str().to_string(),
                        span: (m.start(), m.end()),
                    },
                ));
            }
        }

        found.sort_by_key(|(index, m)| (m.span.0, *index, m.span.1));
        found.into_iter().map(|(_, m)| m).collect()
    }
}

/// One labeled match; `span` is a byte range into the scanned text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub label: String,
    pub value: String,
    pub span: (usize, usize),
}
