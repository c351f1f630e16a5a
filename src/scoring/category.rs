//! Score categories and finding-to-category assignment

use serde::{Deserialize, Serialize};
use std::fmt;

/// A weighted component of the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    CriticalInfrastructure,
    Authentication,
    DataProtection,
    AiSecurity,
    CodeQuality,
}

impl Category {
    /// Every category in assignment order
    pub const ALL: [Category; 5] = [
        Category::CriticalInfrastructure,
        Category::Authentication,
        Category::DataProtection,
        Category::AiSecurity,
        Category::CodeQuality,
    ];

    pub fn weight(&self) -> f64 {
        match self {
            Self::CriticalInfrastructure => 0.30,
            Self::Authentication => 0.25,
            Self::DataProtection => 0.20,
            Self::AiSecurity => 0.15,
            Self::CodeQuality => 0.10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalInfrastructure => "critical-infrastructure",
            Self::Authentication => "authentication",
            Self::DataProtection => "data-protection",
            Self::AiSecurity => "ai-security",
            Self::CodeQuality => "code-quality",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::CriticalInfrastructure => &[
                "ssl",
                "tls",
                "certificate",
                "dns",
                "hosting",
                "network",
                "infrastructure",
                "transport",
            ],
            Self::Authentication => &["auth", "cookie", "session", "login", "credential", "mfa"],
            Self::DataProtection => &[
                "header",
                "csp",
                "xss",
                "leak",
                "secret",
                "api-key",
                "cors",
                "data-protection",
            ],
            Self::AiSecurity => &["ai", "llm"],
            Self::CodeQuality => &["library", "dependency", "code", "tech", "framework", "version"],
        }
    }

    /// Assigns a finding kind to the first category with a matching keyword
    ///
    /// The kind is split into tokens on `-` and `_`. A keyword matches a token that
    /// equals it, or that starts with it when the keyword is three or more
    /// characters long. Hyphenated keywords match a run of whole tokens.
    /// Unmatched kinds fall into data protection.
    pub fn for_kind(kind: &str) -> Category {
        let kind = kind.trim().to_ascii_lowercase().replace('_', "-");
        let tokens: Vec<&str> = kind.split('-').filter(|t| !t.is_empty()).collect();
        let padded = format!("-{}-", tokens.join("-"));

        Self::ALL
            .into_iter()
            .find(|category| {
                category.keywords().iter().any(|keyword| {
                    if keyword.contains('-') {
                        padded.contains(&format!("-{}-", keyword))
                    } else {
                        tokens.iter().any(|token| {
                            *token == *keyword || (keyword.len() >= 3 && token.starts_with(keyword))
                        })
                    }
                })
            })
            .unwrap_or(Category::DataProtection)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        assert_eq!(Category::for_kind("tls-not-enforced"), Category::CriticalInfrastructure);
        assert_eq!(Category::for_kind("transport-mixed-content"), Category::CriticalInfrastructure);
        assert_eq!(Category::for_kind("dns-spf-missing"), Category::CriticalInfrastructure);
        assert_eq!(Category::for_kind("cookie-missing-secure"), Category::Authentication);
        assert_eq!(Category::for_kind("header-missing-csp"), Category::DataProtection);
        assert_eq!(Category::for_kind("api-key-exposed-aws"), Category::DataProtection);
        assert_eq!(Category::for_kind("secret-private-key-exposed"), Category::DataProtection);
        assert_eq!(Category::for_kind("llm-system-prompt-exposed"), Category::AiSecurity);
        assert_eq!(Category::for_kind("tech-version-disclosure"), Category::CodeQuality);
        assert_eq!(Category::for_kind("library-outdated-jquery"), Category::CodeQuality);
    }

    #[test]
    fn test_short_keyword_needs_whole_token() {
        // "ai" must not match "maintenance" or "email"
        assert_eq!(Category::for_kind("email-exposed"), Category::DataProtection);
        assert_eq!(Category::for_kind("ai-chatbot-unprotected"), Category::AiSecurity);
    }

    #[test]
    fn test_prefix_match() {
        assert_eq!(Category::for_kind("authentication-weak"), Category::Authentication);
        assert_eq!(Category::for_kind("headers_missing"), Category::DataProtection);
    }

    #[test]
    fn test_unknown_kind_defaults_to_data_protection() {
        assert_eq!(Category::for_kind("something-odd"), Category::DataProtection);
        assert_eq!(Category::for_kind(""), Category::DataProtection);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = Category::ALL.iter().map(Category::weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
