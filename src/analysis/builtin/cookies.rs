//! Cookie flag checks

use crate::analysis::types::{Analyzer, AnalyzerError, AnalyzerOutput, Finding, Severity};
use crate::crawler::{Cookie, CrawlResult};
use async_trait::async_trait;

/// Name fragments of cookies that usually carry a session or credential
const SESSION_MARKERS: &[&str] = &["sess", "sid", "auth", "token", "login", "jwt"];

/// Reports cookies set without Secure, HttpOnly or SameSite
pub struct CookieSecurityAnalyzer;

#[async_trait]
impl Analyzer for CookieSecurityAnalyzer {
    fn name(&self) -> &'static str {
        "cookie-security"
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        let https = crawl.is_https();
        let findings = crawl
            .cookies
            .iter()
            .flat_map(|cookie| check_cookie(cookie, https))
            .collect();
        Ok(AnalyzerOutput::with_findings(findings))
    }
}

fn is_session_cookie(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SESSION_MARKERS.iter().any(|m| lower.contains(m))
}

fn check_cookie(cookie: &Cookie, https: bool) -> Vec<Finding> {
    let mut findings = Vec::new();
    let session = is_session_cookie(&cookie.name);

    if https && !cookie.secure {
        let severity = if session { Severity::High } else { Severity::Low };
        findings.push(
            Finding::new(
                "cookie-missing-secure",
                severity,
                format!("Cookie '{}' is sent without the Secure flag", cookie.name),
            )
            .with_evidence(cookie.name.clone())
            .with_recommendation("Set the Secure attribute on every cookie served over HTTPS"),
        );
    }

    if session && !cookie.http_only {
        findings.push(
            Finding::new(
                "cookie-missing-httponly",
                Severity::Medium,
                format!("Session cookie '{}' is readable from JavaScript", cookie.name),
            )
            .with_evidence(cookie.name.clone())
            .with_impact("A cross-site scripting bug can steal the session")
            .with_recommendation("Set the HttpOnly attribute on session cookies"),
        );
    }

    match cookie.same_site.as_deref().map(str::to_ascii_lowercase) {
        None if session => findings.push(
            Finding::new(
                "cookie-missing-samesite",
                Severity::Low,
                format!("Session cookie '{}' has no SameSite attribute", cookie.name),
            )
            .with_evidence(cookie.name.clone()),
        ),
        Some(value) if value == "none" && !cookie.secure => findings.push(
            Finding::new(
                "cookie-samesite-none-insecure",
                Severity::Medium,
                format!("Cookie '{}' uses SameSite=None without Secure", cookie.name),
            )
            .with_evidence(cookie.name.clone()),
        ),
        _ => {}
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: "v".to_string(),
            ..Cookie::default()
        }
    }

    #[test]
    fn test_hardened_session_cookie() {
        let c = Cookie {
            http_only: true,
            secure: true,
            same_site: Some("Lax".to_string()),
            ..cookie("sessionid")
        };
        assert!(check_cookie(&c, true).is_empty());
    }

    #[test]
    fn test_bare_session_cookie() {
        let kinds: Vec<String> = check_cookie(&cookie("PHPSESSID"), true)
            .into_iter()
            .map(|f| f.kind)
            .collect();
        assert_eq!(
            kinds,
            vec!["cookie-missing-secure", "cookie-missing-httponly", "cookie-missing-samesite"]
        );
    }

    #[test]
    fn test_preference_cookie_only_needs_secure() {
        let findings = check_cookie(&cookie("theme"), true);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);
        assert!(check_cookie(&cookie("theme"), false).is_empty());
    }

    #[test]
    fn test_samesite_none_requires_secure() {
        let c = Cookie {
            same_site: Some("None".to_string()),
            ..cookie("tracking")
        };
        assert!(check_cookie(&c, false)
            .iter()
            .any(|f| f.kind == "cookie-samesite-none-insecure"));
    }
}
