//! Technology fingerprinting
//!
//! A static rule table is applied to headers, the generator meta tag, the HTML
//! body and script URLs. Version disclosure and outdated libraries are reported
//! as findings.

use crate::analysis::types::{Analyzer, AnalyzerError, AnalyzerOutput, Finding, Severity};
use crate::crawler::{parse_page_assets, CrawlResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

/// Where a rule looks
enum Check<'a> {
    Header(&'a str, &'a Lazy<Regex>),
    Generator(&'a Lazy<Regex>),
    Body(&'a Lazy<Regex>),
    ScriptSrc(&'a Lazy<Regex>),
}

struct FingerprintRule<'a> {
    tech_name: &'a str,
    check: Check<'a>,
}

static RE_NGINX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)nginx(?:/([\d.]+))?").unwrap());
static RE_APACHE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)apache(?:/([\d.]+))?").unwrap());
static RE_CLOUDFLARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cloudflare").unwrap());
static RE_PHP: Lazy<Regex> = Lazy::new(|| Regex::new(r"PHP/([\d.]+)").unwrap());
static RE_EXPRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"Express").unwrap());
static RE_NEXTJS_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Next\.js(?: ([\d.]+))?").unwrap());
static RE_WORDPRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"WordPress(?: ([\d.]+))?").unwrap());
static RE_WP_CONTENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/wp-content/|/wp-includes/").unwrap());
static RE_DRUPAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"Drupal(?: ([\d.]+))?").unwrap());
static RE_NEXTJS_SCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/_next/static/").unwrap());
static RE_NUXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"__NUXT__").unwrap());
static RE_ANGULAR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"ng-version="([\d.]+)""#).unwrap());
static RE_REACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"data-reactroot|react-dom").unwrap());
static RE_VUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"data-v-app|__VUE_").unwrap());
static RE_JQUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r"jquery[.-]?(\d+\.\d+(?:\.\d+)?)").unwrap());
static RE_JQUERY_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"jquery(?:\.min)?\.js").unwrap());
static RE_ANALYTICS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"google-analytics\.com/|googletagmanager\.com/").unwrap());

static RULES: &[FingerprintRule] = &[
    FingerprintRule { tech_name: "Nginx", check: Check::Header("server", &RE_NGINX) },
    FingerprintRule { tech_name: "Apache", check: Check::Header("server", &RE_APACHE) },
    FingerprintRule { tech_name: "Cloudflare", check: Check::Header("server", &RE_CLOUDFLARE) },
    FingerprintRule { tech_name: "PHP", check: Check::Header("x-powered-by", &RE_PHP) },
    FingerprintRule { tech_name: "Express", check: Check::Header("x-powered-by", &RE_EXPRESS) },
    FingerprintRule { tech_name: "Next.js", check: Check::Header("x-powered-by", &RE_NEXTJS_HEADER) },
    FingerprintRule { tech_name: "Next.js", check: Check::ScriptSrc(&RE_NEXTJS_SCRIPT) },
    FingerprintRule { tech_name: "WordPress", check: Check::Generator(&RE_WORDPRESS) },
    FingerprintRule { tech_name: "WordPress", check: Check::Body(&RE_WP_CONTENT) },
    FingerprintRule { tech_name: "Drupal", check: Check::Generator(&RE_DRUPAL) },
    FingerprintRule { tech_name: "Nuxt.js", check: Check::Body(&RE_NUXT) },
    FingerprintRule { tech_name: "Angular", check: Check::Body(&RE_ANGULAR) },
    FingerprintRule { tech_name: "React", check: Check::Body(&RE_REACT) },
    FingerprintRule { tech_name: "Vue.js", check: Check::Body(&RE_VUE) },
    FingerprintRule { tech_name: "jQuery", check: Check::ScriptSrc(&RE_JQUERY) },
    FingerprintRule { tech_name: "jQuery", check: Check::ScriptSrc(&RE_JQUERY_FILE) },
    FingerprintRule { tech_name: "Google Analytics", check: Check::ScriptSrc(&RE_ANALYTICS) },
];

/// Identifies server and front-end technologies
pub struct TechStackAnalyzer;

#[async_trait]
impl Analyzer for TechStackAnalyzer {
    fn name(&self) -> &'static str {
        "tech-stack"
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        Ok(fingerprint(crawl))
    }
}

/// Applies a regex; `Some(version)` on match, where the version is the first capture
fn match_version(haystack: Option<&str>, re: &Regex) -> Option<Option<String>> {
    let captures = re.captures(haystack?)?;
    Some(captures.get(1).map(|m| m.as_str().to_string()))
}

fn fingerprint(crawl: &CrawlResult) -> AnalyzerOutput {
    let generator = Url::parse(&crawl.final_url)
        .ok()
        .and_then(|base| parse_page_assets(&crawl.html, &base).generator);

    let mut found: BTreeMap<&str, Option<String>> = BTreeMap::new();
    for rule in RULES {
        let version = match &rule.check {
            Check::Header(name, re) => match_version(crawl.header(name), re),
            Check::Generator(re) => match_version(generator.as_deref(), re),
            Check::Body(re) => match_version(Some(crawl.html.as_str()), re),
            Check::ScriptSrc(re) => crawl
                .script_sources
                .iter()
                .find_map(|src| match_version(Some(src.as_str()), re)),
        };

        if let Some(version) = version {
            let entry = found.entry(rule.tech_name).or_insert(None);
            if entry.is_none() {
                *entry = version;
            }
        }
    }

    let mut findings = Vec::new();

    if let Some(server) = crawl.header("server").filter(|s| s.chars().any(|c| c.is_ascii_digit())) {
        findings.push(
            Finding::new(
                "tech-version-disclosure",
                Severity::Low,
                "Server header discloses a software version",
            )
            .with_evidence(server.to_string())
            .with_recommendation("Remove version numbers from the Server header"),
        );
    }

    if let Some(Some(version)) = found.get("jQuery") {
        if is_outdated_jquery(version) {
            findings.push(
                Finding::new(
                    "library-outdated-jquery",
                    Severity::Medium,
                    format!("jQuery {} has known cross-site scripting issues", version),
                )
                .with_evidence(version.clone())
                .with_recommendation("Upgrade jQuery to 3.5 or later"),
            );
        }
    }

    AnalyzerOutput {
        findings,
        technologies: found
            .into_iter()
            .map(|(name, version)| match version {
                Some(v) => format!("{} {}", name, v),
                None => name.to_string(),
            })
            .collect(),
        ai_detection: None,
    }
}

/// jQuery before 3.5 mishandles HTML passed to its DOM manipulation methods
fn is_outdated_jquery(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    major < 3 || (major == 3 && minor < 5)
}
