use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Applicant-tracking systems known to the signature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Greenhouse,
    Lever,
    Ashby,
    SmartRecruiters,
    Workday,
    Recruitee,
    Breezy,
    Icims,
    Taleo,
    BambooHr,
    Jobvite,
    Comeet,
}

impl Provider {
    pub const ALL: [Provider; 12] = [
        Provider::Greenhouse,
        Provider::Lever,
        Provider::Ashby,
        Provider::SmartRecruiters,
        Provider::Workday,
        Provider::Recruitee,
        Provider::Breezy,
        Provider::Icims,
        Provider::Taleo,
        Provider::BambooHr,
        Provider::Jobvite,
        Provider::Comeet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Greenhouse => "greenhouse",
            Provider::Lever => "lever",
            Provider::Ashby => "ashby",
            Provider::SmartRecruiters => "smartrecruiters",
            Provider::Workday => "workday",
            Provider::Recruitee => "recruitee",
            Provider::Breezy => "breezy",
            Provider::Icims => "icims",
            Provider::Taleo => "taleo",
            Provider::BambooHr => "bamboohr",
            Provider::Jobvite => "jobvite",
            Provider::Comeet => "comeet",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == lowered)
            .ok_or_else(|| format!("Unknown provider: {}", s))
    }
}

/// Result of matching an apply URL against the provider signature table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMatch {
    pub provider: Provider,
    /// Board token / tenant path identifying the company on the provider.
    pub company_identifier: String,
    /// Present when the URL points at one specific posting.
    pub job_identifier: Option<String>,
}

/// One network exchange observed by the browsing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExchange {
    pub url: String,
    pub status: u16,
    /// `Location` header on redirects.
    #[serde(default)]
    pub redirect_location: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl RawExchange {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            redirect_location: None,
            content_type: None,
            body: body.into(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_redirect(mut self, location: impl Into<String>) -> Self {
        self.redirect_location = Some(location.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the declared content type is JSON, or none was recorded.
    pub fn may_be_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_none_or(|ct| ct.to_ascii_lowercase().contains("json"))
    }
}

/// A job posting observed on the listing platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCandidate {
    pub platform_job_id: String,
    pub title: String,
    pub company_name: String,
    pub location_text: Option<String>,
    pub apply_url: Option<String>,
    /// The platform offered its own in-place application flow.
    pub easy_apply: bool,
    pub description_text: Option<String>,
    pub source_platform: String,
    pub source_url: String,
    pub discovered_at: DateTime<Utc>,
}

impl JobCandidate {
    /// True when the origin can be decided without waiting for a detail record.
    pub fn origin_is_determinable(&self) -> bool {
        self.apply_url.is_some() || self.easy_apply
    }
}

/// A posting as returned by an ATS provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsRecord {
    pub provider: Provider,
    pub provider_job_id: String,
    pub company_identifier: String,
    pub title: String,
    pub company_name: String,
    pub location_text: Option<String>,
    /// `None` for listing-level records.
    pub description_text: Option<String>,
    pub apply_url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// Where a candidate's authoritative data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    AtsSourced(ProviderMatch),
    PlatformNative,
    /// External apply link that no signature recognises.
    Unknown,
}

impl Origin {
    pub fn provider_match(&self) -> Option<&ProviderMatch> {
        match self {
            Origin::AtsSourced(m) => Some(m),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Origin::AtsSourced(_) => "ATS_SOURCED",
            Origin::PlatformNative => "PLATFORM_NATIVE",
            Origin::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchDecision {
    Match,
    NoMatch,
    NotAttempted,
}

/// Outcome of comparing a candidate with an ATS record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub candidate_id: String,
    pub ats_record_id: Option<String>,
    /// Combined title/company similarity in `[0, 1]`.
    pub score: f64,
    pub decision: MatchDecision,
    /// Location agreement decided the outcome.
    pub tie_break: bool,
}

impl MatchResult {
    pub fn not_attempted(candidate_id: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            ats_record_id: None,
            score: 0.0,
            decision: MatchDecision::NotAttempted,
            tie_break: false,
        }
    }

    pub fn is_match(&self) -> bool {
        self.decision == MatchDecision::Match
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    LoginRequired,
    AuthWall,
    Checkpoint,
    Captcha,
    RateLimited,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::LoginRequired => "login_required",
            BlockReason::AuthWall => "authwall",
            BlockReason::Checkpoint => "checkpoint",
            BlockReason::Captcha => "captcha",
            BlockReason::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal block condition and where it was raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockState {
    pub reason: BlockReason,
    pub url: String,
    /// Zero-based index of the exchange that triggered the block.
    pub exchange_index: u64,
    pub detected_at: DateTime<Utc>,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_roundtrip() {
        for provider in Provider::ALL {
            let parsed: Provider = provider.as_str().parse().unwrap();
            assert_eq!(parsed, provider);
        }
        assert!("monster".parse::<Provider>().is_err());
    }

    #[test]
    fn test_raw_exchange_deserializes_with_defaults() {
        let exchange: RawExchange =
            serde_json::from_str(r#"{"url": "https://x.test/a", "status": 200}"#).unwrap();
        assert!(exchange.body.is_empty());
        assert!(exchange.redirect_location.is_none());
        assert!(exchange.may_be_json());
    }

    #[test]
    fn test_may_be_json() {
        let html = RawExchange::new("https://x.test", 200, "<html>").with_content_type("text/html");
        assert!(!html.may_be_json());
        let json = RawExchange::new("https://x.test", 200, "{}")
            .with_content_type("application/vnd.linkedin.normalized+json+2.1");
        assert!(json.may_be_json());
    }

    #[test]
    fn test_origin_serializes_with_tag() {
        let origin = Origin::AtsSourced(ProviderMatch {
            provider: Provider::Greenhouse,
            company_identifier: "acme".into(),
            job_identifier: Some("123".into()),
        });
        let json = serde_json::to_value(&origin).unwrap();
        assert_eq!(json["origin"], "ATS_SOURCED");
        assert_eq!(json["provider"], "greenhouse");
        assert_eq!(
            serde_json::to_value(Origin::Unknown).unwrap()["origin"],
            "UNKNOWN"
        );
    }

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_hash("hello"));
    }
}
