//! Capture classifier: turns observed platform traffic into job candidates.
//!
//! Exchanges are matched by URL path against the active platform's listing
//! and detail endpoint shapes. Bodies are parsed only after a shape matches.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::error::AppError;
use crate::models::{JobCandidate, RawExchange};

/// Endpoint shapes and host names of one listing platform.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub name: String,
    /// Hosts whose apply links mean "apply on the platform itself".
    pub native_hosts: Vec<String>,
    detail_patterns: Vec<Regex>,
    listing_patterns: Vec<Regex>,
    job_view_base: String,
    /// Query parameters that carry the destination of a redirect link.
    redirect_params: Vec<String>,
    /// Paths of platform links that bounce the browser to another site.
    redirector_paths: Vec<Regex>,
}

impl PlatformProfile {
    pub fn new(
        name: impl Into<String>,
        native_hosts: Vec<String>,
        detail_patterns: &[&str],
        listing_patterns: &[&str],
        job_view_base: impl Into<String>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            name: name.into(),
            native_hosts,
            detail_patterns: compile_patterns(detail_patterns)?,
            listing_patterns: compile_patterns(listing_patterns)?,
            job_view_base: job_view_base.into(),
            redirect_params: Vec::new(),
            redirector_paths: Vec::new(),
        })
    }

    /// Teach the profile the platform's outbound redirect links.
    pub fn with_redirects(
        mut self,
        params: &[&str],
        redirector_paths: &[&str],
    ) -> Result<Self, AppError> {
        self.redirect_params = params.iter().map(|p| p.to_string()).collect();
        self.redirector_paths = compile_patterns(redirector_paths)?;
        Ok(self)
    }

    pub fn linkedin() -> Result<Self, AppError> {
        Self::new(
            "linkedin",
            vec!["linkedin.com".to_string()],
            &[
                r"/voyager/api/jobs/jobPostings/",
                r"/voyager/api/jobs/jobDetails",
            ],
            &[
                r"/voyager/api/search/dash",
                r"/voyager/api/jobs/search",
                r"/voyager/api/graphql.*job",
                r"/voyager/api/voyagerJobsDashJobCards",
                r"/jobs-guest/jobs/api/",
                r"/jobs/api/",
            ],
            "https://www.linkedin.com/jobs/view/",
        )?
        .with_redirects(
            &["url", "redirect", "redirectUrl", "dest"],
            &[r"^/redir/", r"^/safety/go"],
        )
    }

    /// True when `url` is hosted on the platform (apex or any subdomain).
    pub fn is_native_url(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|parsed| self.is_native_host(&parsed))
    }

    fn is_native_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.native_hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}")))
    }

    /// Destination carried in the query string of a platform link
    /// (`/redir/redirect?url=https%3A%2F%2F...`), percent-decoded.
    pub fn unwrap_redirect(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        if !self.is_native_host(&parsed) {
            return None;
        }
        parsed
            .query_pairs()
            .find(|(key, _)| self.redirect_params.iter().any(|p| p.eq_ignore_ascii_case(key)))
            .and_then(|(_, value)| Url::parse(&value).ok())
            .filter(|target| matches!(target.scheme(), "http" | "https"))
            .map(String::from)
    }

    /// True for platform links that only bounce to another site.
    pub fn is_redirector(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|parsed| {
            self.is_native_host(&parsed)
                && self.redirector_paths.iter().any(|p| p.is_match(parsed.path()))
        })
    }

    fn shape_of(&self, url: &str) -> Option<EndpointShape> {
        let path = match Url::parse(url) {
            Ok(u) => match u.query() {
                Some(q) => format!("{}?{}", u.path(), q),
                None => u.path().to_string(),
            },
            Err(_) => url.to_string(),
        };
        if self.detail_patterns.iter().any(|p| p.is_match(&path)) {
            Some(EndpointShape::Detail)
        } else if self.listing_patterns.iter().any(|p| p.is_match(&path)) {
            Some(EndpointShape::Listing)
        } else {
            None
        }
    }

    fn job_view_url(&self, job_id: &str) -> String {
        format!("{}{}/", self.job_view_base, job_id)
    }
}

fn compile_patterns(patterns: &[&str]) -> Result<Vec<Regex>, AppError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){p}"))
                .map_err(|e| AppError::Config(format!("Invalid endpoint pattern {p}: {e}")))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointShape {
    Listing,
    Detail,
}

/// Fields a detail response can contribute to an already-captured candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailUpdate {
    pub platform_job_id: String,
    pub apply_url: Option<String>,
    pub easy_apply: bool,
    pub description_text: Option<String>,
}

impl DetailUpdate {
    /// Fill gaps in `candidate`; never overwrites fields it already has.
    pub fn apply_to(&self, candidate: &mut JobCandidate) {
        if candidate.apply_url.is_none() {
            candidate.apply_url = self.apply_url.clone();
        }
        candidate.easy_apply |= self.easy_apply;
        if candidate.description_text.is_none() {
            candidate.description_text = self.description_text.clone();
        }
    }
}

/// Verdict for one exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    Listing(Vec<JobCandidate>),
    Detail(Vec<DetailUpdate>),
    Irrelevant,
}

#[derive(Debug, Clone)]
pub struct CaptureClassifier {
    profile: PlatformProfile,
}

impl CaptureClassifier {
    pub fn new(profile: PlatformProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    /// Classify an exchange, logging parse failures and treating them as irrelevant.
    pub fn classify(&self, exchange: &RawExchange) -> Capture {
        self.try_classify(exchange).unwrap_or_else(|e| {
            tracing::warn!(url = %exchange.url, error = %e, "Failed to parse captured response");
            Capture::Irrelevant
        })
    }

    /// Classify an exchange. Errors only when the URL matched a known
    /// endpoint shape but its body could not be parsed.
    pub fn try_classify(&self, exchange: &RawExchange) -> Result<Capture, AppError> {
        let Some(shape) = self.profile.shape_of(&exchange.url) else {
            return Ok(Capture::Irrelevant);
        };
        if !exchange.is_success() || !exchange.may_be_json() {
            return Ok(Capture::Irrelevant);
        }

        let root: Value = serde_json::from_str(&exchange.body)?;
        let entities = job_entities(&root);

        match shape {
            EndpointShape::Listing => {
                let candidates = entities
                    .into_iter()
                    .filter_map(|e| self.parse_candidate(e, exchange.observed_at))
                    .collect();
                Ok(Capture::Listing(candidates))
            }
            EndpointShape::Detail => {
                let updates = entities.into_iter().filter_map(parse_detail).collect();
                Ok(Capture::Detail(updates))
            }
        }
    }

    fn parse_candidate(&self, entity: &Value, observed_at: DateTime<Utc>) -> Option<JobCandidate> {
        let platform_job_id = job_id(entity)?;
        let title = text_field(entity, "title")?;
        let company_name = company_name(entity)?;
        let (apply_url, easy_apply) = apply_info(entity);

        Some(JobCandidate {
            source_url: self.profile.job_view_url(&platform_job_id),
            platform_job_id,
            title,
            company_name,
            location_text: location(entity),
            apply_url,
            easy_apply,
            description_text: description(entity),
            source_platform: self.profile.name.clone(),
            discovered_at: observed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Entity extraction
// ---------------------------------------------------------------------------

fn looks_like_job(v: &Value) -> bool {
    let mentions_posting = |key: &str| {
        v.get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| s.to_ascii_lowercase().contains("jobposting"))
    };
    mentions_posting("entityUrn")
        || mentions_posting("$recipeType")
        || mentions_posting("$type")
        || v.get("jobPostingId").is_some()
}

/// Collect every object in a response that describes one job posting.
fn job_entities(root: &Value) -> Vec<&Value> {
    let mut found = Vec::new();

    if let Some(included) = root.get("included").and_then(Value::as_array) {
        found.extend(included.iter().filter(|e| looks_like_job(e)));
    }

    if let Some(elements) = root.get("elements").and_then(Value::as_array) {
        for element in elements {
            match element.get("jobPosting") {
                Some(inner) if inner.is_object() => found.push(inner),
                _ => found.push(element),
            }
        }
    }

    if let Some(data) = root.get("data").and_then(Value::as_object) {
        for (key, value) in data {
            if !key.to_ascii_lowercase().contains("job") {
                continue;
            }
            match value {
                Value::Array(items) => found.extend(items.iter().filter(|i| i.is_object())),
                Value::Object(_) => match value.get("elements").and_then(Value::as_array) {
                    Some(items) => found.extend(items.iter()),
                    None => found.push(value),
                },
                _ => {}
            }
        }
    }

    if found.is_empty() && looks_like_job(root) {
        found.push(root);
    }
    found
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn last_urn_segment(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .and_then(|urn| urn.rsplit(':').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn job_id(entity: &Value) -> Option<String> {
    last_urn_segment(entity.get("entityUrn"))
        .or_else(|| entity.get("jobPostingId").and_then(scalar_string))
        .or_else(|| entity.get("id").and_then(scalar_string))
        .or_else(|| last_urn_segment(entity.get("trackingUrn")))
}

/// A string field, or an object carrying it under `text`.
fn text_field(entity: &Value, key: &str) -> Option<String> {
    let v = entity.get(key)?;
    scalar_string(v).or_else(|| v.get("text").and_then(scalar_string))
}

fn company_name(entity: &Value) -> Option<String> {
    for key in ["companyDetails", "company"] {
        match entity.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(obj) if obj.is_object() => {
                let name = obj
                    .get("name")
                    .and_then(scalar_string)
                    .or_else(|| obj.get("companyName").and_then(scalar_string))
                    .or_else(|| obj.pointer("/company/name").and_then(scalar_string));
                if name.is_some() {
                    return name;
                }
            }
            _ => {}
        }
    }
    entity.get("companyName").and_then(scalar_string)
}

fn location(entity: &Value) -> Option<String> {
    entity
        .get("formattedLocation")
        .and_then(scalar_string)
        .or_else(|| entity.pointer("/location/defaultLocalizedName").and_then(scalar_string))
        .or_else(|| entity.pointer("/location/name").and_then(scalar_string))
        .or_else(|| entity.get("location").and_then(scalar_string))
        .or_else(|| entity.get("locationName").and_then(scalar_string))
}

fn description(entity: &Value) -> Option<String> {
    let v = entity.get("description")?;
    scalar_string(v)
        .or_else(|| v.get("text").and_then(scalar_string))
        .or_else(|| v.get("rawText").and_then(scalar_string))
}

fn http_url(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        .map(str::to_string)
}

fn apply_info(entity: &Value) -> (Option<String>, bool) {
    const KEYS: [&str; 5] = [
        "applyUrl",
        "applyMethod",
        "externalApplyUrl",
        "companyApplyUrl",
        "offSiteApplyUrl",
    ];
    let apply_url = KEYS.iter().find_map(|key| {
        let v = entity.get(*key)?;
        http_url(v)
            .or_else(|| v.get("url").and_then(http_url))
            .or_else(|| v.get("companyApplyUrl").and_then(http_url))
    });

    let method_type = entity.get("applyMethod").and_then(|m| {
        m.get("$type")
            .or_else(|| m.get("type"))
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
    });
    let easy_apply = method_type.is_some_and(|t| {
        t.contains("easyapply") || t.contains("simpleonsiteapply") || t.contains("complexonsiteapply")
    }) || entity.get("easyApply").and_then(Value::as_bool) == Some(true);

    (apply_url, easy_apply)
}

fn parse_detail(entity: &Value) -> Option<DetailUpdate> {
    let platform_job_id = job_id(entity)?;
    let (apply_url, easy_apply) = apply_info(entity);
    Some(DetailUpdate {
        platform_job_id,
        apply_url,
        easy_apply,
        description_text: description(entity),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier() -> CaptureClassifier {
        CaptureClassifier::new(PlatformProfile::linkedin().unwrap())
    }

    fn exchange(url: &str, body: Value) -> RawExchange {
        RawExchange::new(url, 200, body.to_string()).with_content_type("application/json")
    }

    #[test]
    fn test_listing_from_included_entities() {
        let body = json!({
            "included": [
                {
                    "entityUrn": "urn:li:fsd_jobPosting:3812345678",
                    "title": "Backend Engineer",
                    "companyDetails": {"company": {"name": "Acme"}},
                    "formattedLocation": "Berlin, Germany",
                    "applyMethod": {
                        "$type": "com.linkedin.voyager.jobs.OffsiteApply",
                        "companyApplyUrl": "https://boards.greenhouse.io/acme/jobs/123"
                    }
                },
                {"entityUrn": "urn:li:fsd_company:99", "name": "Acme"}
            ]
        });
        let capture = classifier().classify(&exchange(
            "https://www.linkedin.com/voyager/api/voyagerJobsDashJobCards?q=jobSearch",
            body,
        ));
        let Capture::Listing(candidates) = capture else {
            panic!("expected listing, got {capture:?}");
        };
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.platform_job_id, "3812345678");
        assert_eq!(c.company_name, "Acme");
        assert_eq!(c.location_text.as_deref(), Some("Berlin, Germany"));
        assert_eq!(
            c.apply_url.as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/123")
        );
        assert!(!c.easy_apply);
        assert_eq!(c.source_platform, "linkedin");
        assert_eq!(c.source_url, "https://www.linkedin.com/jobs/view/3812345678/");
    }

    #[test]
    fn test_listing_from_elements_and_data() {
        let body = json!({
            "elements": [
                {"jobPostingId": 11, "title": "Data Engineer", "companyName": "Globex",
                 "applyMethod": {"$type": "com.linkedin.voyager.jobs.SimpleOnSiteApply"}}
            ],
            "data": {
                "jobsDashJobCardsByJobSearch": {"elements": [
                    {"id": "22", "title": {"text": "SRE"}, "company": "Initech", "easyApply": true}
                ]},
                "paging": {"total": 2}
            }
        });
        let Capture::Listing(candidates) = classifier().classify(&exchange(
            "https://www.linkedin.com/voyager/api/jobs/search?keywords=rust",
            body,
        )) else {
            panic!("expected listing");
        };
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].platform_job_id, "11");
        assert!(candidates[0].easy_apply);
        assert_eq!(candidates[1].title, "SRE");
        assert_eq!(candidates[1].company_name, "Initech");
        assert!(candidates[1].easy_apply);
    }

    #[test]
    fn test_entities_missing_fields_are_skipped() {
        let body = json!({"elements": [
            {"jobPostingId": 1, "title": "No company"},
            {"title": "No id", "companyName": "Acme"}
        ]});
        assert_eq!(
            classifier().classify(&exchange("https://www.linkedin.com/jobs/api/seeMoreJobPostings", body)),
            Capture::Listing(vec![])
        );
    }

    #[test]
    fn test_detail_checked_before_listing() {
        let body = json!({
            "entityUrn": "urn:li:fsd_jobPosting:42",
            "applyUrl": "https://jobs.lever.co/acme",
            "description": {"text": "Build things."}
        });
        let capture = classifier().classify(&exchange(
            "https://www.linkedin.com/voyager/api/jobs/jobPostings/42",
            body,
        ));
        assert_eq!(
            capture,
            Capture::Detail(vec![DetailUpdate {
                platform_job_id: "42".into(),
                apply_url: Some("https://jobs.lever.co/acme".into()),
                easy_apply: false,
                description_text: Some("Build things.".into()),
            }])
        );
    }

    #[test]
    fn test_unmatched_and_non_json_are_irrelevant() {
        let c = classifier();
        assert_eq!(
            c.classify(&exchange("https://www.linkedin.com/feed/updates", json!({}))),
            Capture::Irrelevant
        );
        let html = RawExchange::new("https://www.linkedin.com/jobs-guest/jobs/api/x", 200, "<li>")
            .with_content_type("text/html");
        assert_eq!(c.classify(&html), Capture::Irrelevant);
        let failed = RawExchange::new("https://www.linkedin.com/voyager/api/jobs/search", 500, "{}");
        assert_eq!(c.classify(&failed), Capture::Irrelevant);
    }

    #[test]
    fn test_malformed_body_is_soft_error() {
        let ex = RawExchange::new("https://www.linkedin.com/voyager/api/jobs/search", 200, "{oops");
        let c = classifier();
        assert!(matches!(c.try_classify(&ex), Err(AppError::MalformedResponse(_))));
        assert_eq!(c.classify(&ex), Capture::Irrelevant);
    }

    #[test]
    fn test_detail_update_fills_gaps_only() {
        let mut candidate = JobCandidate {
            platform_job_id: "1".into(),
            title: "T".into(),
            company_name: "C".into(),
            location_text: None,
            apply_url: Some("https://a.test".into()),
            easy_apply: false,
            description_text: None,
            source_platform: "linkedin".into(),
            source_url: String::new(),
            discovered_at: Utc::now(),
        };
        DetailUpdate {
            platform_job_id: "1".into(),
            apply_url: Some("https://b.test".into()),
            easy_apply: false,
            description_text: Some("desc".into()),
        }
        .apply_to(&mut candidate);
        assert_eq!(candidate.apply_url.as_deref(), Some("https://a.test"));
        assert_eq!(candidate.description_text.as_deref(), Some("desc"));
    }

    #[test]
    fn test_native_url() {
        let p = PlatformProfile::linkedin().unwrap();
        assert!(p.is_native_url("https://www.linkedin.com/jobs/view/1"));
        assert!(p.is_native_url("https://linkedin.com/apply"));
        assert!(!p.is_native_url("https://notlinkedin.com/x"));
        assert!(!p.is_native_url("garbage"));
    }

    #[test]
    fn test_unwrap_redirect() {
        let p = PlatformProfile::linkedin().unwrap();
        assert_eq!(
            p.unwrap_redirect(
                "https://www.linkedin.com/redir/redirect?url=https%3A%2F%2Fboards.greenhouse.io%2Facme%2Fjobs%2F123&urlhash=x"
            )
            .as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/123")
        );
        assert!(p.unwrap_redirect("https://www.linkedin.com/redir/redirect?urlhash=x").is_none());
        assert!(p.unwrap_redirect("https://www.linkedin.com/redir/redirect?url=javascript%3Aalert(1)").is_none());
        assert!(p.unwrap_redirect("https://jobs.lever.co/acme?url=https%3A%2F%2Fexample.com").is_none());
    }

    #[test]
    fn test_redirector_paths() {
        let p = PlatformProfile::linkedin().unwrap();
        assert!(p.is_redirector("https://www.linkedin.com/redir/redirect?urlhash=x"));
        assert!(p.is_redirector("https://www.linkedin.com/safety/go?url=x"));
        assert!(!p.is_redirector("https://www.linkedin.com/jobs/view/1"));
        assert!(!p.is_redirector("https://example.com/redir/redirect"));
    }
}
