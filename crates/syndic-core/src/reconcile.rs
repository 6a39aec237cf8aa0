//! Duplicate comparator between a platform candidate and an ATS record.
//!
//! Pure and deterministic: the same two records and the same
//! [`MatchConfig`] always give the same [`MatchResult`].

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::AppError;
use crate::models::{AtsRecord, JobCandidate, MatchDecision, MatchResult};

/// Weights and thresholds for the comparator.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    /// Combined score at or above which two records match.
    pub threshold: f64,
    pub title_weight: f64,
    pub company_weight: f64,
    /// Half-width of the band around `threshold` where location breaks the tie.
    pub tie_band: f64,
    /// Location similarity needed to call a tie a match.
    pub location_agreement: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            title_weight: 0.6,
            company_weight: 0.4,
            tie_band: 0.05,
            location_agreement: 0.7,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(AppError::Config(format!("{name} must be within [0, 1], got {v}")))
            }
        };
        unit("match threshold", self.threshold)?;
        unit("tie band", self.tie_band)?;
        unit("location agreement", self.location_agreement)?;
        if self.title_weight < 0.0 || self.company_weight < 0.0 {
            return Err(AppError::Config("match weights must be non-negative".into()));
        }
        if self.title_weight + self.company_weight <= 0.0 {
            return Err(AppError::Config("match weights must not both be zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: MatchConfig,
}

impl Reconciler {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn compare(&self, candidate: &JobCandidate, record: &AtsRecord) -> MatchResult {
        let score = self.score_fields(
            &candidate.title,
            &candidate.company_name,
            &record.title,
            &record.company_name,
        );

        let mut tie_break = false;
        let decision = match location_similarity(
            candidate.location_text.as_deref(),
            record.location_text.as_deref(),
        ) {
            Some(loc) if (score - self.config.threshold).abs() <= self.config.tie_band + 1e-9 => {
                tie_break = true;
                if loc >= self.config.location_agreement {
                    MatchDecision::Match
                } else {
                    MatchDecision::NoMatch
                }
            }
            _ if score >= self.config.threshold => MatchDecision::Match,
            _ => MatchDecision::NoMatch,
        };

        MatchResult {
            candidate_id: candidate.platform_job_id.clone(),
            ats_record_id: Some(record.provider_job_id.clone()),
            score,
            decision,
            tie_break,
        }
    }

    /// Combined title/company score for two records, in `[0, 1]`.
    pub fn score_fields(
        &self,
        title_a: &str,
        company_a: &str,
        title_b: &str,
        company_b: &str,
    ) -> f64 {
        let title = similarity(&normalize_title(title_a), &normalize_title(title_b));
        let company = similarity(&normalize_company(company_a), &normalize_company(company_b));
        self.combine(title, company)
    }

    /// Weighted mean of per-field similarities.
    pub fn combine(&self, title_similarity: f64, company_similarity: f64) -> f64 {
        let total = self.config.title_weight + self.config.company_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let score = (self.config.title_weight * title_similarity
            + self.config.company_weight * company_similarity)
            / total;
        score.clamp(0.0, 1.0)
    }

    /// Score every record and return the best one. Equal scores go to the
    /// lower provider job ID.
    pub fn best_match<'r>(
        &self,
        candidate: &JobCandidate,
        records: &'r [AtsRecord],
    ) -> Option<(&'r AtsRecord, MatchResult)> {
        records
            .iter()
            .map(|r| (r, self.compare(candidate, r)))
            .min_by(|(ra, a), (rb, b)| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| cmp_job_ids(&ra.provider_job_id, &rb.provider_job_id))
            })
    }
}

/// Numeric IDs compare numerically, everything else lexicographically.
fn cmp_job_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

const WORK_MODE_MARKERS: [&str; 4] = ["remote", "hybrid", "onsite", "wfh"];

const LEGAL_SUFFIXES: [&str; 16] = [
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "gmbh",
    "corp",
    "corporation",
    "co",
    "company",
    "plc",
    "sa",
    "ag",
    "bv",
    "srl",
    "spa",
];

/// Drop `(...)` and `[...]` segments.
fn strip_brackets(s: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Lowercase, punctuation to spaces, split on whitespace.
fn tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn is_requisition_number(token: &str) -> bool {
    token.chars().filter(char::is_ascii_digit).count() >= 3 && token.len() >= 4
}

pub fn normalize_title(title: &str) -> String {
    let toks = tokens(&strip_brackets(title));
    let mut kept: Vec<&str> = Vec::with_capacity(toks.len());
    let mut i = 0;
    while i < toks.len() {
        let t = toks[i].as_str();
        let next = toks.get(i + 1).map(String::as_str);
        if t == "job" && next == Some("id") {
            i += 2;
            continue;
        }
        if t == "req" || t == "requisition" || WORK_MODE_MARKERS.contains(&t) {
            i += 1;
            continue;
        }
        if !is_requisition_number(t) {
            kept.push(t);
        }
        i += 1;
    }
    kept.join(" ")
}

pub fn normalize_company(company: &str) -> String {
    let toks = tokens(company);
    let kept: Vec<&str> = toks
        .iter()
        .map(String::as_str)
        .filter(|t| !LEGAL_SUFFIXES.contains(t))
        .collect();
    if kept.is_empty() {
        toks.join(" ")
    } else {
        kept.join(" ")
    }
}

pub fn normalize_location(location: &str) -> String {
    let first = location.split(',').next().unwrap_or_default();
    tokens(first)
        .into_iter()
        .filter(|t| !WORK_MODE_MARKERS.contains(&t.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `max(normalized Levenshtein, token Jaccard)` over already-normalized strings.
///
/// A side that normalized to nothing carries no evidence and scores 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let edit = strsim::normalized_levenshtein(a, b);
    let ta: HashSet<&str> = a.split(' ').collect();
    let tb: HashSet<&str> = b.split(' ').collect();
    let union = ta.union(&tb).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        ta.intersection(&tb).count() as f64 / union as f64
    };
    edit.max(jaccard)
}

/// `None` unless both sides carry a location that survives normalization.
fn location_similarity(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let a = normalize_location(a?);
    let b = normalize_location(b?);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(similarity(&a, &b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use crate::testutil::{make_candidate, make_record};
    use proptest::prelude::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("Senior Backend Engineer (Remote) - Req #12345"),
            "senior backend engineer"
        );
        assert_eq!(normalize_title("Data Engineer, Hybrid [Berlin]"), "data engineer");
        assert_eq!(normalize_title("SRE – Job ID: 998877"), "sre");
        assert_eq!(normalize_title("Engineer II"), "engineer ii");
    }

    #[test]
    fn test_normalize_company_and_location() {
        assert_eq!(normalize_company("Acme, Inc."), "acme");
        assert_eq!(normalize_company("Globex Corporation GmbH"), "globex");
        assert_eq!(normalize_company("Co"), "co");
        assert_eq!(normalize_location("Berlin, Germany (Hybrid)"), "berlin");
        assert_eq!(normalize_location("Remote"), "");
    }

    #[test]
    fn test_identical_records_match() {
        let candidate = make_candidate("1", "Backend Engineer", "Acme", None);
        let record = make_record(Provider::Greenhouse, "123", "Backend Engineer", "Acme");
        let result = Reconciler::default().compare(&candidate, &record);
        assert_eq!(result.decision, MatchDecision::Match);
        assert!((result.score - 1.0).abs() < 1e-9);
        assert_eq!(result.ats_record_id.as_deref(), Some("123"));
        assert!(!result.tie_break);
    }

    #[test]
    fn test_different_postings_do_not_match() {
        let candidate = make_candidate("1", "Backend Engineer", "Acme", None);
        let record = make_record(Provider::Greenhouse, "9", "Head of Marketing", "Acme");
        let result = Reconciler::default().compare(&candidate, &record);
        assert_eq!(result.decision, MatchDecision::NoMatch);
    }

    #[test]
    fn test_cosmetic_differences_still_match() {
        let candidate = make_candidate("1", "Backend Engineer (Remote)", "Acme Inc.", None);
        let record = make_record(Provider::Lever, "a", "Backend Engineer - Remote", "ACME");
        assert!(Reconciler::default().compare(&candidate, &record).is_match());
    }

    #[test]
    fn test_location_breaks_ties_inside_band() {
        // Title edit ratio 16/23, company identical: score ~0.817, inside the band.
        let reconciler = Reconciler::default();
        let mut candidate = make_candidate("1", "Senior Backend Engineer", "Acme", None);
        let mut record = make_record(Provider::Greenhouse, "1", "Backend Engineer", "Acme");
        candidate.location_text = Some("Berlin, Germany".into());
        record.location_text = Some("Munich, Germany".into());
        let result = reconciler.compare(&candidate, &record);
        assert!(result.tie_break);
        assert_eq!(result.decision, MatchDecision::NoMatch);

        record.location_text = Some("Berlin".into());
        let result = reconciler.compare(&candidate, &record);
        assert!(result.tie_break);
        assert_eq!(result.decision, MatchDecision::Match);
    }

    #[test]
    fn test_location_ignored_outside_band() {
        let mut candidate = make_candidate("1", "Backend Engineer", "Acme", None);
        let mut record = make_record(Provider::Greenhouse, "1", "Backend Engineer", "Acme");
        candidate.location_text = Some("Berlin".into());
        record.location_text = Some("Tokyo".into());
        let result = Reconciler::default().compare(&candidate, &record);
        assert!(!result.tie_break);
        assert!(result.is_match());
    }

    #[test]
    fn test_best_match_prefers_score_then_lower_id() {
        let candidate = make_candidate("1", "Backend Engineer", "Acme", None);
        let records = vec![
            make_record(Provider::Greenhouse, "30", "Frontend Engineer", "Acme"),
            make_record(Provider::Greenhouse, "20", "Backend Engineer", "Acme"),
            make_record(Provider::Greenhouse, "10", "Backend Engineer", "Acme"),
            make_record(Provider::Greenhouse, "9", "Designer", "Acme"),
        ];
        let (best, result) = Reconciler::default().best_match(&candidate, &records).unwrap();
        assert_eq!(best.provider_job_id, "10");
        assert!(result.is_match());
        assert!(Reconciler::default().best_match(&candidate, &[]).is_none());
    }

    #[test]
    fn test_titles_that_normalize_to_nothing_do_not_match() {
        let r = Reconciler::default();
        assert_eq!(similarity("", ""), 0.0);
        let score = r.score_fields("REQ-12345", "Acme", "(Remote)", "Acme");
        assert!(score < r.config().threshold, "score {score}");

        let candidate = make_candidate("1", "REQ-12345", "Acme", None);
        let record = make_record(Provider::Lever, "abc", "(Remote)", "Acme");
        assert_eq!(
            r.compare(&candidate, &record).decision,
            MatchDecision::NoMatch
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(MatchConfig::default().validate().is_ok());
        let bad = MatchConfig {
            threshold: 1.5,
            ..MatchConfig::default()
        };
        assert!(bad.validate().is_err());
        let zero = MatchConfig {
            title_weight: 0.0,
            company_weight: 0.0,
            ..MatchConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_score_is_symmetric(
            ta in "[A-Za-z ,()-]{0,30}",
            ca in "[A-Za-z .]{0,20}",
            tb in "[A-Za-z ,()-]{0,30}",
            cb in "[A-Za-z .]{0,20}",
        ) {
            let r = Reconciler::default();
            let forward = r.score_fields(&ta, &ca, &tb, &cb);
            let backward = r.score_fields(&tb, &cb, &ta, &ca);
            prop_assert!((forward - backward).abs() < 1e-12);
            prop_assert!((0.0..=1.0).contains(&forward));
        }

        #[test]
        fn prop_identical_fields_score_one(
            t in "q[a-z]{2,9}( q[a-z]{2,9}){0,2}",
            c in "q[a-z]{2,9}( q[a-z]{2,9}){0,1}",
        ) {
            let r = Reconciler::default();
            prop_assert!((r.score_fields(&t, &c, &t, &c) - 1.0).abs() < 1e-12);
        }

        #[test]
        fn prop_combine_is_monotonic(
            t1 in 0.0f64..=1.0,
            t2 in 0.0f64..=1.0,
            c in 0.0f64..=1.0,
        ) {
            let r = Reconciler::default();
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            prop_assert!(r.combine(lo, c) <= r.combine(hi, c));
            prop_assert!(r.combine(c, lo) <= r.combine(c, hi));
        }
    }
}
