//! Provider signature table: maps apply URLs onto ATS providers.
//!
//! Signatures are evaluated in order and the first match wins. Generic
//! subdomain patterns sit after the path-specific ones they overlap with
//! (`careers-{co}.icims.com` before `{co}.icims.com`, `jobs.ashbyhq.com`
//! before `{co}.ashbyhq.com`).
//!
//! Regional hosts (`boards.eu.greenhouse.io`, `jobs.eu.lever.co`) are left
//! unmatched: their postings live behind regional APIs the adapters do not
//! call.

use regex::Regex;

use crate::error::AppError;
use crate::models::{Provider, ProviderMatch};

/// One row of the signature table.
#[derive(Debug, Clone)]
pub struct ProviderSignature {
    pub provider: Provider,
    pattern: Regex,
    /// Expansion template for the company identifier, in `Captures::expand` syntax.
    company_template: &'static str,
}

impl ProviderSignature {
    pub fn new(
        provider: Provider,
        pattern: &str,
        company_template: &'static str,
    ) -> Result<Self, AppError> {
        let pattern = Regex::new(&format!("(?i){pattern}")).map_err(|e| {
            AppError::Config(format!("Invalid signature for {provider}: {e}"))
        })?;
        Ok(Self {
            provider,
            pattern,
            company_template,
        })
    }

    fn try_match(&self, url: &str) -> Option<ProviderMatch> {
        let caps = self.pattern.captures(url)?;
        let mut company = String::new();
        caps.expand(self.company_template, &mut company);
        if company.is_empty() {
            return None;
        }
        let job_identifier = caps
            .name("job")
            .map(|m| m.as_str().trim_end_matches('/').to_string())
            .filter(|j| !j.is_empty());
        Some(ProviderMatch {
            provider: self.provider,
            company_identifier: company,
            job_identifier,
        })
    }
}

/// Immutable, ordered table of provider signatures.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    signatures: Vec<ProviderSignature>,
}

const UUID: &str = r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}";

impl SignatureTable {
    pub fn new(signatures: Vec<ProviderSignature>) -> Self {
        Self { signatures }
    }

    /// The built-in table covering every provider syndic knows about.
    pub fn builtin() -> Result<Self, AppError> {
        use Provider::*;

        let rows: Vec<(Provider, String, &'static str)> = vec![
            (
                Greenhouse,
                r"^https?://(?:boards|job-boards)\.greenhouse\.io/embed/job_(?:app|board)\?for=(?P<company>[\w-]+)(?:&token=(?P<job>\d+))?".into(),
                "${company}",
            ),
            (
                Greenhouse,
                r"^https?://(?:boards|job-boards)\.greenhouse\.io/(?P<company>[\w-]+)/?(?:jobs/(?P<job>\d+))?".into(),
                "${company}",
            ),
            (
                Lever,
                format!(r"^https?://jobs\.lever\.co/(?P<company>[\w.-]+)/?(?P<job>{UUID})?"),
                "${company}",
            ),
            (
                Ashby,
                format!(r"^https?://jobs\.ashbyhq\.com/(?P<company>[\w.%-]+)/?(?P<job>{UUID})?"),
                "${company}",
            ),
            (
                SmartRecruiters,
                r"^https?://(?:jobs|careers)\.smartrecruiters\.com/(?P<company>[\w-]+)/?(?:(?P<job>\d+))?".into(),
                "${company}",
            ),
            (
                Workday,
                r"^https?://(?P<tenant>[\w-]+)\.(?P<pod>wd\d+)\.myworkdayjobs\.com/(?:[a-z]{2}-[a-z]{2}/)?(?P<site>[\w-]+)/?(?P<job>job/[^?#]+)?".into(),
                "${tenant}.${pod}/${site}",
            ),
            (
                Workday,
                r"^https?://(?P<pod>wd\d+)\.myworkdaysite\.com/(?:[a-z]{2}-[a-z]{2}/)?recruiting/(?P<tenant>[\w-]+)/(?P<site>[\w-]+)/?(?P<job>job/[^?#]+)?".into(),
                "${tenant}.${pod}/${site}",
            ),
            (
                Recruitee,
                r"^https?://(?P<company>[\w-]+)\.recruitee\.com(?:/o/(?P<job>[\w-]+))?".into(),
                "${company}",
            ),
            (
                Breezy,
                r"^https?://(?P<company>[\w-]+)\.breezy\.hr(?:/p/(?P<job>[\w-]+))?".into(),
                "${company}",
            ),
            (
                Icims,
                r"^https?://careers-(?P<company>[\w-]+)\.icims\.com(?:/jobs/(?P<job>\d+))?".into(),
                "${company}",
            ),
            (
                Icims,
                r"^https?://(?P<company>[\w-]+)\.icims\.com(?:/jobs/(?P<job>\d+))?".into(),
                "${company}",
            ),
            (
                Taleo,
                r"^https?://(?P<company>[\w-]+)\.taleo\.net(?:/[^?#]*)?(?:\?(?:[^#]*&)?job=(?P<job>[\w-]+))?".into(),
                "${company}",
            ),
            (
                BambooHr,
                r"^https?://(?P<company>[\w-]+)\.bamboohr\.com/(?:careers|jobs)(?:/(?:view\.php\?id=)?(?P<job>\d+))?".into(),
                "${company}",
            ),
            (
                Jobvite,
                r"^https?://jobs\.jobvite\.com/(?P<company>[\w-]+)(?:/job/(?P<job>\w+))?".into(),
                "${company}",
            ),
            (
                Comeet,
                r"^https?://(?:www\.)?comeet\.(?:com|co)/jobs/(?P<slug>[\w-]+)/(?P<uid>[0-9a-f]{2}\.[0-9a-f]{3})(?:/[\w%-]+/(?P<job>[0-9a-f]{2}\.[0-9a-f]{3}))?".into(),
                "${slug}/${uid}",
            ),
            // Custom Ashby subdomains; must stay after jobs.ashbyhq.com.
            (
                Ashby,
                format!(r"^https?://(?P<company>[\w-]+)\.ashbyhq\.com/?(?P<job>{UUID})?"),
                "${company}",
            ),
        ];

        let signatures = rows
            .into_iter()
            .map(|(provider, pattern, template)| ProviderSignature::new(provider, &pattern, template))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(signatures))
    }

    /// Match an apply URL against the table. Pure string matching, never
    /// touches the network; unmatched URLs yield `None`.
    pub fn identify(&self, apply_url: &str) -> Option<ProviderMatch> {
        let url = apply_url.trim();
        self.signatures.iter().find_map(|sig| sig.try_match(url))
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> SignatureTable {
        SignatureTable::builtin().unwrap()
    }

    fn identify(url: &str) -> Option<(Provider, String, Option<String>)> {
        table()
            .identify(url)
            .map(|m| (m.provider, m.company_identifier, m.job_identifier))
    }

    #[test]
    fn test_greenhouse_board_and_job() {
        assert_eq!(
            identify("https://boards.greenhouse.io/acme/jobs/123"),
            Some((Provider::Greenhouse, "acme".into(), Some("123".into())))
        );
        assert_eq!(
            identify("https://job-boards.greenhouse.io/acme"),
            Some((Provider::Greenhouse, "acme".into(), None))
        );
    }

    #[test]
    fn test_greenhouse_embed_before_board() {
        assert_eq!(
            identify("https://boards.greenhouse.io/embed/job_app?for=acme&token=4567"),
            Some((Provider::Greenhouse, "acme".into(), Some("4567".into())))
        );
    }

    #[test]
    fn test_lever_and_ashby() {
        let id = "0c6b1a9e-4f1d-4a55-9a6b-2f9a3c1d7e88";
        assert_eq!(
            identify(&format!("https://jobs.lever.co/acme/{id}/apply")),
            Some((Provider::Lever, "acme".into(), Some(id.into())))
        );
        assert_eq!(
            identify(&format!("https://jobs.ashbyhq.com/acme/{id}")),
            Some((Provider::Ashby, "acme".into(), Some(id.into())))
        );
    }

    #[test]
    fn test_regional_hosts_are_not_claimed() {
        let id = "0c6b1a9e-4f1d-4a55-9a6b-2f9a3c1d7e88";
        assert!(identify(&format!("https://jobs.eu.lever.co/acme/{id}")).is_none());
        assert!(identify("https://boards.eu.greenhouse.io/acme/jobs/123").is_none());
        assert!(identify("https://job-boards.eu.greenhouse.io/acme").is_none());
    }

    #[test]
    fn test_comeet_company_and_position() {
        assert_eq!(
            identify("https://www.comeet.com/jobs/acme/E5.00A/backend-engineer/3C.B12"),
            Some((Provider::Comeet, "acme/E5.00A".into(), Some("3C.B12".into())))
        );
        assert_eq!(
            identify("https://www.comeet.com/jobs/acme/E5.00A"),
            Some((Provider::Comeet, "acme/E5.00A".into(), None))
        );
        assert!(identify("https://www.comeet.com/jobs/acme").is_none());
    }

    #[test]
    fn test_workday_variants_share_identifier() {
        let direct = identify(
            "https://acme.wd5.myworkdayjobs.com/en-US/External/job/Remote-USA/Backend-Engineer_R123",
        );
        assert_eq!(
            direct,
            Some((
                Provider::Workday,
                "acme.wd5/External".into(),
                Some("job/Remote-USA/Backend-Engineer_R123".into())
            ))
        );
        let shared = identify("https://wd5.myworkdaysite.com/recruiting/acme/External");
        assert_eq!(
            shared,
            Some((Provider::Workday, "acme.wd5/External".into(), None))
        );
    }

    #[test]
    fn test_icims_careers_prefix_wins() {
        assert_eq!(
            identify("https://careers-acme.icims.com/jobs/9876/job"),
            Some((Provider::Icims, "acme".into(), Some("9876".into())))
        );
        assert_eq!(
            identify("https://uscareers-acme.icims.com/jobs/1/job"),
            Some((Provider::Icims, "uscareers-acme".into(), Some("1".into())))
        );
    }

    #[test]
    fn test_ashby_generic_subdomain_after_specific() {
        assert_eq!(
            identify("https://acme.ashbyhq.com/"),
            Some((Provider::Ashby, "acme".into(), None))
        );
        // jobs.ashbyhq.com never yields "jobs" as a company
        assert_eq!(
            identify("https://jobs.ashbyhq.com/acme").map(|(_, c, _)| c),
            Some("acme".into())
        );
    }

    #[test]
    fn test_misc_providers() {
        assert_eq!(
            identify("https://acme.taleo.net/careersection/2/jobdetail.ftl?job=12345&lang=en"),
            Some((Provider::Taleo, "acme".into(), Some("12345".into())))
        );
        assert_eq!(
            identify("https://acme.bamboohr.com/careers/42"),
            Some((Provider::BambooHr, "acme".into(), Some("42".into())))
        );
        assert_eq!(
            identify("https://jobs.jobvite.com/acme/job/oAbC123"),
            Some((Provider::Jobvite, "acme".into(), Some("oAbC123".into())))
        );
        assert_eq!(
            identify("https://acme.recruitee.com/o/backend-engineer"),
            Some((Provider::Recruitee, "acme".into(), Some("backend-engineer".into())))
        );
        assert_eq!(
            identify("https://acme.breezy.hr/p/abc123-backend-engineer"),
            Some((Provider::Breezy, "acme".into(), Some("abc123-backend-engineer".into())))
        );
        assert_eq!(
            identify("https://jobs.smartrecruiters.com/Acme/743999"),
            Some((Provider::SmartRecruiters, "Acme".into(), Some("743999".into())))
        );
    }

    #[test]
    fn test_unmatched_urls() {
        assert!(identify("https://acme.com/careers/backend").is_none());
        assert!(identify("https://www.linkedin.com/jobs/view/123").is_none());
        assert!(identify("").is_none());
        assert!(identify("not a url").is_none());
        assert!(identify("https://jobs.lever.co/").is_none());
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            identify("HTTPS://BOARDS.GREENHOUSE.IO/acme/jobs/1").map(|(p, _, _)| p),
            Some(Provider::Greenhouse)
        );
    }

    proptest! {
        #[test]
        fn prop_greenhouse_slugs_identified(slug in "[a-z][a-z0-9]{1,20}", job in 1u64..10_000_000) {
            let url = format!("https://boards.greenhouse.io/{slug}/jobs/{job}");
            let m = table().identify(&url).unwrap();
            prop_assert_eq!(m.provider, Provider::Greenhouse);
            prop_assert_eq!(m.company_identifier, slug);
            prop_assert_eq!(m.job_identifier, Some(job.to_string()));
        }

        #[test]
        fn prop_identify_is_total_and_idempotent(url in ".{0,120}") {
            let t = table();
            let first = t.identify(&url);
            if let Some(m) = &first {
                prop_assert!(!m.company_identifier.is_empty());
            }
            prop_assert_eq!(first, t.identify(&url));
        }
    }
}
