//! Block detection: login walls, checkpoints, captchas and rate limiting.
//!
//! Every exchange is inspected, whatever the capture classifier made of it.

use chrono::Utc;
use regex::Regex;
use url::Url;

use crate::error::AppError;
use crate::models::{BlockReason, BlockState, RawExchange};

/// Status code LinkedIn answers with when it refuses automated traffic.
const STATUS_REQUEST_DENIED: u16 = 999;

#[derive(Debug, Clone)]
pub struct BlockDetector {
    /// Checked against `host + path` of the request URL and redirect target.
    url_patterns: Vec<(Regex, BlockReason)>,
    body_markers: Vec<(String, BlockReason)>,
}

impl BlockDetector {
    pub fn new(
        url_patterns: &[(&str, BlockReason)],
        body_markers: &[(&str, BlockReason)],
    ) -> Result<Self, AppError> {
        let url_patterns = url_patterns
            .iter()
            .map(|(p, reason)| {
                Regex::new(&format!("(?i){p}"))
                    .map(|re| (re, *reason))
                    .map_err(|e| AppError::Config(format!("Invalid block pattern {p}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let body_markers = body_markers
            .iter()
            .map(|(m, reason)| (m.to_ascii_lowercase(), *reason))
            .collect();
        Ok(Self {
            url_patterns,
            body_markers,
        })
    }

    pub fn linkedin() -> Result<Self, AppError> {
        // LinkedIn host (any subdomain) or a relative redirect target, then
        // whole path segments only: job slugs like `/jobs/view/login-...`
        // must not trip these.
        let on_linkedin = r"^(?:(?:[a-z0-9-]+\.)*linkedin\.com)?";
        let checkpoint = format!(r"{on_linkedin}/(?:checkpoint|security-check)(?:/|$)");
        let captcha = format!(
            r"^challenge\.linkedin\.com(?:/|$)|{on_linkedin}/(?:challenge|captcha|security-verification)(?:/|$)"
        );
        let authwall = format!(r"{on_linkedin}/(?:authwall|auth-wall)(?:/|$)");
        let login = format!(r"{on_linkedin}/(?:uas/)?(?:login|signin|sign-in)(?:/|$)");
        Self::new(
            &[
                (checkpoint.as_str(), BlockReason::Checkpoint),
                (captcha.as_str(), BlockReason::Captcha),
                (authwall.as_str(), BlockReason::AuthWall),
                (login.as_str(), BlockReason::LoginRequired),
            ],
            &[
                ("g-recaptcha", BlockReason::Captcha),
                ("h-captcha", BlockReason::Captcha),
                ("cf-challenge", BlockReason::Captcha),
                ("captcha-internal", BlockReason::Captcha),
                ("/checkpoint/challenge", BlockReason::Checkpoint),
                ("name=\"challengeid\"", BlockReason::Checkpoint),
                ("authwall-join-form", BlockReason::AuthWall),
            ],
        )
    }

    /// Inspect one exchange; `exchange_index` is its position in the session.
    pub fn inspect(&self, exchange: &RawExchange, exchange_index: u64) -> Option<BlockState> {
        let reason = self.reason_for(exchange)?;
        Some(BlockState {
            reason,
            url: exchange.url.clone(),
            exchange_index,
            detected_at: Utc::now(),
        })
    }

    fn reason_for(&self, exchange: &RawExchange) -> Option<BlockReason> {
        match exchange.status {
            429 | STATUS_REQUEST_DENIED => return Some(BlockReason::RateLimited),
            401 | 403 => return Some(BlockReason::LoginRequired),
            _ => {}
        }

        let targets = std::iter::once(exchange.url.as_str()).chain(exchange.redirect_location.as_deref());
        for target in targets {
            let key = host_and_path(target);
            if let Some((_, reason)) = self.url_patterns.iter().find(|(re, _)| re.is_match(&key)) {
                return Some(*reason);
            }
        }

        if exchange.body.is_empty() {
            return None;
        }
        let body = exchange.body.to_ascii_lowercase();
        self.body_markers
            .iter()
            .find(|(marker, _)| body.contains(marker.as_str()))
            .map(|(_, reason)| *reason)
    }
}

/// `host/path` of a URL; relative redirect targets are returned as-is.
fn host_and_path(target: &str) -> String {
    match Url::parse(target) {
        Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        Err(_) => target.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> BlockDetector {
        BlockDetector::linkedin().unwrap()
    }

    fn reason(exchange: RawExchange) -> Option<BlockReason> {
        detector().inspect(&exchange, 7).map(|s| {
            assert_eq!(s.exchange_index, 7);
            s.reason
        })
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            reason(RawExchange::new("https://www.linkedin.com/voyager/api/x", 429, "")),
            Some(BlockReason::RateLimited)
        );
        assert_eq!(
            reason(RawExchange::new("https://www.linkedin.com/voyager/api/x", 999, "")),
            Some(BlockReason::RateLimited)
        );
        assert_eq!(
            reason(RawExchange::new("https://www.linkedin.com/voyager/api/x", 401, "")),
            Some(BlockReason::LoginRequired)
        );
        assert_eq!(
            reason(RawExchange::new("https://www.linkedin.com/voyager/api/x", 404, "")),
            None
        );
    }

    #[test]
    fn test_redirect_targets() {
        let ex = RawExchange::new("https://www.linkedin.com/jobs/search", 302, "")
            .with_redirect("https://www.linkedin.com/authwall?trk=1");
        assert_eq!(reason(ex), Some(BlockReason::AuthWall));

        let ex = RawExchange::new("https://www.linkedin.com/jobs/search", 302, "")
            .with_redirect("/uas/login?session_redirect=x");
        assert_eq!(reason(ex), Some(BlockReason::LoginRequired));

        let ex = RawExchange::new("https://www.linkedin.com/checkpoint/lg/login-submit", 200, "");
        assert_eq!(reason(ex), Some(BlockReason::Checkpoint));
    }

    #[test]
    fn test_challenge_host() {
        let ex = RawExchange::new("https://challenge.linkedin.com/frame", 200, "");
        assert_eq!(reason(ex), Some(BlockReason::Captcha));
    }

    #[test]
    fn test_body_markers() {
        let ex = RawExchange::new(
            "https://www.linkedin.com/voyager/api/jobs/search",
            200,
            r#"<div class="g-recaptcha" data-sitekey="x"></div>"#,
        );
        assert_eq!(reason(ex), Some(BlockReason::Captcha));
    }

    #[test]
    fn test_job_slugs_do_not_trigger() {
        for slug in [
            "login-experience-engineer-at-acme-3912345678",
            "captcha-platform-engineer-at-acme-3912345679",
            "challenge-lead-at-globex-3912345680",
            "security-check-analyst-at-initech-3912345681",
            "authwall-engineer-at-hooli-3912345682",
        ] {
            let ex = RawExchange::new(format!("https://www.linkedin.com/jobs/view/{slug}"), 200, "{}");
            assert_eq!(reason(ex), None, "{slug}");
        }
    }

    #[test]
    fn test_login_paths_off_platform_do_not_trigger() {
        let ex = RawExchange::new("https://www.linkedin.com/jobs/view/1", 302, "")
            .with_redirect("https://boards.greenhouse.io/login");
        assert_eq!(reason(ex), None);
    }

    #[test]
    fn test_login_paths_on_platform_subdomains() {
        let ex = RawExchange::new("https://de.linkedin.com/login/", 200, "");
        assert_eq!(reason(ex), Some(BlockReason::LoginRequired));
        let ex = RawExchange::new("https://www.linkedin.com/signin", 200, "");
        assert_eq!(reason(ex), Some(BlockReason::LoginRequired));
    }

    #[test]
    fn test_query_strings_do_not_trigger() {
        let ex = RawExchange::new(
            "https://www.linkedin.com/jobs/view/1?trk=login_redirect",
            200,
            r#"{"title": "Login systems engineer"}"#,
        );
        assert_eq!(reason(ex), None);
    }
}
