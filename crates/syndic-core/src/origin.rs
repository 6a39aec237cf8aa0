use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::capture::PlatformProfile;
use crate::models::{JobCandidate, Origin, RawExchange};
use crate::signatures::SignatureTable;

const MAX_REDIRECT_HOPS: usize = 10;

/// Redirects observed during the session, keyed by request URL.
#[derive(Debug, Clone, Default)]
pub struct RedirectLog {
    hops: HashMap<String, String>,
}

impl RedirectLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the hop if `exchange` is a redirect. Relative `Location`
    /// values are resolved against the request URL.
    pub fn record(&mut self, exchange: &RawExchange) -> bool {
        if !(300..400).contains(&exchange.status) {
            return false;
        }
        let Some(location) = exchange.redirect_location.as_deref() else {
            return false;
        };
        let Some(target) = Url::parse(&exchange.url)
            .and_then(|base| base.join(location))
            .ok()
        else {
            return false;
        };
        self.hops.insert(exchange.url.clone(), target.into());
        true
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.hops.insert(from.into(), to.into());
    }

    pub fn next(&self, url: &str) -> Option<&str> {
        self.hops.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Tags each candidate as ATS-sourced, platform-native or unknown.
#[derive(Debug, Clone)]
pub struct OriginClassifier {
    signatures: Arc<SignatureTable>,
    profile: Arc<PlatformProfile>,
}

impl OriginClassifier {
    pub fn new(signatures: Arc<SignatureTable>, profile: Arc<PlatformProfile>) -> Self {
        Self {
            signatures,
            profile,
        }
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// Total over all candidates: exactly one tag, never an error.
    pub fn classify(&self, candidate: &JobCandidate) -> Origin {
        self.classify_with(candidate, &RedirectLog::default())
    }

    /// Like [`classify`](Self::classify), following platform redirect links
    /// through their query string and through hops seen in `redirects`.
    /// The first URL on the chain that names a provider wins.
    pub fn classify_with(&self, candidate: &JobCandidate, redirects: &RedirectLog) -> Origin {
        if candidate.easy_apply {
            return Origin::PlatformNative;
        }
        let Some(apply_url) = apply_url(candidate) else {
            return Origin::PlatformNative;
        };

        let chain = self.redirect_chain(apply_url, redirects);
        if let Some(m) = chain.iter().find_map(|url| self.signatures.identify(url)) {
            return Origin::AtsSourced(m);
        }
        match chain.last() {
            Some(last) if self.profile.is_native_url(last) && !self.profile.is_redirector(last) => {
                Origin::PlatformNative
            }
            _ => Origin::Unknown,
        }
    }

    /// True while the apply link is a platform redirector whose destination
    /// has not been seen yet.
    pub fn awaits_redirect(&self, candidate: &JobCandidate, redirects: &RedirectLog) -> bool {
        if candidate.easy_apply {
            return false;
        }
        apply_url(candidate).is_some_and(|url| {
            self.redirect_chain(url, redirects)
                .last()
                .is_some_and(|last| self.profile.is_redirector(last))
        })
    }

    /// `apply_url` followed by every redirect target that can be resolved.
    pub fn redirect_chain(&self, apply_url: &str, redirects: &RedirectLog) -> Vec<String> {
        let mut chain = vec![apply_url.to_string()];
        while chain.len() <= MAX_REDIRECT_HOPS {
            let Some(current) = chain.last() else {
                break;
            };
            let next = self
                .profile
                .unwrap_redirect(current)
                .or_else(|| redirects.next(current).map(str::to_string));
            match next {
                Some(url) if !chain.contains(&url) => chain.push(url),
                _ => break,
            }
        }
        chain
    }
}

fn apply_url(candidate: &JobCandidate) -> Option<&str> {
    candidate
        .apply_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
}
