//! Site identity - registrable-domain level matching for URIs
//!
//! A site is the unit every privacy predicate is scoped to:
//! - web: `<scheme>://<eTLD+1>` (`https://a.b.example.test/x` -> `https://example.test`)
//! - app: `<scheme>://<host>` (`android-app://com.example/path` -> `android-app://com.example`)
//!
//! Matching is string equality on sites, never prefix or suffix matching on
//! raw hosts, so `prefix-publisher.test` and `publisher.test` are distinct
//! sites and `http` never matches `https`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::{Host, Url};

/// Scheme used by app publishers and app destinations
pub const APP_SCHEME: &str = "android-app";

/// Which surface a URI belongs to.
///
/// The numeric encoding is the one persisted in `publisher_type` and
/// `destination_type` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceType {
    App,
    Web,
}

impl SurfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceType::App => "app",
            SurfaceType::Web => "web",
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            SurfaceType::App => 0,
            SurfaceType::Web => 1,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(SurfaceType::App),
            1 => Ok(SurfaceType::Web),
            _ => Err(Error::Validation(format!("Unknown surface type: {}", value))),
        }
    }

    /// App URIs are recognised by their scheme; everything else is web.
    pub fn infer(uri: &Url) -> Self {
        if uri.scheme() == APP_SCHEME {
            SurfaceType::App
        } else {
            SurfaceType::Web
        }
    }
}

impl FromStr for SurfaceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "app" | "os" => Ok(SurfaceType::App),
            "web" => Ok(SurfaceType::Web),
            _ => Err(Error::Validation(format!("Unknown surface type: {}", s))),
        }
    }
}

impl fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registrable-domain identity of a URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Site(String);

impl Site {
    /// Resolve the site of `uri` on the given surface
    pub fn of(uri: &Url, surface: SurfaceType) -> Result<Self> {
        let host = uri
            .host()
            .ok_or_else(|| Error::InvalidUri(format!("URI has no host: {}", uri)))?;

        let authority = match (surface, host) {
            (SurfaceType::Web, Host::Domain(domain)) => registrable_domain(domain),
            (_, Host::Domain(domain)) => domain.to_string(),
            (_, Host::Ipv4(addr)) => addr.to_string(),
            (_, Host::Ipv6(addr)) => format!("[{}]", addr),
        };

        Ok(Self(format!("{}://{}", uri.scheme(), authority)))
    }

    /// Parse a URI string and resolve its site
    pub fn parse(uri: &str, surface: SurfaceType) -> Result<Self> {
        Self::of(&parse_uri(uri)?, surface)
    }

    /// Rebuild a site read back from a site-valued column
    pub(crate) fn from_stored(site: String) -> Self {
        Self(site)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True iff `candidate` resolves to exactly this site
    pub fn contains(&self, candidate: &Url, surface: SurfaceType) -> bool {
        Site::of(candidate, surface).is_ok_and(|site| site == *self)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Site {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// Site of `uri` on the given surface
pub fn site_of(uri: &Url, surface: SurfaceType) -> Result<Site> {
    Site::of(uri, surface)
}

/// Whether `candidate` belongs to `registered` on the given surface
pub fn matches_site(candidate: &Url, registered: &Site, surface: SurfaceType) -> bool {
    registered.contains(candidate, surface)
}

/// Parse a URI and require an authority.
///
/// Everything stored by the datastore is host-addressed, so URIs without a
/// host are rejected here rather than failing later at match time.
pub fn parse_uri(uri: &str) -> Result<Url> {
    let parsed = Url::parse(uri)?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(Error::InvalidUri(format!("URI has no host: {}", uri))),
    }
}

/// `<scheme>://<host>[:<port>]` of a URI
pub fn origin_of(uri: &Url) -> Result<String> {
    let host = uri
        .host_str()
        .ok_or_else(|| Error::InvalidUri(format!("URI has no host: {}", uri)))?;
    Ok(match uri.port() {
        Some(port) => format!("{}://{}:{}", uri.scheme(), host, port),
        None => format!("{}://{}", uri.scheme(), host),
    })
}

/// eTLD+1 of a DNS host.
///
/// Hosts that are themselves a public suffix (or a single label) have no
/// registrable domain; they fall back to the last two labels, or the host
/// itself.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.');
    if let Some(domain) = psl::domain_str(host) {
        return domain.to_string();
    }

    let labels: Vec<&str> = host.rsplitn(3, '.').collect();
    match labels.as_slice() {
        [tld, sld, ..] => format!("{}.{}", sld, tld),
        _ => host.to_string(),
    }
}

/// Domain-suffix match used by deletion filters: same scheme, and the
/// candidate host equals the filter host or is a subdomain of it.
pub fn matches_domain(candidate: &Url, domain: &Url) -> bool {
    if candidate.scheme() != domain.scheme() {
        return false;
    }
    match (candidate.host_str(), domain.host_str()) {
        (Some(host), Some(filter)) => {
            host == filter
                || host
                    .strip_suffix(filter)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        parse_uri(s).unwrap()
    }

    #[test]
    fn test_web_site_is_etld_plus_one() {
        let site = site_of(&url("https://a.b.example.test/path?q=1"), SurfaceType::Web).unwrap();
        assert_eq!(site.as_str(), "https://example.test");

        let site = site_of(&url("https://shop.example.co.uk"), SurfaceType::Web).unwrap();
        assert_eq!(site.as_str(), "https://example.co.uk");
    }

    #[test]
    fn test_subdomains_share_a_site() {
        let registered = Site::parse("https://example.test", SurfaceType::Web).unwrap();
        assert!(matches_site(&url("https://sub.example.test"), &registered, SurfaceType::Web));
        assert!(matches_site(&url("https://example.test/landing"), &registered, SurfaceType::Web));
    }

    #[test]
    fn test_string_suffix_is_not_same_site() {
        let registered = Site::parse("https://publisher.test", SurfaceType::Web).unwrap();
        assert!(!matches_site(&url("https://prefix-publisher.test"), &registered, SurfaceType::Web));
    }

    #[test]
    fn test_scheme_must_match() {
        let registered = Site::parse("https://example.test", SurfaceType::Web).unwrap();
        assert!(!matches_site(&url("http://example.test"), &registered, SurfaceType::Web));
    }

    #[test]
    fn test_app_site_ignores_path() {
        let registered = Site::parse("android-app://com.example.app", SurfaceType::App).unwrap();
        assert!(matches_site(&url("android-app://com.example.app/some/path"), &registered, SurfaceType::App));
        assert!(!matches_site(&url("android-app://com.example.other"), &registered, SurfaceType::App));
    }

    #[test]
    fn test_app_site_keeps_full_host() {
        let site = site_of(&url("android-app://com.example.app"), SurfaceType::App).unwrap();
        assert_eq!(site.as_str(), "android-app://com.example.app");
    }

    #[test]
    fn test_ip_hosts_are_their_own_site() {
        let site = site_of(&url("http://127.0.0.1:8080/x"), SurfaceType::Web).unwrap();
        assert_eq!(site.as_str(), "http://127.0.0.1");
    }

    #[test]
    fn test_hostless_uri_rejected() {
        assert!(matches!(parse_uri("mailto:someone"), Err(Error::InvalidUri(_))));
        assert!(parse_uri("not a uri").is_err());
    }

    #[test]
    fn test_origin_keeps_subdomain_and_port() {
        assert_eq!(origin_of(&url("https://ad.tech.test:4443/register")).unwrap(), "https://ad.tech.test:4443");
        assert_eq!(origin_of(&url("https://ad.tech.test/register")).unwrap(), "https://ad.tech.test");
    }

    #[test]
    fn test_domain_filter_matches_subdomains_only() {
        let filter = url("https://example.test");
        assert!(matches_domain(&url("https://example.test/a"), &filter));
        assert!(matches_domain(&url("https://www.example.test"), &filter));
        assert!(!matches_domain(&url("https://badexample.test"), &filter));
        assert!(!matches_domain(&url("http://www.example.test"), &filter));
    }

    #[test]
    fn test_surface_inference() {
        assert_eq!(SurfaceType::infer(&url("android-app://com.example")), SurfaceType::App);
        assert_eq!(SurfaceType::infer(&url("https://example.test")), SurfaceType::Web);
        assert_eq!("web".parse::<SurfaceType>().unwrap(), SurfaceType::Web);
    }
}
