use std::net::Ipv4Addr;
use url::Url;

/// Minimal domain hierarchy utilities
pub struct DomainUtils;

impl DomainUtils {
    /// Extract the host from a URL as found in message text. The scheme is
    /// optional; the result is lowercased with any `www.` prefix removed.
    pub fn domain_from_url(url: &str) -> String {
        let lower = url.trim().to_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            if let Ok(parsed) = Url::parse(&lower) {
                if let Some(host) = parsed.host_str() {
                    return Self::canonicalize_domain(host.trim_end_matches('.'));
                }
            }
        }

        let without_scheme = lower
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let host = without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(without_scheme);
        // Drop userinfo and port
        let host = host.rsplit('@').next().unwrap_or(host);
        let host = host.split(':').next().unwrap_or(host);

        Self::canonicalize_domain(host.trim_end_matches('.'))
    }

    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list(domain: &str, domain_list: &[String]) -> bool {
        let domain_lower = domain.to_lowercase();

        for pattern in domain_list {
            let pattern_lower = pattern.to_lowercase();

            // Exact match
            if domain_lower == pattern_lower {
                return true;
            }

            // Subdomain match (domain ends with .pattern)
            if domain_lower.ends_with(&format!(".{}", pattern_lower)) {
                return true;
            }
        }

        false
    }

    /// Canonicalize domain (remove www prefix)
    pub fn canonicalize_domain(domain: &str) -> String {
        let domain_lower = domain.to_lowercase();
        if let Some(stripped) = domain_lower.strip_prefix("www.") {
            stripped.to_string()
        } else {
            domain_lower
        }
    }

    pub fn is_ipv4_literal(host: &str) -> bool {
        host.parse::<Ipv4Addr>().is_ok()
    }

    /// Suffix of `domain` found in `suffixes` (entries written as `.tld`).
    pub fn matching_suffix<'a>(domain: &str, suffixes: &'a [String]) -> Option<&'a str> {
        let domain_lower = domain.to_lowercase();
        suffixes
            .iter()
            .find(|suffix| domain_lower.ends_with(suffix.as_str()))
            .map(|s| s.as_str())
    }
}
