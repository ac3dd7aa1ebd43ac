//! Target-URL Validator (component J): SSRF-safe destination checking for
//! webhook endpoints, extending `utils/url_normalizer.rs`'s scheme-allowlist/
//! host-lowercasing base with DNS resolution and private-range rejection.

use crate::error::AppError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::net::lookup_host;
use url::Url;

/// Set to `true` only via [`UrlValidatorConfig::allow_insecure`] (the
/// `WEBHOOK_ALLOW_INSECURE` dev-only config flag). Never a default.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlValidatorConfig {
    pub allow_insecure: bool,
}

/// Validates a webhook `target_url`: HTTPS-only, no localhost/`.local`/
/// loopback hostnames, default port only, and every resolved address
/// outside the private/link-local/loopback ranges.
///
/// DNS failure at create time is tolerated (delivery will fail later); only
/// a *successful* resolution to a disallowed address rejects the URL.
pub async fn validate_target_url(raw: &str, config: UrlValidatorConfig) -> Result<(), AppError> {
    let url = Url::parse(raw).map_err(|_| AppError::invalid_url("malformed target_url"))?;

    if !config.allow_insecure && url.scheme() != "https" {
        return Err(AppError::invalid_url("target_url must use https"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| AppError::invalid_url("target_url must include a host"))?
        .to_ascii_lowercase();

    if !config.allow_insecure && is_disallowed_hostname(&host) {
        return Err(AppError::invalid_url("target_url host is not allowed"));
    }

    if !config.allow_insecure {
        if let Some(port) = url.port() {
            if port != 443 {
                return Err(AppError::invalid_url("target_url must use the default https port"));
            }
        }
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_disallowed_ip(ip) {
            return Err(AppError::invalid_url("target_url resolves to a disallowed address"));
        }
        return Ok(());
    }

    let lookup_target = format!("{host}:{}", url.port_or_known_default().unwrap_or(443));
    match lookup_host(&lookup_target).await {
        Ok(addrs) => {
            for addr in addrs {
                if is_disallowed_ip(addr.ip()) {
                    return Err(AppError::invalid_url("target_url resolves to a disallowed address"));
                }
            }
            Ok(())
        }
        Err(_) => {
            // DNS failure at create time is tolerated; delivery will fail later.
            tracing::debug!(host, "DNS resolution failed at validation time, deferring");
            Ok(())
        }
    }
}

fn is_disallowed_hostname(host: &str) -> bool {
    host == "localhost" || host.ends_with(".localhost") || host.ends_with(".local")
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_v4(v4),
        IpAddr::V6(v6) => is_disallowed_v6(v6),
    }
}

fn is_disallowed_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.octets()[0] == 0
}

fn is_disallowed_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_disallowed_v4(v4);
    }
    let segments = ip.segments();
    // fc00::/7 (unique local)
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // fe80::/10 (link-local)
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> UrlValidatorConfig {
        UrlValidatorConfig::default()
    }

    #[tokio::test]
    async fn rejects_non_https_scheme() {
        let err = validate_target_url("http://example.com/x", cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { code: "INVALID_URL", .. }));
    }

    #[tokio::test]
    async fn rejects_loopback_literal() {
        let err = validate_target_url("https://127.0.0.1/x", cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { code: "INVALID_URL", .. }));
    }

    #[tokio::test]
    async fn rejects_localhost_hostname() {
        let err = validate_target_url("https://localhost/x", cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { code: "INVALID_URL", .. }));
    }

    #[tokio::test]
    async fn rejects_dot_local_suffix() {
        let err = validate_target_url("https://printer.local/x", cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { code: "INVALID_URL", .. }));
    }

    #[tokio::test]
    async fn rejects_non_default_port() {
        let err = validate_target_url("https://example.com:8080/x", cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { code: "INVALID_URL", .. }));
    }

    #[tokio::test]
    async fn rejects_private_ip_literal() {
        let err = validate_target_url("https://10.0.0.1/x", cfg()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { code: "INVALID_URL", .. }));
    }

    #[tokio::test]
    async fn accepts_plain_https_host_with_default_port() {
        // example.com resolves at validation time in most test environments,
        // but a resolution failure is tolerated, not rejected.
        let result = validate_target_url("https://example.com/hook", cfg()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn dev_override_relaxes_scheme_check() {
        let result = validate_target_url(
            "http://localhost:3000/hook",
            UrlValidatorConfig { allow_insecure: true },
        )
        .await;
        assert!(result.is_ok());
    }
}
