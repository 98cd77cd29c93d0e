//! HTTP health checks.

use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::debug;

use crate::error::ProbeError;
use crate::{Check, Probes};

/// Edge proxies classify non-browser clients as bots; present as Safari.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

const BODY_SNIFF_BYTES: usize = 256;

/// Name a failed response. Cloudflare error pages come back as ordinary
/// 4xx/5xx responses with the error code in the body.
pub fn classify_failure(status: u16, body: &str) -> String {
    let low = body.to_lowercase();
    if low.contains("error code: 1014") || (low.contains("1014") && low.contains("cloudflare")) {
        return "Cloudflare 1014 (hostname is not bound to the tunnel, or the CNAME points at another account)".into();
    }
    if low.contains("error code: 1010") || (low.contains("1010") && low.contains("cloudflare")) {
        return "Cloudflare 1010 (blocked by WAF/bot rules; allow this hostname in Cloudflare security settings)".into();
    }
    format!("HTTP {status}")
}

impl Probes {
    /// GET `url`; healthy iff the response status is exactly 200.
    pub async fn http_health(&self, url: &str, timeout: Duration) -> Check {
        let response = self
            .http()
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "application/json,text/plain,*/*")
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 200 => Check::pass("200 OK"),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.bytes().await.unwrap_or_default();
                let sniff = String::from_utf8_lossy(&body[..body.len().min(BODY_SNIFF_BYTES)]);
                debug!(url, status, "health check non-200");
                Check::fail(classify_failure(status, &sniff))
            }
            Err(e) => {
                debug!(url, error = %e, "health check failed");
                if e.is_timeout() {
                    return Check::fail(opsdeck_core::humanize_error("timed out"));
                }
                Check::from_error(&ProbeError::Http(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloudflare_codes_are_named() {
        assert!(classify_failure(530, "error code: 1014").starts_with("Cloudflare 1014"));
        assert!(classify_failure(403, "<title>Cloudflare</title> ... 1010").starts_with("Cloudflare 1010"));
        assert_eq!(classify_failure(502, "Bad gateway"), "HTTP 502");
    }

    fn local_probes() -> Probes {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Probes::with_http_client(
            opsdeck_core::Layout::new("/tmp"),
            std::sync::Arc::new(crate::scripted::ScriptedRunner::new()),
            client,
        )
    }

    #[tokio::test]
    async fn local_health_endpoint() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 403 Forbidden\r\ncontent-length: 16\r\nconnection: close\r\n\r\nerror code: 1014")
                .await;
        });

        let probes = local_probes();
        let check = probes
            .http_health(&format!("http://{addr}/health"), Duration::from_secs(2))
            .await;
        assert!(!check.ok);
        assert!(check.message.starts_with("Cloudflare 1014"));
    }

    #[tokio::test]
    async fn refused_connection_is_humanized() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let probes = local_probes();
        let check = probes
            .http_health(&format!("http://127.0.0.1:{port}/health"), Duration::from_secs(2))
            .await;
        assert!(!check.ok);
        assert!(!check.message.is_empty());
    }
}
