use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;

/// Time to wait for the health endpoint before giving up.
const TIMEOUT: Duration = Duration::from_secs(5);

/// Asks the local workload server whether it is up.
///
/// Used as the container's health check, so it targets the loopback address
/// when the server binds all interfaces.
pub async fn healthcheck(config: Config) -> Result<()> {
    let url = format!("http://{}/health", check_addr(config.http_addr));
    tracing::debug!(%url, "checking workload server");

    let response = reqwest::Client::builder()
        .timeout(TIMEOUT)
        .build()?
        .get(&url)
        .send()
        .await
        .with_context(|| format!("no response from {url}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("unhealthy: {status}");
    }

    tracing::info!("OK");
    Ok(())
}

fn check_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port())
        }
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn checks_loopback_for_wildcard_binds() {
        assert_eq!(check_addr(addr("0.0.0.0:80")), addr("127.0.0.1:80"));
        assert_eq!(check_addr(addr("[::]:8080")), addr("[::1]:8080"));
        assert_eq!(check_addr(addr("10.0.0.7:80")), addr("10.0.0.7:80"));
    }
}
