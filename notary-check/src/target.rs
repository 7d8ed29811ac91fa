use std::time::Duration;

use anyhow::Context as _;
use notary_client::Target;
use notary_config::Destination;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

const DEFAULT_PORT: u16 = 443;

/// Parses `HOST[:PORT]`, the port defaulting to 443.
pub fn parse_destination(value: &str) -> anyhow::Result<Destination> {
    match value.parse::<Destination>() {
        Ok(destination) => Ok(destination),
        Err(_) if !value.contains(':') && !value.is_empty() => Ok(Destination::new(value, DEFAULT_PORT)),
        Err(e) => Err(anyhow::Error::new(e).context("invalid destination")),
    }
}

/// Connects to `destination` and records the certificate it presents.
#[instrument(skip(timeout))]
pub async fn fetch_target(destination: &Destination, timeout: Duration) -> anyhow::Result<Target> {
    let tcp = tokio::time::timeout(
        timeout,
        TcpStream::connect((destination.host.as_str(), destination.port)),
    )
    .await
    .context("connection timed out")?
    .with_context(|| format!("failed to connect to {destination}"))?;

    let ip = tcp.peer_addr().context("peer address")?.ip();

    let server_name = rustls::pki_types::ServerName::try_from(destination.host.clone())
        .with_context(|| format!("invalid server name {}", destination.host))?;

    let config = notary_client::tls::client_config().context("TLS configuration")?;

    let tls = tokio::time::timeout(timeout, TlsConnector::from(config).connect(server_name, tcp))
        .await
        .context("TLS handshake timed out")?
        .context("TLS handshake failed")?;

    let (_, session) = tls.get_ref();
    let end_entity = session
        .peer_certificates()
        .and_then(|certificates| certificates.first())
        .context("server presented no certificate")?;

    let target = Target::from_certificate(destination.host.clone(), destination.port, ip, end_entity.as_ref());

    info!(%ip, fingerprint = %target.fingerprint, "Fetched target certificate");

    Ok(target)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("www.example.com", "www.example.com", 443)]
    #[case("www.example.com:8443", "www.example.com", 8443)]
    #[case("192.0.2.1", "192.0.2.1", 443)]
    #[case("[2001:db8::1]:443", "2001:db8::1", 443)]
    fn destinations(#[case] value: &str, #[case] host: &str, #[case] port: u16) {
        assert_eq!(parse_destination(value).unwrap(), Destination::new(host, port));
    }

    #[rstest]
    #[case("")]
    #[case("www.example.com:https")]
    fn invalid_destinations(#[case] value: &str) {
        assert!(parse_destination(value).is_err());
    }
}
