//! Raw channels to notaries.
//!
//! A notary is reached either directly on one of its TLS ports, or *bounced*:
//! another notary relays the connection to port 4242 of the target notary, so
//! that the notary being consulted does not learn the client address. Both
//! kinds of routes may additionally go through a forward HTTP proxy.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use notary_config::{Destination, NotaryConf};
use proxy_http::HttpProxyStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::ChannelError;
use crate::error::ErrorChain;

pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite {}

pub type ErasedStream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// Bounds on the time spent in each phase of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Covers dialing and every `CONNECT` hop of one route.
    pub connect: Duration,
    pub handshake: Duration,
    /// Covers sending the request and reading the whole response.
    pub exchange: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            handshake: Duration::from_secs(10),
            exchange: Duration::from_secs(30),
        }
    }
}

/// Opens raw byte streams.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self, destination: &Destination) -> io::Result<ErasedStream>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn dial(&self, destination: &Destination) -> io::Result<ErasedStream> {
        let stream = TcpStream::connect((destination.host.as_str(), destination.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// How to reach a notary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPlan {
    Direct {
        destinations: Vec<Destination>,
        proxy: Option<Destination>,
    },
    Bounced {
        /// Plaintext ports of the bounce notary.
        relays: Vec<Destination>,
        /// Bounce ports of the notary being consulted.
        targets: Vec<Destination>,
        proxy: Option<Destination>,
    },
}

impl ChannelPlan {
    pub fn new(conf: &NotaryConf, bounce: Option<&NotaryConf>) -> Result<Self, ChannelError> {
        ensure_endpoints(conf)?;

        let plan = if let Some(bounce) = bounce {
            ensure_endpoints(bounce)?;

            ChannelPlan::Bounced {
                relays: bounce.http_destinations(),
                targets: conf.bounced_destinations(),
                proxy: conf.http_proxy().cloned(),
            }
        } else {
            ChannelPlan::Direct {
                destinations: conf.ssl_destinations(),
                proxy: conf.ssl_proxy().cloned(),
            }
        };

        Ok(plan)
    }

    /// Lists the routes to try, in order.
    pub fn routes(&self) -> Vec<Route> {
        match self {
            ChannelPlan::Direct { destinations, proxy } => destinations
                .iter()
                .map(|destination| Route::through(proxy.as_ref(), destination, &[]))
                .collect(),
            ChannelPlan::Bounced { relays, targets, proxy } => relays
                .iter()
                .flat_map(|relay| targets.iter().map(move |target| (relay, target)))
                .map(|(relay, target)| Route::through(proxy.as_ref(), relay, &[target]))
                .collect(),
        }
    }
}

fn ensure_endpoints(conf: &NotaryConf) -> Result<(), ChannelError> {
    if conf.physical_notaries.is_empty() {
        Err(ChannelError::NoEndpoints {
            notary: conf.name.clone(),
        })
    } else {
        Ok(())
    }
}

/// A sequence of hops: the first one is dialed, each following one is reached
/// with a `CONNECT` request sent through the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    first: Destination,
    tunnels: Vec<Destination>,
}

impl Route {
    fn through(proxy: Option<&Destination>, entry: &Destination, rest: &[&Destination]) -> Self {
        let mut tunnels: Vec<Destination> = rest.iter().map(|hop| (*hop).clone()).collect();

        match proxy {
            Some(proxy) => {
                tunnels.insert(0, entry.clone());
                Self {
                    first: proxy.clone(),
                    tunnels,
                }
            }
            None => Self {
                first: entry.clone(),
                tunnels,
            },
        }
    }

    pub fn hops(&self) -> impl Iterator<Item = &Destination> {
        std::iter::once(&self.first).chain(&self.tunnels)
    }

    /// The final hop, where the TLS session is addressed.
    pub fn target(&self) -> &Destination {
        self.tunnels.last().unwrap_or(&self.first)
    }

    async fn open(&self, connector: &dyn Connector) -> Result<ErasedStream, ChannelError> {
        let mut stream = connector
            .dial(&self.first)
            .await
            .map_err(|source| ChannelError::Dial {
                destination: self.first.clone(),
                source,
            })?;

        let mut relay = &self.first;

        for hop in &self.tunnels {
            let tunnel = HttpProxyStream::connect(stream, &hop.host, hop.port)
                .await
                .map_err(|source| ChannelError::Tunnel {
                    relay: relay.clone(),
                    target: hop.clone(),
                    source,
                })?;

            stream = Box::new(tunnel);
            relay = hop;
        }

        Ok(stream)
    }
}

/// A raw stream reaching a notary, not yet authenticated.
pub struct DialedStream {
    pub stream: ErasedStream,
    /// Host of the notary endpoint at the end of the route.
    pub server_host: String,
}

impl std::fmt::Debug for DialedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialedStream")
            .field("server_host", &self.server_host)
            .finish_non_exhaustive()
    }
}

/// Tries every route of the plan in order and returns the first stream that opens.
pub async fn establish_channel(
    plan: &ChannelPlan,
    connector: &dyn Connector,
    connect_timeout: Duration,
) -> Result<DialedStream, ChannelError> {
    let mut last_error = None;

    for route in plan.routes() {
        let target = route.target();

        match tokio::time::timeout(connect_timeout, route.open(connector)).await {
            Ok(Ok(stream)) => {
                debug!(%target, hops = route.hops().count(), "Channel opened");

                return Ok(DialedStream {
                    stream,
                    server_host: target.host.clone(),
                });
            }
            Ok(Err(error)) => {
                warn!(%target, error = %ErrorChain(&error), "Route failed");
                last_error = Some(error);
            }
            Err(_) => {
                warn!(%target, ?connect_timeout, "Route timed out");
                last_error = Some(ChannelError::Timeout {
                    operation: "connect",
                    timeout: connect_timeout,
                });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ChannelError::NoEndpoints {
        notary: String::new(),
    }))
}
