use crate::transport::{AuthReply, SshNegotiator};
use crate::types::{ProbeOutcome, ProbeStatus, Target};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

/// Username sent with the `none` auth attempt. It should not exist anywhere.
pub const DEFAULT_USERNAME: &str = "cats_are_mythical";

/// Bounds applied to a single probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Limit for each of connect, handshake, auth query and close.
    pub timeout: Duration,
    pub username: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            username: DEFAULT_USERNAME.to_string(),
        }
    }
}

/// Check whether `target` runs an SSH server that would accept a password.
///
/// - Connects with `tokio::time::timeout`; a refused or silent port ends here.
/// - Hands the socket to `negotiator` for the handshake, then asks for `none`
///   authentication to learn the server's allowed methods.
/// - Never fails: every error becomes a negative `ProbeStatus`.
/// - The socket is owned by this call and is closed before it returns.
pub async fn probe(target: Target, cfg: &ProbeConfig, negotiator: &dyn SshNegotiator) -> ProbeOutcome {
    let status = match time::timeout(cfg.timeout, TcpStream::connect(target.socket_addr())).await {
        Ok(Ok(stream)) => classify(stream, cfg, negotiator).await,
        Ok(Err(e)) => {
            debug!(%target, error = %e, "connect failed");
            ProbeStatus::Unreachable
        }
        Err(_) => {
            debug!(%target, "connect timed out");
            ProbeStatus::Unreachable
        }
    };
    debug!(%target, %status, "probe finished");
    ProbeOutcome { target, status }
}

async fn classify(stream: TcpStream, cfg: &ProbeConfig, negotiator: &dyn SshNegotiator) -> ProbeStatus {
    let mut transport = match time::timeout(cfg.timeout, negotiator.open(stream, cfg.timeout)).await {
        Ok(Ok(t)) => t,
        Ok(Err(e)) => {
            debug!(error = %e, "handshake failed");
            return ProbeStatus::HandshakeFailed;
        }
        Err(_) => return ProbeStatus::HandshakeFailed,
    };

    let reply = time::timeout(cfg.timeout, transport.attempt_no_credential_auth(&cfg.username)).await;
    // close() may block on a dead peer; dropping the transport still frees the socket
    let _ = time::timeout(cfg.timeout, transport.close()).await;

    match reply {
        Ok(Ok(AuthReply::RejectedWithMethods(methods))) => ProbeStatus::MethodsDisclosed { methods },
        Ok(Ok(AuthReply::Accepted)) => ProbeStatus::NoAuthRequired,
        Ok(Err(e)) => {
            debug!(error = %e, "auth query failed");
            ProbeStatus::AuthAnomaly
        }
        Err(_) => ProbeStatus::AuthAnomaly,
    }
}
