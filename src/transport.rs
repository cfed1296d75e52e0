use anyhow::{Context, Result};
use async_trait::async_trait;
use russh::client::{self, AuthResult};
use russh::{Disconnect, MethodKind};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Reply to a credential-less authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    /// The server let the user in without credentials.
    Accepted,
    /// `none` was refused and the server listed the methods it would take instead.
    RejectedWithMethods(BTreeSet<String>),
}

/// Opens an SSH client transport over a socket that is already connected.
///
/// Implementations own the stream from here on; dropping the returned
/// transport (or the future, on timeout) must release it.
#[async_trait]
pub trait SshNegotiator: Send + Sync {
    async fn open(&self, stream: TcpStream, timeout: Duration) -> Result<Box<dyn SshTransport>>;
}

/// A negotiated client transport that has not authenticated yet.
#[async_trait]
pub trait SshTransport: Send {
    /// Try `none` authentication for `username`. Any failure that does not carry
    /// a method list comes back as `Err`.
    async fn attempt_no_credential_auth(&mut self, username: &str) -> Result<AuthReply>;

    async fn close(self: Box<Self>);
}

/// Production negotiator backed by `russh`.
#[derive(Debug, Clone, Default)]
pub struct RusshNegotiator;

struct AnyHostKey;

impl client::Handler for AnyHostKey {
    type Error = russh::Error;

    // No credential is ever sent, so the host key is not worth pinning.
    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

#[async_trait]
impl SshNegotiator for RusshNegotiator {
    async fn open(&self, stream: TcpStream, timeout: Duration) -> Result<Box<dyn SshTransport>> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(timeout),
            ..Default::default()
        });
        let handle = tokio::time::timeout(timeout, client::connect_stream(config, stream, AnyHostKey))
            .await
            .context("ssh handshake timed out")?
            .context("ssh handshake failed")?;
        Ok(Box::new(RusshTransport { handle }))
    }
}

struct RusshTransport {
    handle: client::Handle<AnyHostKey>,
}

#[async_trait]
impl SshTransport for RusshTransport {
    async fn attempt_no_credential_auth(&mut self, username: &str) -> Result<AuthReply> {
        let res = self
            .handle
            .authenticate_none(username)
            .await
            .context("none authentication failed")?;
        match res {
            AuthResult::Success => Ok(AuthReply::Accepted),
            AuthResult::Failure {
                remaining_methods, ..
            } => Ok(AuthReply::RejectedWithMethods(
                remaining_methods.iter().map(method_name).collect(),
            )),
        }
    }

    async fn close(self: Box<Self>) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}

/// Wire name of an authentication method as listed in SSH_MSG_USERAUTH_FAILURE.
fn method_name(kind: &MethodKind) -> String {
    match kind {
        MethodKind::Password => "password".to_string(),
        MethodKind::PublicKey => "publickey".to_string(),
        MethodKind::KeyboardInteractive => "keyboard-interactive".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}
