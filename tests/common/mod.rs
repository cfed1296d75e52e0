//! Scripted SSH servers for exercising the scanner over real loopback sockets.
//!
//! The fake server speaks a two-line protocol: an identification line
//! (`SSH-2.0-...`) followed by the reply to the `none` auth attempt
//! (`methods: a,b`, `accept`, or anything else for a protocol error).
#![allow(dead_code)]

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ssh_pass_scan::transport::{AuthReply, SshNegotiator, SshTransport};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use russh::keys::{Algorithm, PrivateKey};
use russh::server;
use russh::{MethodKind, MethodSet};
use tokio::net::{TcpListener, TcpStream};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Debug, Clone)]
pub enum Script {
    Methods(&'static str),
    Accept,
    Garbage,
    /// Accept the connection and never write a byte.
    Silent,
}

/// Bind a server on an ephemeral loopback port that answers every connection with `script`.
pub async fn spawn_server(script: Script) -> u16 {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            match &script {
                Script::Silent => held.push(sock),
                other => {
                    let body = match other {
                        Script::Methods(m) => format!("SSH-2.0-fake\nmethods: {m}\n"),
                        Script::Accept => "SSH-2.0-fake\naccept\n".to_string(),
                        _ => "HTTP/1.1 400 Bad Request\n\n".to_string(),
                    };
                    let _ = sock.write_all(body.as_bytes()).await;
                }
            }
        }
    });
    port
}

/// russh server handler that relies on the default `none` rejection.
#[derive(Clone)]
struct RejectingHandler;

impl server::Handler for RejectingHandler {
    type Error = russh::Error;
}

/// Bind a real SSH server that rejects `none` auth and advertises `methods`.
pub async fn spawn_ssh_server(methods: &[MethodKind]) -> u16 {
    let key = PrivateKey::random(&mut rand_core::OsRng, Algorithm::Ed25519).unwrap();
    let config = Arc::new(server::Config {
        methods: MethodSet::from(methods),
        auth_rejection_time: Duration::ZERO,
        auth_rejection_time_initial: Some(Duration::ZERO),
        keys: vec![key],
        ..Default::default()
    });
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                return;
            };
            let config = config.clone();
            tokio::spawn(async move {
                if let Ok(session) = server::run_stream(config, sock, RejectingHandler).await {
                    let _ = session.await;
                }
            });
        }
    });
    port
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Open/close bookkeeping shared by a negotiator and its transports.
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

/// Negotiator that understands the scripted protocol and tracks open transports.
#[derive(Debug, Default, Clone)]
pub struct ScriptedNegotiator {
    pub counters: Arc<Counters>,
}

impl ScriptedNegotiator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SshNegotiator for ScriptedNegotiator {
    async fn open(&self, stream: TcpStream, _timeout: Duration) -> Result<Box<dyn SshTransport>> {
        let mut reader = BufReader::new(stream);
        let mut ident = String::new();
        reader.read_line(&mut ident).await?;
        if !ident.starts_with("SSH-") {
            bail!("not an ssh server: {ident:?}");
        }
        let c = &self.counters;
        c.opened.fetch_add(1, Ordering::SeqCst);
        let now = c.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        c.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(ScriptedTransport {
            reader,
            counters: c.clone(),
        }))
    }
}

struct ScriptedTransport {
    reader: BufReader<TcpStream>,
    counters: Arc<Counters>,
}

#[async_trait]
impl SshTransport for ScriptedTransport {
    async fn attempt_no_credential_auth(&mut self, _username: &str) -> Result<AuthReply> {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.context("read auth reply")?;
        let line = line.trim();
        if line == "accept" {
            return Ok(AuthReply::Accepted);
        }
        let Some(list) = line.strip_prefix("methods: ") else {
            bail!("unexpected auth reply: {line:?}");
        };
        let methods: BTreeSet<String> = list.split(',').map(|m| m.trim().to_string()).collect();
        Ok(AuthReply::RejectedWithMethods(methods))
    }

    async fn close(self: Box<Self>) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}
