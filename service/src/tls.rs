//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! TLS context with in-place session renewal
//!
//! A [`TlsContext`] owns the rustls configuration behind an [`ArcSwap`],
//! so [`reload`](TlsContext::reload) can swap in fresh certificates
//! without touching live sessions. [`redraw`](TlsContext::redraw) and
//! [`reset`](TlsContext::reset) renew one session in place: the TLS
//! layer is torn down and re-negotiated over the same transport socket,
//! bounded by a hard deadline, while the connection identity and its
//! liveness registration survive.

use crate::error::{NetError, Result};
use arc_swap::ArcSwapOption;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector, client, server};
use tracing::{debug, info};

/// TLS configuration paths and deadlines
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// Certificate chain path (PEM), required for servers
    pub cert_path: Option<PathBuf>,
    /// Private key path (PEM), required for servers
    pub key_path: Option<PathBuf>,
    /// Trust anchor path (PEM), required for clients
    pub ca_path: Option<PathBuf>,
    /// Server name presented by clients during the handshake
    pub server_name: Option<String>,
    /// Deadline for the initial handshake
    pub handshake_timeout: Duration,
    /// Hard deadline for an in-place renewal
    pub renewal_timeout: Duration,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            ca_path: None,
            server_name: None,
            handshake_timeout: Duration::from_secs(10),
            renewal_timeout: Duration::from_secs(10),
        }
    }
}

impl TlsSettings {
    /// Set the certificate chain path
    pub fn with_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = Some(path.into());
        self
    }

    /// Set the private key path
    pub fn with_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Set the trust anchor path
    pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    /// Set the server name presented during client handshakes
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Set the initial handshake deadline
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the in-place renewal deadline
    pub fn with_renewal_timeout(mut self, timeout: Duration) -> Self {
        self.renewal_timeout = timeout;
        self
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader).collect::<std::io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(NetError::TlsHandshakeFailed(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        NetError::TlsHandshakeFailed(format!("no private key in {}", path.display()))
    })
}

/// TLS context holding a hot-swappable rustls configuration
///
/// One context serves either role: servers carry a `ServerConfig`,
/// clients a `ClientConfig`. At most one in-place renewal runs at a
/// time per context.
#[derive(Debug)]
pub struct TlsContext {
    settings: std::sync::RwLock<TlsSettings>,
    server_config: ArcSwapOption<ServerConfig>,
    client_config: ArcSwapOption<ClientConfig>,
    renewing: AtomicBool,
}

impl TlsContext {
    /// Build a server-side context from certificate and key paths
    pub fn server(settings: TlsSettings) -> Result<Self> {
        let config = Self::build_server_config(&settings)?;
        Ok(Self {
            settings: std::sync::RwLock::new(settings),
            server_config: ArcSwapOption::from_pointee(config),
            client_config: ArcSwapOption::empty(),
            renewing: AtomicBool::new(false),
        })
    }

    /// Build a client-side context from a trust anchor path
    pub fn client(settings: TlsSettings) -> Result<Self> {
        let config = Self::build_client_config(&settings)?;
        Ok(Self {
            settings: std::sync::RwLock::new(settings),
            server_config: ArcSwapOption::empty(),
            client_config: ArcSwapOption::from_pointee(config),
            renewing: AtomicBool::new(false),
        })
    }

    fn build_server_config(settings: &TlsSettings) -> Result<ServerConfig> {
        let cert_path = settings
            .cert_path
            .as_deref()
            .ok_or_else(|| NetError::TlsHandshakeFailed("server requires cert_path".into()))?;
        let key_path = settings
            .key_path
            .as_deref()
            .ok_or_else(|| NetError::TlsHandshakeFailed("server requires key_path".into()))?;
        let certs = load_certs(cert_path)?;
        let key = load_key(key_path)?;
        ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|err| NetError::TlsHandshakeFailed(err.to_string()))
    }

    fn build_client_config(settings: &TlsSettings) -> Result<ClientConfig> {
        let ca_path = settings
            .ca_path
            .as_deref()
            .ok_or_else(|| NetError::TlsHandshakeFailed("client requires ca_path".into()))?;
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots
                .add(cert)
                .map_err(|err| NetError::TlsHandshakeFailed(err.to_string()))?;
        }
        Ok(ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth())
    }

    /// Replace the stored settings and rebuild the configuration
    ///
    /// Sessions established before the call keep their old parameters;
    /// every handshake and renewal after it uses the new ones.
    pub fn reset_settings(&self, settings: TlsSettings) -> Result<()> {
        if self.server_config.load().is_some() {
            let config = Self::build_server_config(&settings)?;
            self.server_config.store(Some(Arc::new(config)));
        } else {
            let config = Self::build_client_config(&settings)?;
            self.client_config.store(Some(Arc::new(config)));
        }
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        info!("tls settings replaced");
        Ok(())
    }

    /// Rebuild the configuration from the current settings
    ///
    /// Used to pick up rotated certificate files on disk without
    /// changing any paths.
    pub fn reload(&self) -> Result<()> {
        let settings = self
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        self.reset_settings(settings)
    }

    fn handshake_timeout(&self) -> Duration {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .handshake_timeout
    }

    fn renewal_timeout(&self) -> Duration {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .renewal_timeout
    }

    fn server_name(&self) -> Result<ServerName<'static>> {
        let settings = self.settings.read().unwrap_or_else(|e| e.into_inner());
        let name = settings.server_name.clone().ok_or_else(|| {
            NetError::TlsHandshakeFailed("client requires server_name".into())
        })?;
        ServerName::try_from(name).map_err(|err| NetError::TlsHandshakeFailed(err.to_string()))
    }

    fn acceptor(&self) -> Result<TlsAcceptor> {
        let config = self
            .server_config
            .load_full()
            .ok_or_else(|| NetError::TlsHandshakeFailed("not a server context".into()))?;
        Ok(TlsAcceptor::from(config))
    }

    fn connector(&self) -> Result<TlsConnector> {
        let config = self
            .client_config
            .load_full()
            .ok_or_else(|| NetError::TlsHandshakeFailed("not a client context".into()))?;
        Ok(TlsConnector::from(config))
    }

    /// Run the server-side handshake over an accepted transport
    pub async fn accept<S>(&self, stream: S) -> Result<server::TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let acceptor = self.acceptor()?;
        match tokio::time::timeout(self.handshake_timeout(), acceptor.accept(stream)).await {
            Ok(Ok(tls)) => Ok(tls),
            Ok(Err(err)) => Err(NetError::TlsHandshakeFailed(err.to_string())),
            Err(_) => Err(NetError::TlsHandshakeFailed("handshake timed out".into())),
        }
    }

    /// Run the client-side handshake over a connected transport
    pub async fn connect<S>(&self, stream: S) -> Result<client::TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let connector = self.connector()?;
        let name = self.server_name()?;
        match tokio::time::timeout(self.handshake_timeout(), connector.connect(name, stream)).await
        {
            Ok(Ok(tls)) => Ok(tls),
            Ok(Err(err)) => Err(NetError::TlsHandshakeFailed(err.to_string())),
            Err(_) => Err(NetError::TlsHandshakeFailed("handshake timed out".into())),
        }
    }

    fn begin_renewal(&self) -> Result<()> {
        self.renewing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| NetError::TlsRenewalInProgress)?;
        Ok(())
    }

    /// Renew a server-side session in place
    ///
    /// Tears the TLS layer off the stream and re-runs the handshake
    /// over the same transport with the current configuration, bounded
    /// by the renewal deadline. On [`NetError::TlsRenewalTimeout`] the
    /// transport has been consumed and the caller must close the
    /// connection.
    pub async fn redraw<S>(&self, stream: server::TlsStream<S>) -> Result<server::TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.begin_renewal()?;
        let acceptor = match self.acceptor() {
            Ok(acceptor) => acceptor,
            Err(err) => {
                self.renewing.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        let (transport, _old_session) = stream.into_inner();
        debug!("tls redraw started");
        let result =
            match tokio::time::timeout(self.renewal_timeout(), acceptor.accept(transport)).await {
                Ok(Ok(tls)) => Ok(tls),
                Ok(Err(err)) => Err(NetError::TlsHandshakeFailed(err.to_string())),
                Err(_) => Err(NetError::TlsRenewalTimeout),
            };
        self.renewing.store(false, Ordering::SeqCst);
        if result.is_ok() {
            info!("tls redraw complete");
        }
        result
    }

    /// Renew a client-side session in place
    ///
    /// The counterpart of [`redraw`](Self::redraw): re-runs the client
    /// handshake over the same transport with the current
    /// configuration. Call [`reset_settings`](Self::reset_settings)
    /// first to renew under new parameters.
    pub async fn reset<S>(&self, stream: client::TlsStream<S>) -> Result<client::TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.begin_renewal()?;
        let prepared = match (self.connector(), self.server_name()) {
            (Ok(connector), Ok(name)) => Ok((connector, name)),
            (Err(err), _) | (_, Err(err)) => Err(err),
        };
        let (connector, name) = match prepared {
            Ok(pair) => pair,
            Err(err) => {
                self.renewing.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        let (transport, _old_session) = stream.into_inner();
        debug!("tls reset started");
        let result = match tokio::time::timeout(
            self.renewal_timeout(),
            connector.connect(name, transport),
        )
        .await
        {
            Ok(Ok(tls)) => Ok(tls),
            Ok(Err(err)) => Err(NetError::TlsHandshakeFailed(err.to_string())),
            Err(_) => Err(NetError::TlsRenewalTimeout),
        };
        self.renewing.store(false, Ordering::SeqCst);
        if result.is_ok() {
            info!("tls reset complete");
        }
        result
    }

    /// Whether an in-place renewal is currently running
    pub fn is_renewing(&self) -> bool {
        self.renewing.load(Ordering::SeqCst)
    }
}

/// A transport that may or may not carry TLS
///
/// Lets the descriptor handlers and sessions run over plaintext and
/// TLS streams through one type.
#[derive(Debug)]
pub enum MaybeTlsStream<S> {
    /// Plaintext transport
    Plain(S),
    /// Server-side TLS session
    ServerTls(Box<server::TlsStream<S>>),
    /// Client-side TLS session
    ClientTls(Box<client::TlsStream<S>>),
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTlsStream<S> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            Self::ServerTls(s) => std::pin::Pin::new(s.as_mut()).poll_read(cx, buf),
            Self::ClientTls(s) => std::pin::Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTlsStream<S> {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            Self::ServerTls(s) => std::pin::Pin::new(s.as_mut()).poll_write(cx, buf),
            Self::ClientTls(s) => std::pin::Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => std::pin::Pin::new(s).poll_flush(cx),
            Self::ServerTls(s) => std::pin::Pin::new(s.as_mut()).poll_flush(cx),
            Self::ClientTls(s) => std::pin::Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            Self::ServerTls(s) => std::pin::Pin::new(s.as_mut()).poll_shutdown(cx),
            Self::ClientTls(s) => std::pin::Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
