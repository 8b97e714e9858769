/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use rustls::ClientConfig;
use rustls::DigitallySignedStruct;
use rustls::RootCertStore;
use rustls::SignatureScheme;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::client::danger::ServerCertVerified;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::ServerName;
use rustls::pki_types::UnixTime;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadBuf;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::XmppError;
use super::constants::WIRE_TARGET;

const READ_BUFFER_SIZE: usize = 8192;

/// How the server certificate is checked after STARTTLS.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TrustPolicy {
    /// Verify the chain against the bundled Mozilla root store.
    #[default]
    SystemDefault,
    /// Accept any certificate, including self signed ones.
    ///
    /// This is insecure: an active attacker can read and change all
    /// traffic. The client reports a security warning when it is used.
    AcceptAll,
    /// Accept only a server certificate with exactly these DER bytes.
    Pinned(Vec<u8>),
}

/// Opens byte streams to servers.
///
/// The client is generic over this so tests can run the whole protocol
/// over in-memory pipes.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn open(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Stream, XmppError>> + Send;

    fn upgrade_to_tls(
        &self,
        stream: Self::Stream,
        domain: &str,
        trust: &TrustPolicy,
    ) -> impl Future<Output = Result<Self::Stream, XmppError>> + Send;
}

/// A TCP connection, before or after the TLS upgrade.
pub enum NetworkStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            NetworkStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetworkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            NetworkStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            NetworkStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            NetworkStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            NetworkStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            NetworkStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// The production connector: tokio TCP plus rustls.
#[derive(Clone, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = NetworkStream;

    async fn open(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<NetworkStream, XmppError> {
        debug!(host, port, "connecting");
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| XmppError::Timeout)??;
        stream.set_nodelay(true)?;
        Ok(NetworkStream::Plain(stream))
    }

    async fn upgrade_to_tls(
        &self,
        stream: NetworkStream,
        domain: &str,
        trust: &TrustPolicy,
    ) -> Result<NetworkStream, XmppError> {
        let NetworkStream::Plain(stream) = stream else {
            return Err(XmppError::Tls("stream is already encrypted".to_string()));
        };
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|err| XmppError::Tls(err.to_string()))?;
        let connector = TlsConnector::from(Arc::new(tls_config(trust)?));
        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|err| XmppError::Tls(err.to_string()))?;
        debug!(domain, "tls established");
        Ok(NetworkStream::Tls(Box::new(stream)))
    }
}

/// Builds the rustls client configuration for a trust policy.
pub fn tls_config(trust: &TrustPolicy) -> Result<ClientConfig, XmppError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|err| XmppError::Tls(err.to_string()))?;
    let config = match trust {
        TrustPolicy::SystemDefault => {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TrustPolicy::AcceptAll => {
            warn!("tls certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(CertVerifier {
                    pinned: None,
                    provider,
                }))
                .with_no_client_auth()
        }
        TrustPolicy::Pinned(certificate) => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CertVerifier {
                pinned: Some(certificate.clone()),
                provider,
            }))
            .with_no_client_auth(),
    };
    Ok(config)
}

/// Checks the end entity certificate against a pinned copy, or accepts
/// everything when nothing is pinned. Handshake signatures are always
/// verified.
#[derive(Debug)]
struct CertVerifier {
    pinned: Option<Vec<u8>>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for CertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match &self.pinned {
            Some(pinned) if pinned.as_slice() != end_entity.as_ref() => Err(
                rustls::Error::InvalidCertificate(rustls::CertificateError::ApplicationVerificationFailure),
            ),
            _ => Ok(ServerCertVerified::assertion()),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Framed access to a byte stream.
///
/// Outbound frames are written whole and flushed. Inbound bytes come
/// back in whatever chunks the socket delivers them; the stream codec
/// takes care of reassembly.
pub struct Transport<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S> Transport<S> {
    pub fn new(stream: S) -> Self {
        Transport {
            stream,
            buffer: vec![0; READ_BUFFER_SIZE],
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> Transport<S> {
    /// Reads the next chunk, or `None` when the peer closed the stream.
    pub async fn read_chunk(&mut self) -> Result<Option<&[u8]>, XmppError> {
        let len = self.stream.read(&mut self.buffer).await?;
        if len == 0 {
            trace!(target: WIRE_TARGET, "recv eof");
            return Ok(None);
        }
        let bytes = &self.buffer[..len];
        trace!(target: WIRE_TARGET, len, "recv {}", String::from_utf8_lossy(bytes));
        Ok(Some(bytes))
    }
}

impl<S: AsyncWrite + Unpin> Transport<S> {
    pub async fn write_frame(&mut self, bytes: &[u8]) -> Result<(), XmppError> {
        trace!(target: WIRE_TARGET, len = bytes.len(), "send {}", String::from_utf8_lossy(bytes));
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), XmppError> {
        trace!(target: WIRE_TARGET, "close");
        self.stream.shutdown().await?;
        Ok(())
    }
}

impl<S: AsyncRead + AsyncWrite> Transport<S> {
    /// Splits into independently owned read and write sides.
    pub fn split(self) -> (Transport<ReadHalf<S>>, Transport<WriteHalf<S>>) {
        let (reader, writer) = tokio::io::split(self.stream);
        (
            Transport {
                stream: reader,
                buffer: self.buffer,
            },
            Transport {
                stream: writer,
                buffer: Vec::new(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_and_eof() {
        let (client, server) = tokio::io::duplex(64);
        let mut client = Transport::new(client);
        let mut server = Transport::new(server);

        client.write_frame(b"<presence/>").await.unwrap();
        assert_eq!(server.read_chunk().await.unwrap(), Some(&b"<presence/>"[..]));

        let (mut reader, mut writer) = server.split();
        writer.write_frame(b"<iq/>").await.unwrap();
        assert_eq!(client.read_chunk().await.unwrap(), Some(&b"<iq/>"[..]));

        client.close().await.unwrap();
        assert_eq!(reader.read_chunk().await.unwrap(), None);
    }

    #[test]
    fn pinned_certificate() {
        let pinned = vec![1, 2, 3, 4];
        let verifier = CertVerifier {
            pinned: Some(pinned.clone()),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        };
        let name = ServerName::try_from("example.com").unwrap();
        let check = |der: Vec<u8>| {
            verifier
                .verify_server_cert(&CertificateDer::from(der), &[], &name, &[], UnixTime::now())
                .is_ok()
        };
        assert!(check(pinned.clone()));
        assert!(!check(vec![1, 2, 3]));
        assert!(!check(vec![4, 3, 2, 1]));
    }

    #[test]
    fn configs() {
        assert!(tls_config(&TrustPolicy::SystemDefault).is_ok());
        assert!(tls_config(&TrustPolicy::AcceptAll).is_ok());
        assert!(tls_config(&TrustPolicy::Pinned(vec![0x30, 0x00])).is_ok());
        assert_eq!(TrustPolicy::default(), TrustPolicy::SystemDefault);
    }
}
