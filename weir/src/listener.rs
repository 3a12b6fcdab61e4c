// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! One listener per configured transport endpoint.
//!
//! The listener accepts sockets, runs the optional TLS and WebSocket
//! handshakes, spawns one session task per connection and relays commands
//! between its sessions and the dispatcher. The authentication hook runs
//! here, on the CONNECT command, before the dispatcher learns about the
//! session.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;

use codec::utils::random_client_id;
use codec::{ConnectAckPacket, ConnectPacket, ReasonCode};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::auth::{self, Authenticator};
use crate::commands::{
    DispatcherToListenerCmd, ListenerToDispatcherCmd, ListenerToSessionCmd, SessionCloseInfo,
    SessionToListenerCmd,
};
use crate::config;
use crate::constants;
use crate::error::{Error, ErrorKind};
use crate::session::{Session, SessionConfig};
use crate::stream::Stream;
use crate::types::{ListenerId, SessionGid, SessionId};

/// Each Listener binds to a specific port.
enum Protocol {
    Mqtt(TcpListener),
    Mqtts(TcpListener, TlsAcceptor),
    Ws(TcpListener),
    Wss(TcpListener, TlsAcceptor),
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Mqtt(..) => "Mqtt",
            Self::Mqtts(..) => "Mqtts",
            Self::Ws(..) => "Ws",
            Self::Wss(..) => "Wss",
        };
        write!(f, "{msg}")
    }
}

#[derive(Debug)]
struct Pipeline {
    sender: Sender<ListenerToSessionCmd>,
    session_id: SessionId,
}

impl Pipeline {
    const fn new(sender: Sender<ListenerToSessionCmd>, session_id: SessionId) -> Self {
        Self { sender, session_id }
    }
}

pub struct Listener {
    id: ListenerId,
    config: config::Listener,
    protocol: Protocol,
    authenticator: Box<dyn Authenticator>,

    current_session_id: SessionId,
    pipelines: HashMap<SessionId, Pipeline>,

    session_sender: Sender<SessionToListenerCmd>,
    session_receiver: Option<Receiver<SessionToListenerCmd>>,

    dispatcher_sender: Sender<ListenerToDispatcherCmd>,
    dispatcher_receiver: Option<Receiver<DispatcherToListenerCmd>>,

    shutdown_receiver: Option<broadcast::Receiver<()>>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("sessions", &self.pipelines.len())
            .finish_non_exhaustive()
    }
}

// Initialization.
impl Listener {
    fn new(
        id: ListenerId,
        config: config::Listener,
        protocol: Protocol,
        authenticator: Box<dyn Authenticator>,
        dispatcher_sender: Sender<ListenerToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToListenerCmd>,
        shutdown_receiver: broadcast::Receiver<()>,
    ) -> Self {
        let (session_sender, session_receiver) = mpsc::channel(constants::CHANNEL_CAPACITY);
        Self {
            id,
            config,
            protocol,
            authenticator,
            current_session_id: 0,
            pipelines: HashMap::new(),
            session_sender,
            session_receiver: Some(session_receiver),
            dispatcher_sender,
            dispatcher_receiver: Some(dispatcher_receiver),
            shutdown_receiver: Some(shutdown_receiver),
        }
    }

    fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
        let mut reader = BufReader::new(File::open(path)?);
        rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("Failed to load cert file at {path:?}, got: {err:?}"),
                )
            })
    }

    fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
        let mut reader = BufReader::new(File::open(path)?);
        rustls_pemfile::private_key(&mut reader)
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("Failed to load key file at {path:?}, got: {err:?}"),
                )
            })?
            .ok_or_else(|| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("No private key found in {path:?}"),
                )
            })
    }

    fn get_tls_acceptor(listener: &config::Listener) -> Result<TlsAcceptor, Error> {
        let cert_file = listener
            .cert_file()
            .ok_or_else(|| Error::new(ErrorKind::CertError, "cert_file is required"))?;
        let key_file = listener
            .key_file()
            .ok_or_else(|| Error::new(ErrorKind::CertError, "key_file is required"))?;

        let certs = Self::load_certs(cert_file)?;
        let key = Self::load_key(key_file)?;
        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    async fn bind_tcp(address: &str) -> Result<TcpListener, Error> {
        let mut last_err = Error::from_string(
            ErrorKind::SocketError,
            format!("Failed to resolve address: {address}"),
        );
        for addr in address.to_socket_addrs()? {
            match TcpListener::bind(&addr).await {
                Ok(tcp_listener) => return Ok(tcp_listener),
                Err(err) => last_err = err.into(),
            }
        }
        Err(last_err)
    }

    /// Bind to the address in `listener_config`.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound or TLS files are invalid.
    pub async fn bind(
        id: ListenerId,
        listener_config: config::Listener,
        security: &config::Security,
        dispatcher_sender: Sender<ListenerToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToListenerCmd>,
        shutdown_receiver: broadcast::Receiver<()>,
    ) -> Result<Self, Error> {
        let authenticator = auth::from_config(security);
        let protocol = match listener_config.protocol() {
            config::Protocol::Mqtt => {
                log::info!("bind mqtt://{}", listener_config.address());
                Protocol::Mqtt(Self::bind_tcp(listener_config.address()).await?)
            }
            config::Protocol::Mqtts => {
                log::info!("bind mqtts://{}", listener_config.address());
                let acceptor = Self::get_tls_acceptor(&listener_config)?;
                Protocol::Mqtts(Self::bind_tcp(listener_config.address()).await?, acceptor)
            }
            config::Protocol::Ws => {
                log::info!("bind ws://{}", listener_config.address());
                Protocol::Ws(Self::bind_tcp(listener_config.address()).await?)
            }
            config::Protocol::Wss => {
                log::info!("bind wss://{}", listener_config.address());
                let acceptor = Self::get_tls_acceptor(&listener_config)?;
                Protocol::Wss(Self::bind_tcp(listener_config.address()).await?, acceptor)
            }
        };

        Ok(Self::new(
            id,
            listener_config,
            protocol,
            authenticator,
            dispatcher_sender,
            dispatcher_receiver,
            shutdown_receiver,
        ))
    }

    /// Restrict WebSocket upgrades to the configured path and answer the
    /// `mqtt` subprotocol when the client offers it.
    fn ws_callback(path: Option<String>) -> impl FnMut(&Request, Response) -> Result<Response, ErrorResponse>
    {
        move |request: &Request, mut response: Response| {
            if let Some(path) = &path {
                if request.uri().path() != path {
                    log::warn!("listener: Rejected ws upgrade at {}", request.uri().path());
                    let mut not_found = ErrorResponse::new(None);
                    *not_found.status_mut() = StatusCode::NOT_FOUND;
                    return Err(not_found);
                }
            }

            let offers_mqtt = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.split(',').any(|p| p.trim() == "mqtt"));
            if offers_mqtt {
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("mqtt"));
            }

            Ok(response)
        }
    }

    async fn accept(&mut self) -> Result<Stream, Error> {
        let path = self.config.path().map(str::to_string);
        match &mut self.protocol {
            Protocol::Mqtt(tcp_listener) => {
                let (tcp_stream, _address) = tcp_listener.accept().await?;
                Ok(Stream::Mqtt(tcp_stream))
            }
            Protocol::Mqtts(tcp_listener, acceptor) => {
                let (tcp_stream, _address) = tcp_listener.accept().await?;
                let tls_stream = acceptor.accept(tcp_stream).await?;
                Ok(Stream::Mqtts(Box::new(tls_stream)))
            }
            Protocol::Ws(tcp_listener) => {
                let (tcp_stream, _address) = tcp_listener.accept().await?;
                let ws_stream =
                    tokio_tungstenite::accept_hdr_async(tcp_stream, Self::ws_callback(path))
                        .await?;
                Ok(Stream::Ws(Box::new(ws_stream)))
            }
            Protocol::Wss(tcp_listener, acceptor) => {
                let (tcp_stream, _address) = tcp_listener.accept().await?;
                let tls_stream = acceptor.accept(tcp_stream).await?;
                let ws_stream =
                    tokio_tungstenite::accept_hdr_async(tls_stream, Self::ws_callback(path))
                        .await?;
                Ok(Stream::Wss(Box::new(ws_stream)))
            }
        }
    }
}

// Command handling and new connections.
impl Listener {
    /// Accept connections and relay commands until shutdown is signalled.
    ///
    /// # Panics
    ///
    /// Panics if called twice; the receiver halves are consumed by the
    /// first call.
    pub async fn run_loop(&mut self) {
        let mut session_receiver = self
            .session_receiver
            .take()
            .expect("Invalid session receiver");
        let mut dispatcher_receiver = self
            .dispatcher_receiver
            .take()
            .expect("Invalid dispatcher receiver");
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .expect("Invalid shutdown receiver");

        loop {
            tokio::select! {
                result = self.accept() => {
                    match result {
                        Ok(stream) => self.new_connection(stream),
                        Err(err) => log::warn!("listener: Failed to accept: {err}"),
                    }
                }
                Some(cmd) = session_receiver.recv() => {
                    self.handle_session_cmd(cmd).await;
                }
                Some(cmd) = dispatcher_receiver.recv() => {
                    self.handle_dispatcher_cmd(cmd).await;
                }
                _ = shutdown_receiver.recv() => {
                    log::info!("listener: Shutting down {}", self.id);
                    self.on_shutdown().await;
                    break;
                }
            }
        }
    }

    fn next_session_id(&mut self) -> SessionId {
        self.current_session_id += 1;
        self.current_session_id
    }

    const fn session_gid(&self, session_id: SessionId) -> SessionGid {
        SessionGid::new(self.id, session_id)
    }

    fn new_connection(&mut self, stream: Stream) {
        let maximum_connections = self.config.maximum_connections();
        if maximum_connections > 0 && self.pipelines.len() >= maximum_connections {
            log::warn!(
                "listener: Max connections ({maximum_connections}) reached, refusing connection"
            );
            return;
        }

        let (sender, receiver) = mpsc::channel(constants::CHANNEL_CAPACITY);
        let session_id = self.next_session_id();
        let pipeline = Pipeline::new(sender, session_id);
        self.pipelines.insert(session_id, pipeline);
        let session = Session::new(
            session_id,
            SessionConfig::new(&self.config),
            stream,
            self.session_sender.clone(),
            receiver,
        );
        tokio::spawn(session.run_loop());
    }

    async fn send_to_session(&mut self, session_id: SessionId, cmd: ListenerToSessionCmd) {
        if let Some(pipeline) = self.pipelines.get(&session_id) {
            if let Err(err) = pipeline.sender.send(cmd).await {
                log::warn!("listener: Failed to send to session {session_id}: {err:?}");
            }
        } else {
            log::error!("listener: No pipeline with session id {session_id}");
        }
    }

    async fn handle_session_cmd(&mut self, cmd: SessionToListenerCmd) {
        match cmd {
            SessionToListenerCmd::Connect(session_id, packet) => {
                self.on_session_connect(session_id, packet).await;
            }
            SessionToListenerCmd::Publish(session_id, packet) => {
                let gid = self.session_gid(session_id);
                if let Err(err) = self
                    .dispatcher_sender
                    .send(ListenerToDispatcherCmd::Publish(gid, packet))
                    .await
                {
                    log::error!("listener: Failed to send publish to dispatcher: {err:?}");
                }
            }
            SessionToListenerCmd::Subscribe(session_id, packet) => {
                let gid = self.session_gid(session_id);
                if let Err(err) = self
                    .dispatcher_sender
                    .send(ListenerToDispatcherCmd::Subscribe(gid, packet))
                    .await
                {
                    log::error!("listener: Failed to send subscribe to dispatcher: {err:?}");
                }
            }
            SessionToListenerCmd::Unsubscribe(session_id, packet) => {
                let gid = self.session_gid(session_id);
                if let Err(err) = self
                    .dispatcher_sender
                    .send(ListenerToDispatcherCmd::Unsubscribe(gid, packet))
                    .await
                {
                    log::error!("listener: Failed to send unsubscribe to dispatcher: {err:?}");
                }
            }
            SessionToListenerCmd::Disconnect(session_id, info) => {
                self.on_session_disconnect(session_id, info).await;
            }
        }
    }

    async fn on_session_connect(&mut self, session_id: SessionId, mut packet: ConnectPacket) {
        let (allow, reason) = self.authenticator.authenticate(
            packet.client_id(),
            packet.username(),
            packet.password(),
        );
        if !allow {
            log::info!(
                "listener: Refused connection of {}, reason: {}",
                packet.client_id(),
                reason
            );
            let ack = ConnectAckPacket::new(false, reason, packet.level());
            self.send_to_session(session_id, ListenerToSessionCmd::ConnectAck(ack, Vec::new()))
                .await;
            return;
        }

        // A zero length client id gets a generated one, or is rejected,
        // depending on listener config.
        let mut assigned_id = None;
        if packet.client_id().is_empty() {
            if self.config.allow_empty_client_id() {
                let client_id = random_client_id();
                if packet.set_client_id(&client_id).is_ok() {
                    assigned_id = Some(client_id);
                }
            } else {
                let ack = ConnectAckPacket::new(
                    false,
                    ReasonCode::ClientIdentifierNotValid,
                    packet.level(),
                );
                self.send_to_session(
                    session_id,
                    ListenerToSessionCmd::ConnectAck(ack, Vec::new()),
                )
                .await;
                return;
            }
        }

        let gid = self.session_gid(session_id);
        if let Err(err) = self
            .dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionConnected(
                gid,
                packet,
                assigned_id,
            ))
            .await
        {
            log::error!("listener: Failed to send connect to dispatcher: {err:?}");
        }
    }

    async fn on_session_disconnect(&mut self, session_id: SessionId, info: SessionCloseInfo) {
        if self.pipelines.remove(&session_id).is_none() {
            log::error!("listener: Failed to remove pipeline with session id {session_id}");
        }
        let gid = self.session_gid(session_id);
        if let Err(err) = self
            .dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionClosed(gid, info))
            .await
        {
            log::error!("listener: Failed to send session closed to dispatcher: {err:?}");
        }
    }

    async fn handle_dispatcher_cmd(&mut self, cmd: DispatcherToListenerCmd) {
        match cmd {
            DispatcherToListenerCmd::ConnectAck(session_id, ack, resumed) => {
                self.send_to_session(session_id, ListenerToSessionCmd::ConnectAck(ack, resumed))
                    .await;
            }
            DispatcherToListenerCmd::Publish(session_id, packet) => {
                self.publish_to_session(session_id, packet).await;
            }
            DispatcherToListenerCmd::SubscribeAck(session_id, ack, retained) => {
                self.send_to_session(
                    session_id,
                    ListenerToSessionCmd::SubscribeAck(ack, retained),
                )
                .await;
            }
            DispatcherToListenerCmd::UnsubscribeAck(session_id, ack) => {
                self.send_to_session(session_id, ListenerToSessionCmd::UnsubscribeAck(ack))
                    .await;
            }
            DispatcherToListenerCmd::Disconnect(session_id, reason) => {
                self.send_to_session(session_id, ListenerToSessionCmd::Disconnect(reason))
                    .await;
            }
        }
    }

    async fn publish_to_session(&mut self, session_id: SessionId, packet: codec::PublishPacket) {
        let Some(pipeline) = self.pipelines.get(&session_id) else {
            // Subscriber vanished while the message was in flight; skip it.
            log::info!("listener: Dropping publish to closed session {session_id}");
            return;
        };

        if packet.qos() == codec::QoS::AtMostOnce {
            // QoS 0 deliveries are dropped instead of blocking the listener
            // when the subscriber cannot keep up.
            if let Err(err) = pipeline
                .sender
                .try_send(ListenerToSessionCmd::Publish(packet))
            {
                log::warn!("listener: Dropping QoS 0 publish to {session_id}: {err}");
            }
        } else if let Err(err) = pipeline
            .sender
            .send(ListenerToSessionCmd::Publish(packet))
            .await
        {
            log::warn!("listener: Failed to publish to session {session_id}: {err:?}");
        }
    }

    async fn on_shutdown(&mut self) {
        for pipeline in self.pipelines.values() {
            if let Err(err) = pipeline
                .sender
                .send(ListenerToSessionCmd::Disconnect(
                    ReasonCode::ServerShuttingDown,
                ))
                .await
            {
                log::warn!(
                    "listener: Failed to send shutdown to session {}: {err:?}",
                    pipeline.session_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_tls_requires_cert_files() {
        let listener_config: config::Listener =
            toml::from_str("protocol = \"mqtts\"\naddress = \"127.0.0.1:0\"").unwrap();
        let security = config::Security::default();
        let (dispatcher_sender, _keep) = mpsc::channel(1);
        let (_keep2, dispatcher_receiver) = mpsc::channel(1);
        let (shutdown_sender, _keep3) = broadcast::channel(1);

        let result = tokio_test::block_on(Listener::bind(
            1,
            listener_config,
            &security,
            dispatcher_sender,
            dispatcher_receiver,
            shutdown_sender.subscribe(),
        ));
        let err = result.err().expect("bind must fail without cert files");
        assert_eq!(err.kind(), ErrorKind::CertError);
    }

    #[test]
    fn test_bind_tcp_on_free_port() {
        let listener_config: config::Listener =
            toml::from_str("protocol = \"mqtt\"\naddress = \"127.0.0.1:0\"").unwrap();
        let security = config::Security::default();
        let (dispatcher_sender, _keep) = mpsc::channel(1);
        let (_keep2, dispatcher_receiver) = mpsc::channel(1);
        let (shutdown_sender, _keep3) = broadcast::channel(1);

        let result = tokio_test::block_on(Listener::bind(
            1,
            listener_config,
            &security,
            dispatcher_sender,
            dispatcher_receiver,
            shutdown_sender.subscribe(),
        ));
        assert!(result.is_ok());
    }
}
