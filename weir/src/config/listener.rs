// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Binding protocol types.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Raw Mqtt protocol, in TCP.
    #[serde(alias = "mqtt")]
    Mqtt,

    /// Raw Mqtt protocol, in TCP with TLS encryption.
    #[serde(alias = "mqtts")]
    Mqtts,

    /// Websocket protocol.
    #[serde(alias = "ws")]
    Ws,

    /// Secure Websocket protocol.
    #[serde(alias = "wss")]
    Wss,
}

/// Listener represents a unique ip/port combination and mqtt connection protocol.
#[derive(Debug, Deserialize, Clone)]
pub struct Listener {
    /// The maximum number of client connections to this listener allowed.
    ///
    /// Default is 0, which means unlimited connections.
    #[serde(default = "Listener::default_maximum_connections")]
    maximum_connections: usize,

    /// Binding protocol.
    ///
    /// Default is mqtt.
    #[serde(default = "Listener::default_protocol")]
    protocol: Protocol,

    /// Binding address, including domain name and port.
    ///
    /// Common addresses are:
    /// - 0.0.0.0:1883, for mqtt
    /// - 0.0.0.0:8883, for mqtts
    /// - 0.0.0.0:8083, for mqtt over WebSocket
    /// - 0.0.0.0:8084, for mqtt over secure WebSocket
    ///
    /// Default is 0.0.0.0:1883
    #[serde(default = "Listener::default_address")]
    address: String,

    /// Url path to bind to, only used for websocket protocols.
    ///
    /// Default is None, which means do not check url path.
    #[serde(default = "Listener::default_path")]
    path: Option<String>,

    /// Path to TLS cert file, required by mqtts and wss.
    #[serde(default = "Listener::default_cert_file")]
    cert_file: Option<PathBuf>,

    /// Path to TLS private key file, required by mqtts and wss.
    #[serde(default = "Listener::default_key_file")]
    key_file: Option<PathBuf>,

    /// Maximum keep alive value accepted from clients, in seconds.
    ///
    /// A client requesting a longer keep alive gets this value enforced
    /// instead; 5.0 clients are informed with a Server Keep Alive property
    /// in CONNACK.
    ///
    /// Default is 0, which means no limit.
    #[serde(default = "Listener::default_maximum_keep_alive")]
    maximum_keep_alive: u16,

    /// Timeout value in seconds before receiving a Connect packet from
    /// a client.
    ///
    /// The timer is started when the client stream is connected.
    ///
    /// Default is 30.
    #[serde(default = "Listener::default_connect_timeout")]
    connect_timeout: u16,

    /// A client MAY supply a ClientId that has a length of zero bytes.
    ///
    /// If this flag is true, such a client is assigned a unique generated
    /// ClientId; 5.0 clients find it in the Assigned Client Identifier
    /// property of CONNACK. If false, the connection is rejected with
    /// an identifier-rejected acknowledgement.
    ///
    /// Default is true.
    #[serde(default = "Listener::default_allow_empty_client_id")]
    allow_empty_client_id: bool,

    /// The maximum number of QoS 1 and 2 messages currently in-flight per
    /// client.
    ///
    /// This includes messages that are partway through an acknowledgement
    /// handshake. Further deliveries wait until a slot frees up.
    ///
    /// Default is 20.
    #[serde(default = "Listener::default_maximum_inflight_messages")]
    maximum_inflight_messages: u16,
}

impl Listener {
    #[must_use]
    pub fn default_listeners() -> Vec<Self> {
        vec![Self::default()]
    }

    #[must_use]
    pub const fn default_maximum_connections() -> usize {
        0
    }

    #[must_use]
    pub const fn default_protocol() -> Protocol {
        Protocol::Mqtt
    }

    #[must_use]
    pub fn default_address() -> String {
        "0.0.0.0:1883".to_string()
    }

    #[must_use]
    pub const fn default_path() -> Option<String> {
        None
    }

    #[must_use]
    pub const fn default_cert_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_key_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_maximum_keep_alive() -> u16 {
        0
    }

    #[must_use]
    pub const fn default_connect_timeout() -> u16 {
        30
    }

    #[must_use]
    pub const fn default_allow_empty_client_id() -> bool {
        true
    }

    #[must_use]
    pub const fn default_maximum_inflight_messages() -> u16 {
        20
    }

    #[must_use]
    pub const fn maximum_connections(&self) -> usize {
        self.maximum_connections
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    #[must_use]
    pub const fn maximum_keep_alive(&self) -> u16 {
        self.maximum_keep_alive
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> u16 {
        self.connect_timeout
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    #[must_use]
    pub const fn maximum_inflight_messages(&self) -> u16 {
        self.maximum_inflight_messages
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if socket address is invalid or TLS files are missing.
    pub fn validate(&self) -> Result<(), Error> {
        self.address.to_socket_addrs().map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid socket address: {}, err: {:?}", &self.address, err),
            )
        })?;

        if matches!(self.protocol, Protocol::Mqtts | Protocol::Wss) {
            if self.cert_file.is_none() {
                return Err(Error::new(
                    ErrorKind::ConfigError,
                    "cert_file is required for mqtts/wss listeners",
                ));
            }
            if self.key_file.is_none() {
                return Err(Error::new(
                    ErrorKind::ConfigError,
                    "key_file is required for mqtts/wss listeners",
                ));
            }
        }

        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            maximum_connections: Self::default_maximum_connections(),
            protocol: Self::default_protocol(),
            address: Self::default_address(),
            path: Self::default_path(),
            cert_file: Self::default_cert_file(),
            key_file: Self::default_key_file(),
            maximum_keep_alive: Self::default_maximum_keep_alive(),
            connect_timeout: Self::default_connect_timeout(),
            allow_empty_client_id: Self::default_allow_empty_client_id(),
            maximum_inflight_messages: Self::default_maximum_inflight_messages(),
        }
    }
}
