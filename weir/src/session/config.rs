// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::config::Listener;

/// Per-connection limits, copied from the owning listener's config.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Seconds to wait for CONNECT after the socket is accepted; 0 disables.
    connect_timeout: u64,

    /// Maximum keep alive accepted from clients; 0 means no limit.
    maximum_keep_alive: u16,

    /// Maximum number of in-flight QoS 1/2 messages towards the client;
    /// 0 means no limit beyond the client's receive maximum.
    maximum_inflight_messages: u16,
}

impl SessionConfig {
    #[must_use]
    pub fn new(listener: &Listener) -> Self {
        Self {
            connect_timeout: u64::from(listener.connect_timeout()),
            maximum_keep_alive: listener.maximum_keep_alive(),
            maximum_inflight_messages: listener.maximum_inflight_messages(),
        }
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    #[must_use]
    pub const fn maximum_keep_alive(&self) -> u16 {
        self.maximum_keep_alive
    }

    #[must_use]
    pub const fn maximum_inflight_messages(&self) -> u16 {
        self.maximum_inflight_messages
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(&Listener::default())
    }
}
