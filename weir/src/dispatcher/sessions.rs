// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Registry of client sessions known to the broker.
//!
//! A record outlives its connection when the client asked for a persistent
//! session (3.1.1 `clean_session=0`, 5.0 session expiry interval > 0).
//! Wills are keyed by connection, because a taken-over connection still has
//! its own will to publish, independent of the successor's.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use codec::{ProtocolLevel, PublishPacket};

use crate::commands::SessionCloseInfo;
use crate::constants;
use crate::types::SessionGid;

/// Will message of one live connection.
#[derive(Debug, Clone)]
pub struct Will {
    pub packet: PublishPacket,

    /// Will delay interval in seconds, 5.0 only.
    pub delay: u32,
}

/// A will whose delay interval is running.
#[derive(Debug)]
struct ArmedWill {
    client_id: String,
    fire_at: Instant,
    packet: PublishPacket,
}

#[derive(Debug)]
struct ClientRecord {
    /// Current connection, None while the session is offline.
    gid: Option<SessionGid>,

    level: ProtocolLevel,

    /// Session expiry interval in seconds.
    session_expiry: u32,

    /// Deadline after which the offline record is dropped.
    expires_at: Option<Instant>,

    /// Filters this client is subscribed to, mirrored in the trie.
    subscriptions: HashSet<String>,

    /// Messages queued while the persistent session was offline.
    queued: VecDeque<PublishPacket>,
}

impl ClientRecord {
    fn new(gid: SessionGid, level: ProtocolLevel, session_expiry: u32) -> Self {
        Self {
            gid: Some(gid),
            level,
            session_expiry,
            expires_at: None,
            subscriptions: HashSet::new(),
            queued: VecDeque::new(),
        }
    }

    fn queue(&mut self, client_id: &str, packet: PublishPacket) {
        if self.queued.len() >= constants::OFFLINE_QUEUE_CAPACITY {
            log::warn!("sessions: Offline queue of {client_id} is full, dropping oldest");
            self.queued.pop_front();
        }
        self.queued.push_back(packet);
    }
}

/// Result of registering a connection.
#[derive(Debug, Default)]
pub struct RegisterOutcome {
    pub session_present: bool,

    /// A previous connection which must be disconnected with
    /// `SessionTakenOver`.
    pub took_over: Option<SessionGid>,

    /// In-flight and queued messages of the resumed session, to be
    /// delivered after CONNACK.
    pub resumed: Vec<PublishPacket>,

    /// Filters to drop from the trie because the client started clean.
    pub dropped_filters: Vec<String>,
}

/// Result of closing a connection.
#[derive(Debug, Default)]
pub struct CloseOutcome {
    pub client_id: String,

    /// Will message to publish right away.
    pub fire_will: Option<PublishPacket>,

    /// Filters to drop from the trie because the session ended.
    pub dropped_filters: Vec<String>,

    /// Unacknowledged messages of a taken-over connection, forwarded to the
    /// successor connection if it is online.
    pub forward_to: Option<SessionGid>,
    pub forward: Vec<PublishPacket>,
}

/// Where a fan-out delivery for one client should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Online(SessionGid, ProtocolLevel),
    Offline,
    Unknown,
}

/// Wills fired and sessions expired during one housekeeping tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// (publishing client id, will packet)
    pub fired_wills: Vec<(String, PublishPacket)>,

    /// (client id, filters to drop from the trie)
    pub expired: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, ClientRecord>,
    gids: HashMap<SessionGid, String>,
    wills: HashMap<SessionGid, Will>,
    armed: Vec<ArmedWill>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly authenticated connection.
    pub fn register(
        &mut self,
        client_id: &str,
        gid: SessionGid,
        level: ProtocolLevel,
        clean_start: bool,
        session_expiry: u32,
        will: Option<Will>,
    ) -> RegisterOutcome {
        let mut outcome = RegisterOutcome::default();

        // A reconnect before the will delay has passed cancels the armed
        // will [MQTT-3.1.3-9].
        self.armed.retain(|armed| armed.client_id != client_id);

        if let Some(record) = self.clients.get_mut(client_id) {
            if let Some(old_gid) = record.gid {
                outcome.took_over = Some(old_gid);
            }

            if clean_start {
                outcome.dropped_filters = record.subscriptions.drain().collect();
                *record = ClientRecord::new(gid, level, session_expiry);
            } else {
                outcome.session_present = true;
                record.gid = Some(gid);
                record.level = level;
                record.session_expiry = session_expiry;
                record.expires_at = None;
                outcome.resumed = record.queued.drain(..).collect();
            }
        } else {
            self.clients.insert(
                client_id.to_string(),
                ClientRecord::new(gid, level, session_expiry),
            );
        }

        self.gids.insert(gid, client_id.to_string());
        if let Some(will) = will {
            self.wills.insert(gid, will);
        }

        outcome
    }

    /// Process a closed connection. Returns None for connections the
    /// registry never saw, like those rejected before CONNACK.
    pub fn close(
        &mut self,
        gid: SessionGid,
        info: SessionCloseInfo,
        now: Instant,
    ) -> Option<CloseOutcome> {
        let client_id = self.gids.remove(&gid)?;
        let will = self.wills.remove(&gid);

        let mut outcome = CloseOutcome {
            client_id: client_id.clone(),
            ..CloseOutcome::default()
        };

        let mut expiry = None;
        let mut drop_record = false;

        if let Some(record) = self.clients.get_mut(&client_id) {
            if record.gid == Some(gid) {
                record.gid = None;
                if let Some(expiry_override) = info.expiry_override {
                    record.session_expiry = expiry_override;
                }

                // Unacknowledged QoS 1/2 messages are queued for
                // retransmission on the next connection of this session.
                for packet in info.inflight_out {
                    record.queue(&client_id, packet);
                }

                expiry = record_expiry(record);
                if record.session_expiry == 0 {
                    outcome.dropped_filters = record.subscriptions.drain().collect();
                    drop_record = true;
                } else if let Some(expiry) = expiry {
                    record.expires_at = Some(now + expiry);
                }
            } else {
                // Taken over in the meantime. The successor inherits the
                // unacknowledged messages; the will of this connection is
                // still processed below.
                if record.gid.is_some() {
                    outcome.forward_to = record.gid;
                    outcome.forward = info.inflight_out;
                } else {
                    for packet in info.inflight_out {
                        record.queue(&client_id, packet);
                    }
                }
                expiry = record_expiry(record);
            }
        }

        if drop_record {
            self.clients.remove(&client_id);
        }

        if info.publish_will {
            process_will(&mut self.armed, &client_id, will, expiry, now, &mut outcome);
        }

        Some(outcome)
    }

    /// Find the client id owning `gid`.
    #[must_use]
    pub fn client_id_of(&self, gid: SessionGid) -> Option<&str> {
        self.gids.get(&gid).map(String::as_str)
    }

    /// Current delivery target for `client_id`.
    #[must_use]
    pub fn target(&self, client_id: &str) -> Target {
        match self.clients.get(client_id) {
            Some(record) => record.gid.map_or(Target::Offline, |gid| {
                Target::Online(gid, record.level)
            }),
            None => Target::Unknown,
        }
    }

    /// Queue a message for an offline persistent session.
    pub fn queue_offline(&mut self, client_id: &str, packet: PublishPacket) {
        if let Some(record) = self.clients.get_mut(client_id) {
            record.queue(client_id, packet);
        }
    }

    /// Remember that `client_id` subscribed `filter`. Returns true if the
    /// subscription already existed.
    pub fn add_subscription(&mut self, client_id: &str, filter: &str) -> bool {
        self.clients
            .get_mut(client_id)
            .is_some_and(|record| !record.subscriptions.insert(filter.to_string()))
    }

    /// Forget a subscription. Returns true if it existed.
    pub fn remove_subscription(&mut self, client_id: &str, filter: &str) -> bool {
        self.clients
            .get_mut(client_id)
            .is_some_and(|record| record.subscriptions.remove(filter))
    }

    /// Fire due wills and expire timed-out sessions.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        let mut index = 0;
        while index < self.armed.len() {
            if self.armed[index].fire_at <= now {
                let armed = self.armed.swap_remove(index);
                outcome.fired_wills.push((armed.client_id, armed.packet));
            } else {
                index += 1;
            }
        }

        let expired_ids: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, record)| {
                record.gid.is_none() && record.expires_at.is_some_and(|at| at <= now)
            })
            .map(|(client_id, _)| client_id.clone())
            .collect();
        for client_id in expired_ids {
            if let Some(mut record) = self.clients.remove(&client_id) {
                log::info!("sessions: Session of {client_id} expired");
                let filters = record.subscriptions.drain().collect();
                outcome.expired.push((client_id, filters));
            }
        }

        outcome
    }

    /// Number of known sessions, online and offline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn process_will(
    armed: &mut Vec<ArmedWill>,
    client_id: &str,
    will: Option<Will>,
    expiry: Option<Duration>,
    now: Instant,
    outcome: &mut CloseOutcome,
) {
    let Some(will) = will else {
        return;
    };

    if will.delay == 0 {
        outcome.fire_will = Some(will.packet);
        return;
    }

    // The will fires after the delay interval or at session expiry,
    // whichever comes first.
    let mut delay = Duration::from_secs(u64::from(will.delay));
    if let Some(expiry) = expiry {
        delay = delay.min(expiry);
    }
    armed.push(ArmedWill {
        client_id: client_id.to_string(),
        fire_at: now + delay,
        packet: will.packet,
    });
}

fn record_expiry(record: &ClientRecord) -> Option<Duration> {
    if record.session_expiry == constants::SESSION_NEVER_EXPIRES {
        None
    } else {
        Some(Duration::from_secs(u64::from(record.session_expiry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::QoS;

    fn gid(n: u64) -> SessionGid {
        SessionGid::new(1, n)
    }

    fn close_info(clean: bool, publish_will: bool) -> SessionCloseInfo {
        SessionCloseInfo {
            clean,
            publish_will,
            expiry_override: None,
            inflight_out: Vec::new(),
        }
    }

    #[test]
    fn test_clean_session_is_not_present() {
        let mut registry = ClientRegistry::new();
        let outcome = registry.register("a", gid(1), ProtocolLevel::V311, true, 0, None);
        assert!(!outcome.session_present);
        assert!(outcome.took_over.is_none());
    }

    #[test]
    fn test_takeover_keeps_subscriptions() {
        let mut registry = ClientRegistry::new();
        registry.register(
            "c",
            gid(1),
            ProtocolLevel::V311,
            false,
            constants::SESSION_NEVER_EXPIRES,
            None,
        );
        registry.add_subscription("c", "a/b");

        let outcome = registry.register(
            "c",
            gid(2),
            ProtocolLevel::V311,
            false,
            constants::SESSION_NEVER_EXPIRES,
            None,
        );
        assert!(outcome.session_present);
        assert_eq!(outcome.took_over, Some(gid(1)));
        assert!(outcome.dropped_filters.is_empty());
        assert_eq!(registry.target("c"), Target::Online(gid(2), ProtocolLevel::V311));
    }

    #[test]
    fn test_clean_start_discards_state() {
        let mut registry = ClientRegistry::new();
        registry.register(
            "c",
            gid(1),
            ProtocolLevel::V5,
            false,
            constants::SESSION_NEVER_EXPIRES,
            None,
        );
        registry.add_subscription("c", "a/b");
        registry
            .close(gid(1), close_info(true, false), Instant::now())
            .unwrap();

        let outcome = registry.register("c", gid(2), ProtocolLevel::V5, true, 0, None);
        assert!(!outcome.session_present);
        assert_eq!(outcome.dropped_filters, vec!["a/b".to_string()]);
    }

    #[test]
    fn test_offline_queue_resumed() {
        let mut registry = ClientRegistry::new();
        registry.register(
            "c",
            gid(1),
            ProtocolLevel::V311,
            false,
            constants::SESSION_NEVER_EXPIRES,
            None,
        );
        registry
            .close(gid(1), close_info(false, true), Instant::now())
            .unwrap();
        assert_eq!(registry.target("c"), Target::Offline);

        let packet = PublishPacket::new("t", QoS::AtLeastOnce, b"m").unwrap();
        registry.queue_offline("c", packet);

        let outcome = registry.register(
            "c",
            gid(2),
            ProtocolLevel::V311,
            false,
            constants::SESSION_NEVER_EXPIRES,
            None,
        );
        assert!(outcome.session_present);
        assert_eq!(outcome.resumed.len(), 1);
    }

    #[test]
    fn test_will_fired_on_abnormal_close() {
        let mut registry = ClientRegistry::new();
        let will = Will {
            packet: PublishPacket::new("lwt", QoS::AtLeastOnce, b"down").unwrap(),
            delay: 0,
        };
        registry.register("c", gid(1), ProtocolLevel::V311, true, 0, Some(will));

        let outcome = registry
            .close(gid(1), close_info(false, true), Instant::now())
            .unwrap();
        let will = outcome.fire_will.unwrap();
        assert_eq!(will.topic(), "lwt");
    }

    #[test]
    fn test_will_suppressed_on_clean_close() {
        let mut registry = ClientRegistry::new();
        let will = Will {
            packet: PublishPacket::new("lwt", QoS::AtMostOnce, b"down").unwrap(),
            delay: 0,
        };
        registry.register("c", gid(1), ProtocolLevel::V311, true, 0, Some(will));

        let outcome = registry
            .close(gid(1), close_info(true, false), Instant::now())
            .unwrap();
        assert!(outcome.fire_will.is_none());
    }

    #[test]
    fn test_delayed_will_cancelled_by_reconnect() {
        let mut registry = ClientRegistry::new();
        let will = Will {
            packet: PublishPacket::new("lwt", QoS::AtMostOnce, b"down").unwrap(),
            delay: 30,
        };
        registry.register(
            "c",
            gid(1),
            ProtocolLevel::V5,
            false,
            constants::SESSION_NEVER_EXPIRES,
            Some(will),
        );
        let now = Instant::now();
        let outcome = registry.close(gid(1), close_info(false, true), now).unwrap();
        assert!(outcome.fire_will.is_none());

        registry.register(
            "c",
            gid(2),
            ProtocolLevel::V5,
            false,
            constants::SESSION_NEVER_EXPIRES,
            None,
        );
        let tick = registry.tick(now + Duration::from_secs(60));
        assert!(tick.fired_wills.is_empty());
    }

    #[test]
    fn test_delayed_will_fires_after_delay() {
        let mut registry = ClientRegistry::new();
        let will = Will {
            packet: PublishPacket::new("lwt", QoS::AtMostOnce, b"down").unwrap(),
            delay: 30,
        };
        registry.register(
            "c",
            gid(1),
            ProtocolLevel::V5,
            false,
            constants::SESSION_NEVER_EXPIRES,
            Some(will),
        );
        let now = Instant::now();
        registry.close(gid(1), close_info(false, true), now).unwrap();

        assert!(registry.tick(now + Duration::from_secs(10)).fired_wills.is_empty());
        let tick = registry.tick(now + Duration::from_secs(31));
        assert_eq!(tick.fired_wills.len(), 1);
        assert_eq!(tick.fired_wills[0].0, "c");
    }

    #[test]
    fn test_session_expiry_drops_record() {
        let mut registry = ClientRegistry::new();
        registry.register("c", gid(1), ProtocolLevel::V5, false, 5, None);
        registry.add_subscription("c", "f/+");
        let now = Instant::now();
        registry.close(gid(1), close_info(false, true), now).unwrap();

        assert!(registry.tick(now + Duration::from_secs(4)).expired.is_empty());
        let tick = registry.tick(now + Duration::from_secs(6));
        assert_eq!(tick.expired.len(), 1);
        assert_eq!(tick.expired[0].1, vec!["f/+".to_string()]);
        assert_eq!(registry.target("c"), Target::Unknown);
    }

    #[test]
    fn test_zero_expiry_drops_immediately() {
        let mut registry = ClientRegistry::new();
        registry.register("c", gid(1), ProtocolLevel::V5, false, 0, None);
        registry.add_subscription("c", "f");
        let outcome = registry
            .close(gid(1), close_info(true, false), Instant::now())
            .unwrap();
        assert_eq!(outcome.dropped_filters, vec!["f".to_string()]);
        assert_eq!(registry.target("c"), Target::Unknown);
    }
}
