// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Retained message table.

use std::collections::HashMap;

use codec::PublishPacket;

/// The last PUBLISH with `retain=1` per topic name.
///
/// If the Server receives a PUBLISH packet with the RETAIN flag set to 1 it
/// MUST replace any existing retained message for this topic [MQTT-3.3.1-5].
/// A payload of zero bytes removes the existing retained message instead,
/// and MUST NOT be stored [MQTT-3.3.1-6/7].
#[derive(Debug, Default)]
pub struct RetainedStore {
    messages: HashMap<String, PublishPacket>,
}

impl RetainedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or remove the retained message for the packet's topic.
    pub fn store(&mut self, packet: &PublishPacket) {
        if packet.message().is_empty() {
            if self.messages.remove(packet.topic()).is_some() {
                log::info!("retain: Removed retained message of {}", packet.topic());
            }
        } else {
            self.messages
                .insert(packet.topic().to_string(), packet.clone());
        }
    }

    /// Collect retained messages whose topic matches `filter`.
    ///
    /// The filter has been validated at decode, so it is matched with
    /// a simple per-level walk here; the retained table is keyed by topic
    /// name, not by filter, and cannot reuse the subscription trie.
    #[must_use]
    pub fn matches(&self, filter: &str) -> Vec<&PublishPacket> {
        let segments: Vec<&str> = filter.split('/').collect();
        self.messages
            .iter()
            .filter(|(topic, _)| filter_matches(&segments, topic))
            .map(|(_, packet)| packet)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Check one topic name against the segments of a validated filter.
fn filter_matches(filter_segments: &[&str], topic: &str) -> bool {
    let mut topic_segments = topic.split('/');

    // Wildcard filters do not match topics starting with `$` [MQTT-4.7.2-1].
    if topic.starts_with('$') && matches!(filter_segments.first(), Some(&"+") | Some(&"#")) {
        return false;
    }

    for filter_segment in filter_segments {
        // `a/#` matches `a` itself and everything below it.
        if *filter_segment == "#" {
            return true;
        }
        let Some(topic_segment) = topic_segments.next() else {
            return false;
        };
        if *filter_segment != "+" && *filter_segment != topic_segment {
            return false;
        }
    }

    topic_segments.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::QoS;

    fn packet(topic: &str, payload: &[u8]) -> PublishPacket {
        let mut packet = PublishPacket::new(topic, QoS::AtLeastOnce, payload).unwrap();
        packet.set_retain(true);
        packet
    }

    #[test]
    fn test_store_and_replace() {
        let mut store = RetainedStore::new();
        store.store(&packet("status", b"on"));
        store.store(&packet("status", b"off"));

        let matches = store.matches("status");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].message(), b"off");
    }

    #[test]
    fn test_empty_payload_removes() {
        let mut store = RetainedStore::new();
        store.store(&packet("status", b"on"));
        store.store(&packet("status", b""));

        assert!(store.is_empty());
        assert!(store.matches("status").is_empty());
    }

    #[test]
    fn test_empty_payload_never_stored() {
        let mut store = RetainedStore::new();
        store.store(&packet("status", b""));
        assert!(store.is_empty());
    }

    #[test]
    fn test_wildcard_lookup() {
        let mut store = RetainedStore::new();
        store.store(&packet("sensors/room1/temp", b"20"));
        store.store(&packet("sensors/room2/temp", b"21"));
        store.store(&packet("sensors/room2/hum", b"40"));

        assert_eq!(store.matches("sensors/+/temp").len(), 2);
        assert_eq!(store.matches("sensors/#").len(), 3);
        assert_eq!(store.matches("sensors/room2/hum").len(), 1);
        assert!(store.matches("other/#").is_empty());
    }

    #[test]
    fn test_dollar_topic_needs_literal_filter() {
        let mut store = RetainedStore::new();
        store.store(&packet("$SYS/broker/uptime", b"1"));

        assert!(store.matches("#").is_empty());
        assert!(store.matches("+/broker/uptime").is_empty());
        assert_eq!(store.matches("$SYS/broker/uptime").len(), 1);
        assert_eq!(store.matches("$SYS/#").len(), 1);
    }
}
