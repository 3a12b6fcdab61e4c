// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Trie index over topic filters.
//!
//! Filters are split on `/` into path segments. Each node holds a map of
//! literal children plus one optional child for the `+` wildcard and one for
//! the `#` wildcard. Matching a topic name walks literal, `+` and `#`
//! branches at every level and collects all registrations, so one PUBLISH
//! finds every subscriber in O(depth) per branch.

use std::collections::HashMap;

use codec::SubscribeTopic;

/// One subscription entry stored in the trie.
///
/// Registrations are keyed by client id, not connection id, because
/// a persistent session keeps its subscriptions across reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub client_id: String,
    pub options: SubscribeTopic,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,

    /// `+` child, matches exactly one level.
    match_one: Option<Box<TrieNode>>,

    /// `#` child, matches the remaining path including its own level.
    /// Valid only as the last segment of a filter.
    match_all: Option<Box<TrieNode>>,

    subscribers: Vec<Registration>,
}

impl TrieNode {
    fn insert(&mut self, segments: &[&str], registration: Registration) {
        let Some((first, rest)) = segments.split_first() else {
            // Re-subscribing to the same filter replaces the prior entry
            // of this session [MQTT-3.8.4-3].
            self.subscribers
                .retain(|r| r.client_id != registration.client_id);
            self.subscribers.push(registration);
            return;
        };

        match *first {
            "+" => {
                self.match_one
                    .get_or_insert_with(Box::default)
                    .insert(rest, registration);
            }
            "#" => {
                self.match_all
                    .get_or_insert_with(Box::default)
                    .insert(rest, registration);
            }
            _ => {
                self.children
                    .entry((*first).to_string())
                    .or_default()
                    .insert(rest, registration);
            }
        }
    }

    /// Remove `client_id` at the node addressed by `segments`. Returns true
    /// if a registration was removed.
    fn remove(&mut self, segments: &[&str], client_id: &str) -> bool {
        let Some((first, rest)) = segments.split_first() else {
            let before = self.subscribers.len();
            self.subscribers.retain(|r| r.client_id != client_id);
            return self.subscribers.len() < before;
        };

        let removed = match *first {
            "+" => self
                .match_one
                .as_mut()
                .is_some_and(|node| node.remove(rest, client_id)),
            "#" => self
                .match_all
                .as_mut()
                .is_some_and(|node| node.remove(rest, client_id)),
            _ => self
                .children
                .get_mut(*first)
                .is_some_and(|node| node.remove(rest, client_id)),
        };

        if removed {
            self.prune(first);
        }
        removed
    }

    /// Drop the child for `segment` if nothing is registered below it.
    fn prune(&mut self, segment: &str) {
        match segment {
            "+" => {
                if self.match_one.as_ref().is_some_and(|node| node.is_empty()) {
                    self.match_one = None;
                }
            }
            "#" => {
                if self.match_all.as_ref().is_some_and(|node| node.is_empty()) {
                    self.match_all = None;
                }
            }
            _ => {
                if self.children.get(segment).is_some_and(TrieNode::is_empty) {
                    self.children.remove(segment);
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
            && self.children.is_empty()
            && self.match_one.is_none()
            && self.match_all.is_none()
    }

    fn collect<'a>(&'a self, segments: &[&str], at_root: bool, out: &mut Vec<&'a Registration>) {
        let Some((first, rest)) = segments.split_first() else {
            out.extend(self.subscribers.iter());
            // `sport/#` also matches `sport`: the `#` wildcard covers its
            // own parent level [MQTT-4.7.1-2].
            if let Some(match_all) = &self.match_all {
                out.extend(match_all.subscribers.iter());
            }
            return;
        };

        if let Some(child) = self.children.get(*first) {
            child.collect(rest, false, out);
        }

        // A topic name beginning with `$` must not be matched by filters
        // starting with a wildcard [MQTT-4.7.2-1].
        let hidden = at_root && first.starts_with('$');
        if !hidden {
            if let Some(match_one) = &self.match_one {
                match_one.collect(rest, false, out);
            }
            if let Some(match_all) = &self.match_all {
                out.extend(match_all.subscribers.iter());
            }
        }
    }
}

/// Subscription index shared by all sessions, owned by the dispatcher task.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct SubTrie {
    root: TrieNode,
}

impl SubTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `options` for `client_id`, replacing a prior subscription
    /// to the same filter.
    pub fn subscribe(&mut self, client_id: &str, options: SubscribeTopic) {
        let filter = options.topic().to_string();
        let segments: Vec<&str> = filter.split('/').collect();
        let registration = Registration {
            client_id: client_id.to_string(),
            options,
        };
        self.root.insert(&segments, registration);
    }

    /// Remove the registration of `client_id` for `filter`. Returns true
    /// if such a registration existed.
    pub fn unsubscribe(&mut self, client_id: &str, filter: &str) -> bool {
        let segments: Vec<&str> = filter.split('/').collect();
        self.root.remove(&segments, client_id)
    }

    /// Find every registration whose filter matches `topic`.
    #[must_use]
    pub fn matches(&self, topic: &str) -> Vec<&Registration> {
        let segments: Vec<&str> = topic.split('/').collect();
        let mut out = Vec::new();
        self.root.collect(&segments, true, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::QoS;

    fn sub(trie: &mut SubTrie, client_id: &str, filter: &str, qos: QoS) {
        trie.subscribe(client_id, SubscribeTopic::new(filter, qos).unwrap());
    }

    fn matched_clients(trie: &SubTrie, topic: &str) -> Vec<String> {
        let mut clients: Vec<String> = trie
            .matches(topic)
            .iter()
            .map(|r| r.client_id.clone())
            .collect();
        clients.sort();
        clients
    }

    #[test]
    fn test_exact_match() {
        let mut trie = SubTrie::new();
        sub(&mut trie, "a", "sensors/room1/temp", QoS::AtMostOnce);

        assert_eq!(matched_clients(&trie, "sensors/room1/temp"), ["a"]);
        assert!(trie.matches("sensors/room2/temp").is_empty());
        assert!(trie.matches("sensors/room1").is_empty());
    }

    #[test]
    fn test_single_level_wildcard() {
        let mut trie = SubTrie::new();
        sub(&mut trie, "b", "a/+/c", QoS::AtMostOnce);

        assert_eq!(matched_clients(&trie, "a/b/c"), ["b"]);
        // Empty segment counts as one level.
        assert_eq!(matched_clients(&trie, "a//c"), ["b"]);
        assert!(trie.matches("a/b/d/c").is_empty());
        assert!(trie.matches("a/b").is_empty());
    }

    #[test]
    fn test_multi_level_wildcard() {
        let mut trie = SubTrie::new();
        sub(&mut trie, "c", "dev/#", QoS::AtMostOnce);

        assert_eq!(matched_clients(&trie, "dev/cpu"), ["c"]);
        assert_eq!(matched_clients(&trie, "dev/cpu/0/temp"), ["c"]);
        // `#` matches the parent level itself.
        assert_eq!(matched_clients(&trie, "dev"), ["c"]);
        assert!(trie.matches("other/cpu").is_empty());
    }

    #[test]
    fn test_overlapping_subscriptions_all_found() {
        let mut trie = SubTrie::new();
        sub(&mut trie, "x", "sensors/+/temp", QoS::AtMostOnce);
        sub(&mut trie, "y", "sensors/#", QoS::AtLeastOnce);
        sub(&mut trie, "z", "sensors/room1/temp", QoS::ExactOnce);

        assert_eq!(
            matched_clients(&trie, "sensors/room1/temp"),
            ["x", "y", "z"]
        );
    }

    #[test]
    fn test_dollar_topics_hidden_from_top_level_wildcards() {
        let mut trie = SubTrie::new();
        sub(&mut trie, "a", "#", QoS::AtMostOnce);
        sub(&mut trie, "b", "+/uptime", QoS::AtMostOnce);
        sub(&mut trie, "c", "$SYS/uptime", QoS::AtMostOnce);
        sub(&mut trie, "d", "$SYS/#", QoS::AtMostOnce);

        assert_eq!(matched_clients(&trie, "$SYS/uptime"), ["c", "d"]);
        assert_eq!(matched_clients(&trie, "host/uptime"), ["a", "b"]);
    }

    #[test]
    fn test_resubscribe_replaces() {
        let mut trie = SubTrie::new();
        sub(&mut trie, "a", "top", QoS::AtMostOnce);
        sub(&mut trie, "a", "top", QoS::ExactOnce);

        let matches = trie.matches("top");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].options.qos(), QoS::ExactOnce);
    }

    #[test]
    fn test_unsubscribe_and_prune() {
        let mut trie = SubTrie::new();
        sub(&mut trie, "a", "deep/n1/n2/n3", QoS::AtMostOnce);
        sub(&mut trie, "b", "deep/+", QoS::AtMostOnce);

        assert!(trie.unsubscribe("a", "deep/n1/n2/n3"));
        assert!(!trie.unsubscribe("a", "deep/n1/n2/n3"));
        assert!(trie.matches("deep/n1/n2/n3").is_empty());
        assert_eq!(matched_clients(&trie, "deep/n1"), ["b"]);

        assert!(trie.unsubscribe("b", "deep/+"));
        assert!(trie.root.is_empty());
    }
}
