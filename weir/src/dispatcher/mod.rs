// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The dispatcher task owns the process-wide registries: subscription trie,
//! retained message table and client session registry. All listeners talk
//! to it over one mpsc channel, so every routing decision is serialized and
//! no shared locks are needed on the fan-out path.

use std::collections::HashMap;
use std::time::Instant;

use codec::{
    ConnectAckPacket, ConnectPacket, PacketId, Property, PropertyType, ProtocolLevel,
    PublishPacket, QoS, ReasonCode, StringData, SubscribeAckPacket, SubscribePacket,
    UnsubscribeAckPacket, UnsubscribePacket,
};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::interval;

use crate::commands::{
    DispatcherToListenerCmd, ListenerToDispatcherCmd, SessionCloseInfo,
};
use crate::constants;
use crate::types::{ListenerId, SessionGid};

mod retain;
mod sessions;
mod trie;

pub use retain::RetainedStore;
pub use sessions::{ClientRegistry, Target, Will};
pub use trie::{Registration, SubTrie};

const SYS_UPTIME_TOPIC: &str = "$SYS/broker/uptime";

/// A delivery decided by the router, before it is sent to a listener or
/// queued for an offline session.
struct Delivery {
    client_id: String,
    target: Target,
    packet: PublishPacket,
}

#[derive(Debug)]
pub struct Dispatcher {
    receiver: Receiver<ListenerToDispatcherCmd>,
    listener_senders: HashMap<ListenerId, Sender<DispatcherToListenerCmd>>,

    sub_trie: SubTrie,
    retained: RetainedStore,
    clients: ClientRegistry,

    started_at: Instant,
    sys_interval: u32,
    sys_elapsed: u32,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        receiver: Receiver<ListenerToDispatcherCmd>,
        listener_senders: HashMap<ListenerId, Sender<DispatcherToListenerCmd>>,
        sys_interval: u32,
    ) -> Self {
        Self {
            receiver,
            listener_senders,
            sub_trie: SubTrie::new(),
            retained: RetainedStore::new(),
            clients: ClientRegistry::new(),
            started_at: Instant::now(),
            sys_interval,
            sys_elapsed: 0,
        }
    }

    /// Run until every listener has hung up.
    pub async fn run_loop(&mut self) {
        let mut timer = interval(constants::TICK_INTERVAL);
        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        log::info!("dispatcher: All listeners gone, stopping");
                        break;
                    };
                    self.handle_listener_cmd(cmd).await;
                }
                _ = timer.tick() => {
                    self.on_tick().await;
                }
            }
        }
    }

    async fn handle_listener_cmd(&mut self, cmd: ListenerToDispatcherCmd) {
        match cmd {
            ListenerToDispatcherCmd::SessionConnected(gid, packet, assigned_id) => {
                self.on_session_connected(gid, packet, assigned_id).await;
            }
            ListenerToDispatcherCmd::Publish(gid, packet) => {
                self.on_publish(gid, packet).await;
            }
            ListenerToDispatcherCmd::Subscribe(gid, packet) => {
                self.on_subscribe(gid, &packet).await;
            }
            ListenerToDispatcherCmd::Unsubscribe(gid, packet) => {
                self.on_unsubscribe(gid, &packet).await;
            }
            ListenerToDispatcherCmd::SessionClosed(gid, info) => {
                self.on_session_closed(gid, info).await;
            }
        }
    }

    async fn send_to_listener(&self, listener_id: ListenerId, cmd: DispatcherToListenerCmd) {
        if let Some(sender) = self.listener_senders.get(&listener_id) {
            if let Err(err) = sender.send(cmd).await {
                log::error!("dispatcher: Failed to send cmd to listener {listener_id}: {err:?}");
            }
        } else {
            log::error!("dispatcher: No listener with id {listener_id}");
        }
    }

    async fn on_session_connected(
        &mut self,
        gid: SessionGid,
        packet: ConnectPacket,
        assigned_id: Option<String>,
    ) {
        let client_id = packet.client_id().to_string();
        let level = packet.level();
        let clean_start = packet.clean_session();

        let session_expiry = match level {
            ProtocolLevel::V5 => packet
                .properties()
                .session_expiry_interval()
                .unwrap_or(0),
            _ if clean_start => 0,
            _ => constants::SESSION_NEVER_EXPIRES,
        };

        let will = build_will(&packet);

        let outcome = self
            .clients
            .register(&client_id, gid, level, clean_start, session_expiry, will);

        if let Some(old_gid) = outcome.took_over {
            log::info!("dispatcher: Session of {client_id} taken over by {gid:?}");
            self.send_to_listener(
                old_gid.listener_id(),
                DispatcherToListenerCmd::Disconnect(
                    old_gid.session_id(),
                    ReasonCode::SessionTakenOver,
                ),
            )
            .await;
        }

        for filter in &outcome.dropped_filters {
            self.sub_trie.unsubscribe(&client_id, filter);
        }

        let mut ack = ConnectAckPacket::new(outcome.session_present, ReasonCode::Success, level);
        if level == ProtocolLevel::V5 {
            if let Some(assigned_id) = assigned_id {
                if let Ok(assigned_id) = StringData::from(&assigned_id) {
                    let _ = ack
                        .properties_mut()
                        .push(Property::AssignedClientIdentifier(assigned_id));
                }
            }
        }

        // Messages of the resumed session are retransmitted after CONNACK,
        // with the dup flag raised on QoS 1/2 deliveries.
        let mut resumed = outcome.resumed;
        for packet in &mut resumed {
            if packet.qos() != QoS::AtMostOnce {
                let _ = packet.set_dup(true);
            }
            packet.set_level(level);
        }

        self.send_to_listener(
            gid.listener_id(),
            DispatcherToListenerCmd::ConnectAck(gid.session_id(), ack, resumed),
        )
        .await;
    }

    async fn on_publish(&mut self, gid: SessionGid, packet: PublishPacket) {
        let Some(publisher) = self.clients.client_id_of(gid) else {
            log::error!("dispatcher: Publish from unknown session {gid:?}");
            return;
        };
        let publisher = publisher.to_string();

        if packet.retain() {
            self.retained.store(&packet);
        }

        self.fan_out(Some(&publisher), &packet).await;
    }

    /// Route one message to every matching subscriber.
    async fn fan_out(&mut self, publisher: Option<&str>, packet: &PublishPacket) {
        let mut deliveries = Vec::new();
        for registration in self.sub_trie.matches(packet.topic()) {
            // No Local: do not echo to the publishing session [MQTT-3.8.3-3].
            if registration.options.no_local()
                && publisher == Some(registration.client_id.as_str())
            {
                continue;
            }

            let target = self.clients.target(&registration.client_id);
            if target == Target::Unknown {
                continue;
            }

            let mut out = packet.clone();
            // Deliver at the lower of the ingress QoS and the granted
            // maximum; the subscriber side session allocates the packet id.
            out.set_qos(packet.qos().min(registration.options.qos()));
            out.set_packet_id(PacketId::new(0));
            let _ = out.set_dup(false);
            out.set_retain(registration.options.retain_as_published() && packet.retain());

            deliveries.push(Delivery {
                client_id: registration.client_id.clone(),
                target,
                packet: out,
            });
        }

        for delivery in deliveries {
            match delivery.target {
                Target::Online(gid, level) => {
                    let mut out = delivery.packet;
                    out.set_level(level);
                    self.send_to_listener(
                        gid.listener_id(),
                        DispatcherToListenerCmd::Publish(gid.session_id(), out),
                    )
                    .await;
                }
                Target::Offline => {
                    // QoS 0 messages are not stored for offline sessions.
                    if delivery.packet.qos() != QoS::AtMostOnce {
                        self.clients.queue_offline(&delivery.client_id, delivery.packet);
                    }
                }
                Target::Unknown => {}
            }
        }
    }

    async fn on_subscribe(&mut self, gid: SessionGid, packet: &SubscribePacket) {
        let Some(client_id) = self.clients.client_id_of(gid) else {
            log::error!("dispatcher: Subscribe from unknown session {gid:?}");
            return;
        };
        let client_id = client_id.to_string();
        let Target::Online(_, level) = self.clients.target(&client_id) else {
            return;
        };

        let mut reasons = Vec::with_capacity(packet.topics().len());
        let mut retained_out = Vec::new();
        for topic in packet.topics() {
            let granted = topic.qos();
            reasons.push(match granted {
                QoS::AtMostOnce => ReasonCode::Success,
                QoS::AtLeastOnce => ReasonCode::GrantedQoS1,
                QoS::ExactOnce => ReasonCode::GrantedQoS2,
            });

            let existed = self.clients.add_subscription(&client_id, topic.topic());
            self.sub_trie.subscribe(&client_id, topic.clone());

            // Retain handling 0 always delivers, 1 only for new
            // subscriptions, 2 never [MQTT-3.3.1-9..11].
            let deliver_retained = match topic.retain_handling() {
                codec::RetainHandling::Send => true,
                codec::RetainHandling::SendFirst => !existed,
                codec::RetainHandling::NoSend => false,
            };
            if deliver_retained {
                for retained in self.retained.matches(topic.topic()) {
                    let mut out = retained.clone();
                    out.set_qos(retained.qos().min(granted));
                    out.set_packet_id(PacketId::new(0));
                    let _ = out.set_dup(false);
                    // Retained messages sent on subscribe carry retain=1.
                    out.set_retain(true);
                    out.set_level(level);
                    retained_out.push(out);
                }
            }
        }

        let ack = SubscribeAckPacket::with_reasons(packet.packet_id(), reasons, level);
        self.send_to_listener(
            gid.listener_id(),
            DispatcherToListenerCmd::SubscribeAck(gid.session_id(), ack, retained_out),
        )
        .await;
    }

    async fn on_unsubscribe(&mut self, gid: SessionGid, packet: &UnsubscribePacket) {
        let Some(client_id) = self.clients.client_id_of(gid) else {
            log::error!("dispatcher: Unsubscribe from unknown session {gid:?}");
            return;
        };
        let client_id = client_id.to_string();
        let Target::Online(_, level) = self.clients.target(&client_id) else {
            return;
        };

        let mut reasons = Vec::with_capacity(packet.topics().len());
        for topic in packet.topics() {
            let filter = topic.as_ref();
            let removed = self.sub_trie.unsubscribe(&client_id, filter);
            self.clients.remove_subscription(&client_id, filter);
            reasons.push(if removed {
                ReasonCode::Success
            } else {
                ReasonCode::NoSubscriptionExisted
            });
        }

        let ack = UnsubscribeAckPacket::with_reasons(packet.packet_id(), reasons, level);
        self.send_to_listener(
            gid.listener_id(),
            DispatcherToListenerCmd::UnsubscribeAck(gid.session_id(), ack),
        )
        .await;
    }

    async fn on_session_closed(&mut self, gid: SessionGid, info: SessionCloseInfo) {
        let clean = info.clean;
        let Some(outcome) = self.clients.close(gid, info, Instant::now()) else {
            return;
        };
        log::info!(
            "dispatcher: Session of {} closed ({})",
            outcome.client_id,
            if clean { "clean" } else { "abnormal" }
        );

        for filter in &outcome.dropped_filters {
            self.sub_trie.unsubscribe(&outcome.client_id, filter);
        }

        if let Some(forward_to) = outcome.forward_to {
            for packet in outcome.forward {
                self.send_to_listener(
                    forward_to.listener_id(),
                    DispatcherToListenerCmd::Publish(forward_to.session_id(), packet),
                )
                .await;
            }
        }

        if let Some(will) = outcome.fire_will {
            log::info!(
                "dispatcher: Publishing will of {} to {}",
                outcome.client_id,
                will.topic()
            );
            if will.retain() {
                self.retained.store(&will);
            }
            self.fan_out(Some(&outcome.client_id), &will).await;
        }
    }

    async fn on_tick(&mut self) {
        let tick = self.clients.tick(Instant::now());
        for (client_id, filters) in tick.expired {
            for filter in filters {
                self.sub_trie.unsubscribe(&client_id, &filter);
            }
        }
        for (client_id, will) in tick.fired_wills {
            log::info!("dispatcher: Publishing delayed will of {client_id}");
            if will.retain() {
                self.retained.store(&will);
            }
            self.fan_out(Some(&client_id), &will).await;
        }

        if self.sys_interval > 0 {
            self.sys_elapsed += 1;
            if self.sys_elapsed >= self.sys_interval {
                self.sys_elapsed = 0;
                self.publish_uptime().await;
            }
        }
    }

    /// Broadcast broker uptime on the `$SYS` tree. Only reaches literal
    /// `$SYS` subscriptions; top-level wildcards never match.
    async fn publish_uptime(&mut self) {
        let uptime = self.started_at.elapsed().as_secs().to_string();
        match PublishPacket::new(SYS_UPTIME_TOPIC, QoS::AtMostOnce, uptime.as_bytes()) {
            Ok(packet) => self.fan_out(None, &packet).await,
            Err(err) => log::error!("dispatcher: Failed to build uptime packet: {err:?}"),
        }
    }
}

/// Build the will message carried by a CONNECT packet, if any.
fn build_will(packet: &ConnectPacket) -> Option<Will> {
    if !packet.has_will() {
        return None;
    }
    let topic = packet.will_topic()?;

    let mut will = match PublishPacket::new(topic.as_ref(), packet.will_qos(), packet.will_message())
    {
        Ok(will) => will,
        Err(err) => {
            log::error!("dispatcher: Invalid will of {}: {err:?}", packet.client_id());
            return None;
        }
    };
    will.set_retain(packet.will_retain());

    let delay = packet.will_properties().will_delay_interval().unwrap_or(0);

    // Will properties travel with the published message, except the delay
    // interval which only controls when it is published.
    if packet.level() == ProtocolLevel::V5 {
        for property in packet.will_properties().props() {
            if property.property_type() == PropertyType::WillDelayInterval {
                continue;
            }
            let _ = will.properties_mut().push(property.clone());
        }
    }

    Some(Will {
        packet: will,
        delay,
    })
}
