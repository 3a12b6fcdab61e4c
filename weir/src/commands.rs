// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Command enums exchanged between the session, listener and dispatcher tasks.

use codec::{
    ConnectAckPacket, ConnectPacket, PublishPacket, ReasonCode, SubscribeAckPacket,
    SubscribePacket, UnsubscribeAckPacket, UnsubscribePacket,
};

use crate::types::{SessionGid, SessionId};

/// State a closing session hands back to the dispatcher.
#[derive(Debug, Clone)]
pub struct SessionCloseInfo {
    /// True for a clean DISCONNECT initiated by the client.
    pub clean: bool,

    /// True if the will message must be published. Set on abnormal close,
    /// and on a 5.0 DISCONNECT with reason 0x04 (Disconnect with Will Message).
    pub publish_will: bool,

    /// New session expiry interval from a 5.0 DISCONNECT, if any.
    pub expiry_override: Option<u32>,

    /// Unacknowledged outbound QoS 1/2 messages, retransmitted when
    /// a persistent session resumes.
    pub inflight_out: Vec<PublishPacket>,
}

#[derive(Debug, Clone)]
pub enum SessionToListenerCmd {
    /// CONNECT packet arrived and passed packet level validation.
    Connect(SessionId, ConnectPacket),

    /// A message is ready for fan-out. Sent at ingress for QoS 0/1 and at
    /// PUBREL for QoS 2.
    Publish(SessionId, PublishPacket),

    Subscribe(SessionId, SubscribePacket),

    Unsubscribe(SessionId, UnsubscribePacket),

    /// Connection is gone, carries the state snapshot.
    Disconnect(SessionId, SessionCloseInfo),
}

#[derive(Debug, Clone)]
pub enum ListenerToSessionCmd {
    /// Accepted or not; the publish list carries resumed in-flight and
    /// queued messages of a persistent session, delivered after the ack.
    ConnectAck(ConnectAckPacket, Vec<PublishPacket>),

    /// Deliver a message to this subscriber. Effective QoS and retain flag
    /// are already applied; the session allocates the packet id.
    Publish(PublishPacket),

    /// Ack plus matching retained messages, delivered after the ack.
    SubscribeAck(SubscribeAckPacket, Vec<PublishPacket>),

    UnsubscribeAck(UnsubscribeAckPacket),

    /// Close the connection, sending a DISCONNECT with this reason first
    /// on 5.0 connections. Used for take-over and server shutdown.
    Disconnect(ReasonCode),
}

#[derive(Debug, Clone)]
pub enum ListenerToDispatcherCmd {
    /// Connection authenticated; `assigned_id` is set when the listener
    /// generated a client id for an empty one.
    SessionConnected(SessionGid, ConnectPacket, Option<String>),

    Publish(SessionGid, PublishPacket),

    Subscribe(SessionGid, SubscribePacket),

    Unsubscribe(SessionGid, UnsubscribePacket),

    SessionClosed(SessionGid, SessionCloseInfo),
}

#[derive(Debug, Clone)]
pub enum DispatcherToListenerCmd {
    ConnectAck(SessionId, ConnectAckPacket, Vec<PublishPacket>),

    Publish(SessionId, PublishPacket),

    SubscribeAck(SessionId, SubscribeAckPacket, Vec<PublishPacket>),

    UnsubscribeAck(SessionId, UnsubscribeAckPacket),

    /// Disconnect an existing session, e.g. when its client id is taken over.
    Disconnect(SessionId, ReasonCode),
}
