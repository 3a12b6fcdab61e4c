// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

/// Capacity of mpsc channels between listener, sessions and dispatcher.
pub const CHANNEL_CAPACITY: usize = 64;

/// Maximum number of messages queued for an offline persistent session.
/// Older messages are dropped first when the queue is full.
pub const OFFLINE_QUEUE_CAPACITY: usize = 1000;

/// Maximum number of QoS 1/2 messages waiting for a free in-flight slot
/// on one connection.
pub const PENDING_QUEUE_CAPACITY: usize = 1024;

/// Deadline for a single write on a client socket. The connection is closed
/// when a write takes longer.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Period of the housekeeping timers in session and dispatcher tasks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Session expiry interval value which means the session never expires.
pub const SESSION_NEVER_EXPIRES: u32 = 0xffff_ffff;
