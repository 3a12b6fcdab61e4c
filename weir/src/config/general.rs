// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

/// General section in config file.
#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Time interval to send $SYS messages in seconds.
    ///
    /// 0 disables the $SYS tree.
    ///
    /// Default is 3.
    #[serde(default = "General::default_sys_interval")]
    sys_interval: u32,
}

impl General {
    #[must_use]
    pub const fn default_sys_interval() -> u32 {
        3
    }

    #[must_use]
    pub const fn sys_interval(&self) -> u32 {
        self.sys_interval
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            sys_interval: Self::default_sys_interval(),
        }
    }
}
