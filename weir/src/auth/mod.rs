// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Connection authentication hook.

use codec::ReasonCode;

use crate::config::Security;

/// Decides whether a connecting client is allowed in.
///
/// The returned reason code is sent back in CONNACK when access is denied.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, client_id: &str, username: &str, password: &[u8])
        -> (bool, ReasonCode);
}

/// Accepts every client, the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAnonymous;

impl Authenticator for AllowAnonymous {
    fn authenticate(
        &self,
        _client_id: &str,
        _username: &str,
        _password: &[u8],
    ) -> (bool, ReasonCode) {
        (true, ReasonCode::Success)
    }
}

/// Rejects clients which connect without a username.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAnonymous;

impl Authenticator for DenyAnonymous {
    fn authenticate(
        &self,
        client_id: &str,
        username: &str,
        _password: &[u8],
    ) -> (bool, ReasonCode) {
        if username.is_empty() {
            log::info!("auth: Rejected anonymous client: {client_id}");
            (false, ReasonCode::NotAuthorized)
        } else {
            (true, ReasonCode::Success)
        }
    }
}

/// Build the authenticator selected by the `[security]` config section.
#[must_use]
pub fn from_config(security: &Security) -> Box<dyn Authenticator> {
    if security.allow_anonymous() {
        Box::new(AllowAnonymous)
    } else {
        Box::new(DenyAnonymous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_anonymous() {
        let auth = AllowAnonymous;
        let (allow, reason) = auth.authenticate("c1", "", b"");
        assert!(allow);
        assert_eq!(reason, ReasonCode::Success);
    }

    #[test]
    fn test_deny_anonymous() {
        let auth = DenyAnonymous;
        let (allow, reason) = auth.authenticate("c1", "", b"");
        assert!(!allow);
        assert_eq!(reason, ReasonCode::NotAuthorized);

        let (allow, _) = auth.authenticate("c1", "alice", b"secret");
        assert!(allow);
    }
}
