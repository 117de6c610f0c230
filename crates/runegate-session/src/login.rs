//! Local login-block validation.
//!
//! Everything that can be checked without the authenticator is checked
//! here first, so a broken or outdated client never costs an
//! authentication round trip. Each rule maps to its own response code
//! and the rules are applied in a fixed order: the first failure wins.

use runegate_protocol::{LoginBlock, ResponseCode};

/// Magic byte every login block starts with.
pub const LOGIN_MAGIC: u8 = 255;

/// Block operation code of an unencrypted login block.
pub const BLOCK_OPERATION: u8 = 10;

/// Revision of the reference client.
pub const DEFAULT_CLIENT_VERSION: u16 = 317;

/// What a login block must look like to reach the authenticator.
#[derive(Debug, Clone)]
pub struct LoginPolicy {
    /// Only this client version is accepted.
    pub client_version: u16,
    /// Require the server half of the session keys to match the key sent
    /// in the handshake response.
    pub verify_server_key: bool,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            client_version: DEFAULT_CLIENT_VERSION,
            verify_server_key: true,
        }
    }
}

/// Checks a login block against `policy`.
///
/// Returns the four session keys on success. On failure returns the code
/// the client should be sent:
///
/// | rule                               | code                          |
/// |------------------------------------|-------------------------------|
/// | magic byte is 255                  | `LoginServerRejectedSession`  |
/// | client version matches             | `GameUpdated`                 |
/// | detail is 0 or 1                   | `LoginServerRejectedSession`  |
/// | block operation is 10              | `LoginServerRejectedSession`  |
/// | exactly four session keys          | `BadSessionId`                |
/// | keys 2 and 3 rebuild `server_key`  | `BadSessionId`                |
pub fn validate_login(
    block: &LoginBlock,
    policy: &LoginPolicy,
    server_key: u64,
) -> Result<[u32; 4], ResponseCode> {
    if block.magic != LOGIN_MAGIC {
        tracing::debug!(magic = block.magic, "login rejected: bad magic");
        return Err(ResponseCode::LoginServerRejectedSession);
    }
    if block.client_version != policy.client_version {
        tracing::debug!(
            version = block.client_version,
            expected = policy.client_version,
            "login rejected: client version"
        );
        return Err(ResponseCode::GameUpdated);
    }
    if block.detail > 1 {
        tracing::debug!(detail = block.detail, "login rejected: detail flag");
        return Err(ResponseCode::LoginServerRejectedSession);
    }
    if block.block_operation != BLOCK_OPERATION {
        tracing::debug!(
            op = block.block_operation,
            "login rejected: block operation"
        );
        return Err(ResponseCode::LoginServerRejectedSession);
    }

    let keys: [u32; 4] = block.session_keys.as_slice().try_into().map_err(|_| {
        tracing::debug!(
            count = block.session_keys.len(),
            "login rejected: session key count"
        );
        ResponseCode::BadSessionId
    })?;

    if policy.verify_server_key {
        let echoed = (u64::from(keys[2]) << 32) | u64::from(keys[3]);
        if echoed != server_key {
            tracing::debug!("login rejected: server key mismatch");
            return Err(ResponseCode::BadSessionId);
        }
    }

    Ok(keys)
}
