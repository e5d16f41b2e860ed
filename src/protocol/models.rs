//! Registration API request and response structs.

use crate::WarpstashError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One throwaway registration created by `POST /reg`.
#[derive(Clone, Deserialize)]
pub struct RegisteredIdentity {
    /// Server-assigned identity ID.
    #[serde(rename = "id")]
    pub identity_id: String,

    /// Bearer token for every later call on this identity.
    #[serde(rename = "token")]
    pub bearer_token: String,

    /// Account block assigned at registration.
    pub account: EmbeddedAccount,
}

/// The `account` block of a registration response.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedAccount {
    /// License the server issued with the registration.
    pub license: String,
}

impl RegisteredIdentity {
    /// License the server embedded in this registration.
    pub fn embedded_license(&self) -> &str {
        &self.account.license
    }

    /// `Authorization` header value for this identity.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.bearer_token)
    }
}

// Tokens must not end up in logs.
impl fmt::Debug for RegisteredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredIdentity")
            .field("identity_id", &self.identity_id)
            .field("bearer_token", &"<redacted>")
            .field("account", &self.account)
            .finish()
    }
}

/// Account data returned by `GET /reg/{id}/account`.
///
/// This is the value handed to end users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAccount {
    /// Classification returned by the remote service.
    pub account_type: String,

    /// Usable data-quota units, as sent by the server.
    #[serde(deserialize_with = "string_or_number")]
    pub referral_count: String,

    /// Redeemable license.
    pub license: String,
}

impl GeneratedAccount {
    /// Parse `referral_count` as a signed integer.
    pub fn referral_units(&self) -> Option<i64> {
        self.referral_count.trim().parse().ok()
    }
}

/// `PATCH /reg/{id}` body.
#[derive(Debug, Serialize)]
pub struct ReferrerUpdate<'a> {
    /// Identity ID of the referring registration.
    pub referrer: &'a str,
}

/// `PUT /reg/{id}/account` body.
#[derive(Debug, Serialize)]
pub struct LicenseUpdate<'a> {
    /// License to apply.
    pub license: &'a str,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Parse a registration response, rejecting empty IDs or tokens.
pub fn parse_identity(body: &[u8]) -> Result<RegisteredIdentity, WarpstashError> {
    let identity: RegisteredIdentity = serde_json::from_slice(body)
        .map_err(|e| WarpstashError::Decode(format!("Failed to parse registration: {}", e)))?;

    if identity.identity_id.is_empty() || identity.bearer_token.is_empty() {
        return Err(WarpstashError::Decode(
            "registration response is missing id or token".to_string(),
        ));
    }
    Ok(identity)
}

/// Parse an account-data response.
pub fn parse_account(body: &[u8]) -> Result<GeneratedAccount, WarpstashError> {
    serde_json::from_slice(body)
        .map_err(|e| WarpstashError::Decode(format!("Failed to parse account data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRATION: &str = r#"{
        "id": "x1",
        "type": "a",
        "token": "t1",
        "account": {
            "id": "acc-1",
            "license": "L1",
            "warp_plus": false
        }
    }"#;

    const ACCOUNT: &str = r#"{
        "id": "acc-1",
        "account_type": "limited",
        "referral_count": "5000",
        "license": "FINALKEY",
        "premium_data": 5000000000
    }"#;

    #[test]
    fn test_parse_identity() {
        let identity = parse_identity(REGISTRATION.as_bytes()).unwrap();
        assert_eq!(identity.identity_id, "x1");
        assert_eq!(identity.bearer_token, "t1");
        assert_eq!(identity.embedded_license(), "L1");
        assert_eq!(identity.bearer(), "Bearer t1");
    }

    #[test]
    fn test_identity_debug_redacts_token() {
        let identity = parse_identity(REGISTRATION.as_bytes()).unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains("x1"));
        assert!(!debug.contains("t1\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_parse_identity_empty_id() {
        let body = br#"{"id":"","token":"t","account":{"license":"L"}}"#;
        assert!(matches!(parse_identity(body), Err(WarpstashError::Decode(_))));
    }

    #[test]
    fn test_parse_identity_malformed() {
        assert!(matches!(parse_identity(b"<html>"), Err(WarpstashError::Decode(_))));
    }

    #[test]
    fn test_parse_account() {
        let account = parse_account(ACCOUNT.as_bytes()).unwrap();
        assert_eq!(
            account,
            GeneratedAccount {
                account_type: "limited".to_string(),
                referral_count: "5000".to_string(),
                license: "FINALKEY".to_string(),
            }
        );
        assert_eq!(account.referral_units(), Some(5000));
    }

    #[test]
    fn test_referral_count_as_number() {
        let body = br#"{"account_type":"limited","referral_count":1200,"license":"K"}"#;
        let account = parse_account(body).unwrap();
        assert_eq!(account.referral_count, "1200");
        assert_eq!(account.referral_units(), Some(1200));
    }

    #[test]
    fn test_referral_count_unparsable() {
        let body = br#"{"account_type":"limited","referral_count":"lots","license":"K"}"#;
        let account = parse_account(body).unwrap();
        assert_eq!(account.referral_units(), None);
    }

    #[test]
    fn test_referral_count_negative() {
        let body = br#"{"account_type":"limited","referral_count":"-5","license":"K"}"#;
        let account = parse_account(body).unwrap();
        assert_eq!(account.referral_units(), Some(-5));
    }

    #[test]
    fn test_request_bodies() {
        let referrer = serde_json::to_string(&ReferrerUpdate { referrer: "x2" }).unwrap();
        assert_eq!(referrer, r#"{"referrer":"x2"}"#);

        let license = serde_json::to_string(&LicenseUpdate { license: "L1" }).unwrap();
        assert_eq!(license, r#"{"license":"L1"}"#);
    }
}
