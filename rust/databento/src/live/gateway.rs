//! The line-oriented control codec for the live gateway: `key=value` fields
//! joined by `|` and terminated by a newline.

use std::collections::HashMap;
use std::fmt;

use crate::{Error, Result};

/// A greeting sent by the gateway upon connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Greeting {
    pub lsg_version: String,
}

/// A challenge request sent by the gateway after the greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChallengeRequest {
    pub cram: String,
}

/// An authentication request sent to the gateway in response to a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthenticationRequest {
    pub auth: String,
    pub dataset: String,
    pub encoding: String,
    pub ts_out: bool,
    pub heartbeat_interval_s: Option<u64>,
    pub client: Option<String>,
    pub details: Option<String>,
}

/// An authentication response sent by the gateway after an authentication
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthenticationResponse {
    pub success: String,
    pub error: Option<String>,
    pub session_id: Option<String>,
}

/// A subscription request sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubscriptionRequest {
    pub schema: String,
    pub stype_in: String,
    pub symbols: String,
    pub start: Option<u64>,
    pub snapshot: bool,
    pub id: Option<u32>,
    pub is_last: bool,
}

/// A session start message sent to the gateway to begin streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionStart {
    pub start_session: String,
}

impl Default for SessionStart {
    fn default() -> Self {
        Self {
            start_session: "0".to_owned(),
        }
    }
}

fn parse_fields(line: &str) -> Result<HashMap<&str, &str>> {
    let stripped = line
        .strip_suffix('\n')
        .ok_or_else(|| Error::Gateway(format!("`{}` does not end with a newline", line.trim())))?;
    let mut fields = HashMap::new();
    for token in stripped.split('|') {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| Error::Gateway(line.trim().to_owned()))?;
        if fields.insert(key, value).is_some() {
            return Err(Error::Gateway(format!(
                "duplicate key `{key}` in `{}`",
                line.trim()
            )));
        }
    }
    Ok(fields)
}

fn take_required(
    fields: &mut HashMap<&str, &str>,
    key: &str,
    line: &str,
) -> Result<String> {
    fields
        .remove(key)
        .map(str::to_owned)
        .ok_or_else(|| Error::Gateway(format!("missing `{key}` in `{}`", line.trim())))
}

fn reject_unknown(fields: &HashMap<&str, &str>, line: &str) -> Result<()> {
    if let Some(key) = fields.keys().next() {
        return Err(Error::Gateway(format!(
            "unknown key `{key}` in `{}`",
            line.trim()
        )));
    }
    Ok(())
}

fn parse_flag(value: &str, key: &str, line: &str) -> Result<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(Error::Gateway(format!(
            "invalid value `{value}` for `{key}` in `{}`",
            line.trim()
        ))),
    }
}

impl Greeting {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let mut fields = parse_fields(line)?;
        let lsg_version = take_required(&mut fields, "lsg_version", line)?;
        reject_unknown(&fields, line)?;
        Ok(Self { lsg_version })
    }
}

impl fmt::Display for Greeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "lsg_version={}", self.lsg_version)
    }
}

impl ChallengeRequest {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let mut fields = parse_fields(line)?;
        let cram = take_required(&mut fields, "cram", line)?;
        reject_unknown(&fields, line)?;
        Ok(Self { cram })
    }
}

impl fmt::Display for ChallengeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cram={}", self.cram)
    }
}

impl AuthenticationRequest {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let mut fields = parse_fields(line)?;
        let auth = take_required(&mut fields, "auth", line)?;
        let dataset = take_required(&mut fields, "dataset", line)?;
        let encoding = fields
            .remove("encoding")
            .map(str::to_owned)
            .unwrap_or_else(|| "dbn".to_owned());
        let ts_out = parse_flag(fields.remove("ts_out").unwrap_or("0"), "ts_out", line)?;
        let heartbeat_interval_s = fields
            .remove("heartbeat_interval_s")
            .map(|v| {
                v.parse().map_err(|_| {
                    Error::Gateway(format!(
                        "invalid value `{v}` for `heartbeat_interval_s` in `{}`",
                        line.trim()
                    ))
                })
            })
            .transpose()?;
        let client = fields.remove("client").map(str::to_owned);
        let details = fields.remove("details").map(str::to_owned);
        reject_unknown(&fields, line)?;
        Ok(Self {
            auth,
            dataset,
            encoding,
            ts_out,
            heartbeat_interval_s,
            client,
            details,
        })
    }
}

impl fmt::Display for AuthenticationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "auth={}|dataset={}|encoding={}|ts_out={}",
            self.auth,
            self.dataset,
            self.encoding,
            u8::from(self.ts_out)
        )?;
        if let Some(heartbeat_interval_s) = self.heartbeat_interval_s {
            write!(f, "|heartbeat_interval_s={heartbeat_interval_s}")?;
        }
        if let Some(client) = &self.client {
            write!(f, "|client={client}")?;
        }
        if let Some(details) = &self.details {
            write!(f, "|details={details}")?;
        }
        writeln!(f)
    }
}

impl AuthenticationResponse {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let mut fields = parse_fields(line)?;
        let success = take_required(&mut fields, "success", line)?;
        let error = fields.remove("error").map(str::to_owned);
        let session_id = fields.remove("session_id").map(str::to_owned);
        reject_unknown(&fields, line)?;
        Ok(Self {
            success,
            error,
            session_id,
        })
    }

    pub(crate) fn is_success(&self) -> bool {
        self.success == "1"
    }
}

impl fmt::Display for AuthenticationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "success={}", self.success)?;
        if let Some(error) = &self.error {
            write!(f, "|error={error}")?;
        }
        if let Some(session_id) = &self.session_id {
            write!(f, "|session_id={session_id}")?;
        }
        writeln!(f)
    }
}

impl SubscriptionRequest {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let mut fields = parse_fields(line)?;
        let schema = take_required(&mut fields, "schema", line)?;
        let stype_in = take_required(&mut fields, "stype_in", line)?;
        let symbols = take_required(&mut fields, "symbols", line)?;
        let start = fields
            .remove("start")
            .map(|v| {
                v.parse().map_err(|_| {
                    Error::Gateway(format!(
                        "invalid value `{v}` for `start` in `{}`",
                        line.trim()
                    ))
                })
            })
            .transpose()?;
        let snapshot = parse_flag(fields.remove("snapshot").unwrap_or("0"), "snapshot", line)?;
        let id = fields
            .remove("id")
            .map(|v| {
                v.parse().map_err(|_| {
                    Error::Gateway(format!("invalid value `{v}` for `id` in `{}`", line.trim()))
                })
            })
            .transpose()?;
        let is_last = parse_flag(fields.remove("is_last").unwrap_or("1"), "is_last", line)?;
        reject_unknown(&fields, line)?;
        Ok(Self {
            schema,
            stype_in,
            symbols,
            start,
            snapshot,
            id,
            is_last,
        })
    }
}

impl fmt::Display for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schema={}|stype_in={}|symbols={}",
            self.schema, self.stype_in, self.symbols
        )?;
        if let Some(start) = self.start {
            write!(f, "|start={start}")?;
        }
        write!(f, "|snapshot={}", u8::from(self.snapshot))?;
        if let Some(id) = self.id {
            write!(f, "|id={id}")?;
        }
        writeln!(f, "|is_last={}", u8::from(self.is_last))
    }
}

impl SessionStart {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let mut fields = parse_fields(line)?;
        let start_session = take_required(&mut fields, "start_session", line)?;
        reject_unknown(&fields, line)?;
        Ok(Self { start_session })
    }
}

impl fmt::Display for SessionStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "start_session={}", self.start_session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_request_literal() {
        let request = SubscriptionRequest {
            schema: "mbo".to_owned(),
            stype_in: "instrument_id".to_owned(),
            symbols: "1234,5678,90".to_owned(),
            start: None,
            snapshot: false,
            id: None,
            is_last: true,
        };
        assert_eq!(
            request.to_string(),
            "schema=mbo|stype_in=instrument_id|symbols=1234,5678,90|snapshot=0|is_last=1\n"
        );
    }

    #[test]
    fn subscription_request_round_trip() {
        let request = SubscriptionRequest {
            schema: "trades".to_owned(),
            stype_in: "raw_symbol".to_owned(),
            symbols: "AAPL,MSFT".to_owned(),
            start: Some(1_700_000_000_000_000_000),
            snapshot: false,
            id: Some(3),
            is_last: false,
        };
        assert_eq!(
            SubscriptionRequest::parse(&request.to_string()).unwrap(),
            request
        );
    }

    #[test]
    fn authentication_request_round_trip() {
        let request = AuthenticationRequest {
            auth: "abc123-FFFFF".to_owned(),
            dataset: "GLBX.MDP3".to_owned(),
            encoding: "dbn".to_owned(),
            ts_out: true,
            heartbeat_interval_s: Some(30),
            client: Some("Rust 0.1.0".to_owned()),
            details: None,
        };
        assert_eq!(
            request.to_string(),
            "auth=abc123-FFFFF|dataset=GLBX.MDP3|encoding=dbn|ts_out=1|heartbeat_interval_s=30|client=Rust 0.1.0\n"
        );
        assert_eq!(
            AuthenticationRequest::parse(&request.to_string()).unwrap(),
            request
        );
    }

    #[test]
    fn authentication_response_variants() {
        let ok = AuthenticationResponse::parse("success=1|session_id=5\n").unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.session_id.as_deref(), Some("5"));

        let failed = AuthenticationResponse::parse("success=0|error=no dice\n").unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("no dice"));
    }

    #[test]
    fn greeting_and_challenge_round_trip() {
        let greeting = Greeting {
            lsg_version: "1.2.3".to_owned(),
        };
        assert_eq!(Greeting::parse(&greeting.to_string()).unwrap(), greeting);

        let challenge = ChallengeRequest {
            cram: "t7kNhwj4xqR0QYjzFKtBEG2ec2pXJ4FK".to_owned(),
        };
        assert_eq!(
            ChallengeRequest::parse(&challenge.to_string()).unwrap(),
            challenge
        );
    }

    #[test]
    fn session_start_round_trip() {
        let start = SessionStart::default();
        assert_eq!(start.to_string(), "start_session=0\n");
        assert_eq!(SessionStart::parse(&start.to_string()).unwrap(), start);
    }

    #[test]
    fn invalid_lines_rejected() {
        assert!(Greeting::parse("lsg_version=1.0").is_err());
        assert!(Greeting::parse("not a control message\n").is_err());
        assert!(Greeting::parse("lsg_version=1.0|unexpected=1\n").is_err());
        assert!(AuthenticationResponse::parse("error=missing success\n").is_err());
        assert!(SubscriptionRequest::parse("schema=mbo|symbols=X\n").is_err());
    }
}
