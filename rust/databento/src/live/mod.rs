//! The live client: a raw TCP session with the Databento Live Subscription
//! Gateway (LSG) for real-time and intraday replay market data.

pub(crate) mod gateway;
mod protocol;
mod queue;

mod client;

pub use client::{LiveClient, LiveClientBuilder, Records};

use std::time::Duration;

use dbn::{SType, Schema};

use crate::symbols::SymbolList;

/// The default port of the live gateway.
pub const DEFAULT_PORT: u16 = 13_000;

/// The maximum number of symbols in a single subscription request.
pub(crate) const SYMBOL_LIST_BATCH_SIZE: usize = 500;
/// The default timeout for establishing a connection and receiving the CRAM
/// challenge.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// The default timeout for the authentication response.
pub(crate) const AUTH_TIMEOUT: Duration = Duration::from_secs(2);
/// The default capacity of the bounded record queue.
pub(crate) const DEFAULT_QUEUE_CAPACITY: usize = 2048;
/// A record sent by the gateway at least every negotiated heartbeat interval;
/// this multiple of the interval without any record marks a dead connection.
pub(crate) const HEARTBEAT_MISS_FACTOR: u32 = 3;

/// Derives the default gateway host from a dataset code: lowercased with dots
/// replaced by dashes, e.g. `GLBX.MDP3` becomes `glbx-mdp3.lsg.databento.com`.
pub fn determine_gateway(dataset: &str) -> String {
    let subdomain: String = dataset
        .chars()
        .map(|c| match c {
            '.' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    format!("{subdomain}.lsg.databento.com")
}

/// A subscription to a schema and set of symbols for a live session.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// The schema to subscribe to.
    pub schema: Schema,
    /// The symbology type of the symbols.
    pub stype_in: SType,
    /// The symbols to subscribe to.
    pub symbols: SymbolList,
    /// An optional UNIX nanosecond timestamp to replay from. Must be within 24
    /// hours.
    pub start: Option<u64>,
    /// Whether to request an initial image of the current state before
    /// incremental updates. Incompatible with `start`.
    pub snapshot: bool,
    /// An optional numerical identifier to associate with this subscription.
    pub id: Option<u32>,
}

impl Subscription {
    /// Creates a new subscription for all symbols of `schema` by raw symbol.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            stype_in: SType::RawSymbol,
            symbols: SymbolList::All,
            start: None,
            snapshot: false,
            id: None,
        }
    }

    /// Sets the symbols and returns the subscription.
    pub fn symbols(mut self, symbols: impl Into<SymbolList>) -> Self {
        self.symbols = symbols.into();
        self
    }

    /// Sets the input symbology type and returns the subscription.
    pub fn stype_in(mut self, stype_in: SType) -> Self {
        self.stype_in = stype_in;
        self
    }

    /// Sets the replay start time and returns the subscription.
    pub fn start(mut self, start: impl Into<crate::validation::DateTimeArg>) -> Self {
        self.start = Some(start.into().unix_nanos());
        self
    }

    /// Requests a snapshot and returns the subscription.
    pub fn snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }

    /// Sets the subscription identifier and returns the subscription.
    pub fn id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }
}

/// What to do when the connection with the gateway is lost unexpectedly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// A disconnection is terminal: the session closes with an error.
    #[default]
    None,
    /// Rebuild the connection, redo the handshake, replay every recorded
    /// subscription with its `start` cleared, and resume streaming if the session
    /// was streaming.
    Reconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_derivation() {
        assert_eq!(
            determine_gateway("GLBX.MDP3"),
            "glbx-mdp3.lsg.databento.com"
        );
        assert_eq!(
            determine_gateway("XNAS.ITCH"),
            "xnas-itch.lsg.databento.com"
        );
    }
}
