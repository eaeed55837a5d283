//! The user-facing live client.

use std::{
    io,
    sync::{Arc, Condvar, Mutex},
    thread::JoinHandle,
    time::Duration,
};

use dbn::{Metadata, PitSymbolMap, RecordEnum};
use log::warn;
use time::OffsetDateTime;
use tokio::sync::{mpsc::UnboundedSender, Notify};

use crate::{
    live::{
        determine_gateway,
        protocol::{CallbackEntry, Command, GapCallback, Session, SessionConfig, SessionShared,
                   StreamEntry},
        ReconnectPolicy, Subscription, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY,
    },
    validation::validate_semantic_string,
    ApiKey, Error, Result,
};

/// A client for Databento's live market data API: a managed TCP session with the
/// live gateway.
///
/// The session runs on a dedicated background thread with its own event loop,
/// which is stopped and joined when the client is closed or dropped. Records can
/// be consumed through blocking or async iteration, synchronous callbacks, and
/// raw DBN byte sinks.
pub struct LiveClient {
    key: ApiKey,
    gateway: Option<String>,
    port: u16,
    ts_out: bool,
    heartbeat_interval: Option<Duration>,
    reconnect_policy: ReconnectPolicy,
    shared: Arc<SessionShared>,
    closed: Arc<ClosedState>,
    state: Mutex<ClientState>,
}

struct ClientState {
    dataset: Option<String>,
    cmd_tx: Option<UnboundedSender<Command>>,
    thread: Option<JoinHandle<()>>,
    started: bool,
}

/// A builder for [`LiveClient`].
pub struct LiveClientBuilder {
    key: Option<ApiKey>,
    gateway: Option<String>,
    port: u16,
    ts_out: bool,
    heartbeat_interval: Option<Duration>,
    reconnect_policy: ReconnectPolicy,
    queue_capacity: usize,
}

impl Default for LiveClientBuilder {
    fn default() -> Self {
        Self {
            key: None,
            gateway: None,
            port: DEFAULT_PORT,
            ts_out: false,
            heartbeat_interval: None,
            reconnect_policy: ReconnectPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl LiveClientBuilder {
    /// Sets the API key.
    ///
    /// # Errors
    /// This function returns an error if the key is invalid.
    pub fn key(mut self, key: impl ToString) -> Result<Self> {
        self.key = Some(ApiKey::new(key.to_string())?);
        Ok(self)
    }

    /// Reads the API key from the `DATABENTO_API_KEY` environment variable.
    ///
    /// # Errors
    /// This function returns an error if the environment variable is not set or
    /// the key is invalid.
    pub fn key_from_env(mut self) -> Result<Self> {
        self.key = Some(ApiKey::from_env()?);
        Ok(self)
    }

    /// Overrides the gateway host. By default it is derived from the dataset of
    /// the first subscription.
    ///
    /// # Errors
    /// This function returns an error if `gateway` is not a plausible host name.
    pub fn gateway(mut self, gateway: impl ToString) -> Result<Self> {
        let gateway = gateway.to_string();
        validate_semantic_string(&gateway, "gateway")?;
        self.gateway = Some(gateway);
        Ok(self)
    }

    /// Overrides the gateway port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Requests that the gateway append a send timestamp to each record.
    pub fn ts_out(mut self, ts_out: bool) -> Self {
        self.ts_out = ts_out;
        self
    }

    /// Negotiates a heartbeat interval with the gateway. The client treats the
    /// absence of any record for three times the interval as a dead connection.
    ///
    /// # Errors
    /// This function returns an error if the interval is zero.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::bad_argument(
                "heartbeat_interval",
                "must be non-zero",
            ));
        }
        self.heartbeat_interval = Some(interval);
        Ok(self)
    }

    /// Sets the behavior on unexpected disconnection.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Overrides the capacity of the bounded record queue.
    ///
    /// # Errors
    /// This function returns an error if `capacity` is zero.
    pub fn queue_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::bad_argument("queue_capacity", "must be non-zero"));
        }
        self.queue_capacity = capacity;
        Ok(self)
    }

    /// Builds the client. Falls back to the `DATABENTO_API_KEY` environment
    /// variable if no key was set.
    ///
    /// # Errors
    /// This function returns an error if no valid key is available.
    pub fn build(self) -> Result<LiveClient> {
        let key = match self.key {
            Some(key) => key,
            None => ApiKey::from_env()?,
        };
        Ok(LiveClient {
            key,
            gateway: self.gateway,
            port: self.port,
            ts_out: self.ts_out,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_policy: self.reconnect_policy,
            shared: Arc::new(SessionShared::new(self.queue_capacity)),
            closed: Arc::new(ClosedState::new()),
            state: Mutex::new(ClientState {
                dataset: None,
                cmd_tx: None,
                thread: None,
                started: false,
            }),
        })
    }
}

impl LiveClient {
    /// Returns a builder for configuring a `LiveClient`.
    pub fn builder() -> LiveClientBuilder {
        LiveClientBuilder::default()
    }

    /// Creates a new client with the given API key and default settings.
    ///
    /// # Errors
    /// This function returns an error if the key is invalid.
    pub fn new(key: impl ToString) -> Result<Self> {
        Self::builder().key(key)?.build()
    }

    /// Returns the dataset of the session, set by the first subscription.
    pub fn dataset(&self) -> Option<String> {
        self.state.lock().unwrap().dataset.clone()
    }

    /// Returns whether the client requested send timestamps.
    pub fn ts_out(&self) -> bool {
        self.ts_out
    }

    /// Returns the session ID assigned by the gateway after authentication.
    pub fn session_id(&self) -> String {
        self.shared.session_id.lock().unwrap().clone()
    }

    /// Returns the metadata of the current session, available once streaming has
    /// begun.
    pub fn metadata(&self) -> Option<Metadata> {
        self.shared.metadata.lock().unwrap().clone()
    }

    /// Returns a snapshot of the session's point-in-time symbology map, as
    /// populated from symbol mapping records.
    pub fn symbol_map(&self) -> PitSymbolMap {
        self.shared.symbol_map.lock().unwrap().clone()
    }

    /// Subscribes to a schema and set of symbols in `dataset`. The first call
    /// connects and authenticates with the gateway; every call in the same
    /// session must use the same dataset.
    ///
    /// # Errors
    /// This function returns an error if `dataset` differs from the session
    /// dataset, the subscription is invalid, or the session has closed.
    pub fn subscribe(&self, dataset: &str, subscription: Subscription) -> Result<()> {
        validate_semantic_string(dataset, "dataset")?;
        if subscription.snapshot && subscription.start.is_some() {
            return Err(Error::bad_argument(
                "snapshot",
                "cannot request a snapshot with a start time",
            ));
        }
        if subscription.symbols.is_empty() {
            return Err(Error::bad_argument("symbols", "cannot be empty"));
        }
        let mut state = self.state.lock().unwrap();
        match &state.dataset {
            None => {
                self.spawn_session(&mut state, dataset)?;
                state.dataset = Some(dataset.to_owned());
            }
            Some(existing) if existing != dataset => {
                return Err(Error::bad_argument(
                    "dataset",
                    format!("the session is already authenticated for dataset `{existing}`"),
                ));
            }
            Some(_) => {}
        }
        Self::send_command(&state, Command::Subscribe(subscription))
    }

    /// Instructs the gateway to start streaming. May only be called once.
    ///
    /// # Errors
    /// This function returns an error if no subscription has been made, the
    /// session has already been started, or the session has closed.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.cmd_tx.is_none() {
            return Err(Error::bad_argument(
                "session",
                "cannot start a session before subscribing",
            ));
        }
        if state.started {
            return Err(Error::bad_argument(
                "session",
                "the session has already been started",
            ));
        }
        Self::send_command(&state, Command::Start)?;
        state.started = true;
        Ok(())
    }

    /// Requests an orderly close: the write half is shut down and the session
    /// drains until the gateway hangs up. Repeated calls are no-ops.
    pub fn stop(&self) {
        let state = self.state.lock().unwrap();
        let _ = Self::send_command(&state, Command::Stop);
    }

    /// Aborts the session immediately. Queued records are discarded and iterators
    /// become exhausted.
    pub fn terminate(&self) {
        {
            let state = self.state.lock().unwrap();
            let _ = Self::send_command(&state, Command::Terminate);
        }
        self.shared.queue.close();
        self.shared.queue.clear();
    }

    /// Blocks until the session closes. If `timeout` elapses first, the session
    /// is terminated.
    ///
    /// # Errors
    /// This function returns an error if the session closed abnormally: gateway
    /// error records, an authentication failure, or a lost connection.
    pub fn block_for_close(&self, timeout: Option<Duration>) -> Result<()> {
        if self.state.lock().unwrap().thread.is_none() {
            return Ok(());
        }
        let res = match self.closed.wait_blocking(timeout) {
            Some(res) => res,
            None => {
                self.terminate();
                self.closed.wait_blocking(None).unwrap_or(Ok(()))
            }
        };
        self.join_thread();
        res
    }

    /// Waits until the session closes. If `timeout` elapses first, the session
    /// is terminated.
    ///
    /// # Errors
    /// This function returns an error if the session closed abnormally: gateway
    /// error records, an authentication failure, or a lost connection.
    pub async fn wait_for_close(&self, timeout: Option<Duration>) -> Result<()> {
        if self.state.lock().unwrap().thread.is_none() {
            return Ok(());
        }
        let res = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.closed.wait()).await {
                Ok(res) => res,
                Err(_) => {
                    self.terminate();
                    self.closed.wait().await
                }
            },
            None => self.closed.wait().await,
        };
        self.join_thread();
        res
    }

    /// Pops the next record in arrival order, blocking until one arrives.
    /// Returns `None` once the session has closed and the queue is drained.
    pub fn next_record(&self) -> Option<RecordEnum> {
        if self.state.lock().unwrap().thread.is_none() {
            return None;
        }
        self.shared.queue.enable();
        self.shared.queue.pop_blocking()
    }

    /// Pops the next record in arrival order, suspending until one arrives.
    /// Returns `None` once the session has closed and the queue is drained.
    pub async fn next_record_async(&self) -> Option<RecordEnum> {
        if self.state.lock().unwrap().thread.is_none() {
            return None;
        }
        self.shared.queue.enable();
        self.shared.queue.pop().await
    }

    /// Returns a blocking iterator over the records of the session. Creating the
    /// iterator starts enqueuing records, so create it before calling
    /// [`start()`](Self::start) to observe the session from its first record.
    pub fn iter(&self) -> Records<'_> {
        self.shared.queue.enable();
        Records { client: self }
    }

    /// Adds a callback invoked synchronously for every data record. Callbacks run
    /// on the session's event loop thread and must not block.
    pub fn add_callback(&self, func: impl FnMut(&RecordEnum) + Send + 'static) {
        self.shared
            .callbacks
            .lock()
            .unwrap()
            .push(CallbackEntry::new(Box::new(func)));
    }

    /// Adds a writer that receives the raw DBN bytes of the session: the metadata
    /// and every record, with the send timestamp trailer when `ts_out` was
    /// requested. Writes happen synchronously on the session's event loop thread,
    /// so a slow writer applies backpressure to the whole session.
    pub fn add_stream(&self, writer: impl io::Write + Send + 'static) {
        self.shared
            .streams
            .lock()
            .unwrap()
            .push(StreamEntry::new(Box::new(writer)));
    }

    /// Adds a callback invoked once per reconnection with the time range of the
    /// data gap: the timestamp of the last record before the disconnect and the
    /// time the connection was re-established.
    pub fn add_reconnect_callback(
        &self,
        func: impl FnMut(OffsetDateTime, OffsetDateTime) + Send + 'static,
    ) {
        self.shared
            .reconnect_callbacks
            .lock()
            .unwrap()
            .push(Box::new(func) as GapCallback);
    }

    fn send_command(state: &ClientState, cmd: Command) -> Result<()> {
        let Some(cmd_tx) = &state.cmd_tx else {
            return Err(Error::bad_argument("session", "the session is not connected"));
        };
        cmd_tx.send(cmd).map_err(|_| Error::Disconnected)
    }

    fn spawn_session(&self, state: &mut ClientState, dataset: &str) -> Result<()> {
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let config = SessionConfig {
            key: self.key.clone(),
            dataset: dataset.to_owned(),
            gateway: self
                .gateway
                .clone()
                .unwrap_or_else(|| determine_gateway(dataset)),
            port: self.port,
            ts_out: self.ts_out,
            heartbeat_interval: self.heartbeat_interval,
            policy: self.reconnect_policy,
        };
        let session = Session::new(config, Arc::clone(&self.shared), cmd_rx);
        let closed = Arc::clone(&self.closed);
        let shared = Arc::clone(&self.shared);
        let thread = std::thread::Builder::new()
            .name("databento-live".to_owned())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => closed.set(runtime.block_on(session.run())),
                    Err(e) => {
                        shared.queue.close();
                        closed.set(Err(Error::io(e, "building the live session runtime")));
                    }
                }
            })
            .map_err(|e| Error::io(e, "spawning the live session thread"))?;
        state.cmd_tx = Some(cmd_tx);
        state.thread = Some(thread);
        Ok(())
    }

    fn join_thread(&self) {
        let thread = self.state.lock().unwrap().thread.take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("the live session thread panicked");
            }
        }
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        {
            let state = self.state.lock().unwrap();
            if let Some(cmd_tx) = &state.cmd_tx {
                let _ = cmd_tx.send(Command::Terminate);
            }
        }
        self.shared.queue.close();
        self.join_thread();
    }
}

impl std::fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveClient")
            .field("key", &self.key)
            .field("dataset", &self.dataset())
            .field("gateway", &self.gateway)
            .field("port", &self.port)
            .field("ts_out", &self.ts_out)
            .field("reconnect_policy", &self.reconnect_policy)
            .finish_non_exhaustive()
    }
}

/// A blocking iterator over the records of a live session.
pub struct Records<'a> {
    client: &'a LiveClient,
}

impl Iterator for Records<'_> {
    type Item = RecordEnum;

    fn next(&mut self) -> Option<Self::Item> {
        self.client.next_record()
    }
}

impl<'a> IntoIterator for &'a LiveClient {
    type Item = RecordEnum;
    type IntoIter = Records<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The terminal result of a session, set once by the session thread.
struct ClosedState {
    slot: Mutex<CloseSlot>,
    cv: Condvar,
    notify: Notify,
}

enum CloseSlot {
    Pending,
    /// The error is taken by the first waiter; later waiters observe a clean
    /// close.
    Done(Option<Error>),
}

impl ClosedState {
    fn new() -> Self {
        Self {
            slot: Mutex::new(CloseSlot::Pending),
            cv: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn set(&self, res: Result<()>) {
        *self.slot.lock().unwrap() = CloseSlot::Done(res.err());
        self.cv.notify_all();
        self.notify.notify_waiters();
    }

    fn take(slot: &mut CloseSlot) -> Result<()> {
        match slot {
            CloseSlot::Pending => unreachable!("checked by callers"),
            CloseSlot::Done(err) => match err.take() {
                Some(err) => Err(err),
                None => Ok(()),
            },
        }
    }

    fn wait_blocking(&self, timeout: Option<Duration>) -> Option<Result<()>> {
        let mut slot = self.slot.lock().unwrap();
        match timeout {
            Some(limit) => {
                let (mut slot, res) = self
                    .cv
                    .wait_timeout_while(slot, limit, |slot| matches!(slot, CloseSlot::Pending))
                    .unwrap();
                if res.timed_out() && matches!(*slot, CloseSlot::Pending) {
                    None
                } else {
                    Some(Self::take(&mut slot))
                }
            }
            None => {
                while matches!(*slot, CloseSlot::Pending) {
                    slot = self.cv.wait(slot).unwrap();
                }
                Some(Self::take(&mut slot))
            }
        }
    }

    async fn wait(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut slot = self.slot.lock().unwrap();
                if !matches!(*slot, CloseSlot::Pending) {
                    return Self::take(&mut slot);
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader as StdBufReader, Write as _},
        net::{TcpListener, TcpStream},
        sync::atomic::{AtomicU32, Ordering},
    };

    use dbn::{
        encode::{DbnMetadataEncoder, DbnRecordEncoder},
        HasRType, MetadataBuilder, OhlcvMsg, RecordHeader, SType, Schema, TradeMsg,
    };

    use crate::live::gateway::{AuthenticationRequest, SessionStart, SubscriptionRequest};

    use super::*;

    const TEST_KEY: &str = "db-unittestapikey1234567890FFFFF";
    const TEST_DATASET: &str = "XNAS.ITCH";
    const CHALLENGE: &str = "t7kNhwj4xqR0QYjzFKtBEG2ec2pXJ4FK";

    /// A scripted stand-in for the live gateway, running on its own thread with
    /// blocking I/O.
    struct MockGateway {
        listener: TcpListener,
        conn: Option<StdBufReader<TcpStream>>,
    }

    impl MockGateway {
        fn new() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            Self {
                listener,
                conn: None,
            }
        }

        fn port(&self) -> u16 {
            self.listener.local_addr().unwrap().port()
        }

        fn accept(&mut self) {
            let (stream, _) = self.listener.accept().unwrap();
            stream.set_nodelay(true).unwrap();
            self.conn = Some(StdBufReader::new(stream));
        }

        fn stream(&mut self) -> &mut TcpStream {
            self.conn.as_mut().unwrap().get_mut()
        }

        fn send(&mut self, line: &str) {
            self.stream().write_all(line.as_bytes()).unwrap();
        }

        fn read_line(&mut self) -> String {
            let mut line = String::new();
            self.conn.as_mut().unwrap().read_line(&mut line).unwrap();
            line
        }

        fn authenticate(&mut self, ts_out: bool) {
            self.accept();
            self.send("lsg_version=1.0.0\n");
            self.send(&format!("cram={CHALLENGE}\n"));
            let auth_line = self.read_line();
            let auth = AuthenticationRequest::parse(&auth_line).unwrap();
            let key = ApiKey::new(TEST_KEY.to_owned()).unwrap();
            assert_eq!(auth.auth, crate::cram::challenge_response(CHALLENGE, &key));
            assert_eq!(auth.dataset, TEST_DATASET);
            assert_eq!(auth.encoding, "dbn");
            assert_eq!(auth.ts_out, ts_out);
            self.send("success=1|session_id=5\n");
        }

        fn expect_subscription(&mut self) -> SubscriptionRequest {
            SubscriptionRequest::parse(&self.read_line()).unwrap()
        }

        fn expect_start_and_send_metadata(&mut self) {
            let line = self.read_line();
            SessionStart::parse(&line).unwrap();
            let metadata = MetadataBuilder::new()
                .dataset(TEST_DATASET)
                .schema(None)
                .start(0)
                .stype_in(None)
                .stype_out(SType::InstrumentId)
                .build();
            let mut buffer = Vec::new();
            DbnMetadataEncoder::new(&mut buffer).encode(&metadata).unwrap();
            self.stream().write_all(&buffer).unwrap();
        }

        fn send_record<R: HasRType + AsRef<[u8]>>(&mut self, rec: &R) {
            // split the write to exercise partial reads
            let bytes = rec.as_ref();
            let half = bytes.len() / 2;
            self.stream().write_all(&bytes[..half]).unwrap();
            self.stream().flush().unwrap();
            self.stream().write_all(&bytes[half..]).unwrap();
        }

        fn send_record_with_ts_out<R: HasRType + AsRef<[u8]>>(&mut self, rec: &R, ts_out: u64) {
            let mut buffer = Vec::new();
            DbnRecordEncoder::new(&mut buffer)
                .encode_record_with_ts_out(rec, ts_out)
                .unwrap();
            self.stream().write_all(&buffer).unwrap();
        }

        fn drop_connection(&mut self) {
            self.conn = None;
        }

        /// Reads until the client closes its write half.
        fn expect_client_eof(&mut self) {
            let mut line = String::new();
            let nbytes = self.conn.as_mut().unwrap().read_line(&mut line).unwrap();
            assert_eq!(nbytes, 0, "expected EOF, got `{line}`");
        }
    }

    fn test_client(port: u16, policy: ReconnectPolicy) -> LiveClient {
        LiveClient::builder()
            .key(TEST_KEY)
            .unwrap()
            .gateway("127.0.0.1")
            .unwrap()
            .port(port)
            .reconnect_policy(policy)
            .build()
            .unwrap()
    }

    fn trade_rec(sequence: u32) -> TradeMsg {
        TradeMsg {
            hd: RecordHeader::new::<TradeMsg>(dbn::rtype::MBP_0, 1, 42, 1_000 + sequence as u64),
            sequence,
            ..Default::default()
        }
    }

    #[test]
    fn subscribe_start_stream_and_graceful_stop() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            let sub = mock.expect_subscription();
            assert_eq!(sub.schema, "trades");
            assert_eq!(sub.stype_in, "raw_symbol");
            assert_eq!(sub.symbols, "AAPL,MSFT");
            assert!(sub.is_last);
            assert!(sub.start.is_none());
            mock.expect_start_and_send_metadata();
            for sequence in 0..3 {
                mock.send_record(&trade_rec(sequence));
            }
            mock.expect_client_eof();
            mock.drop_connection();
        });

        let client = test_client(port, ReconnectPolicy::None);
        client
            .subscribe(
                TEST_DATASET,
                Subscription::new(Schema::Trades).symbols(vec!["aapl", "msft"]),
            )
            .unwrap();
        let mut records = client.iter();
        client.start().unwrap();

        let mut sequences = Vec::new();
        for _ in 0..3 {
            match records.next().unwrap() {
                RecordEnum::Trade(rec) => sequences.push(rec.sequence),
                rec => panic!("unexpected record {rec:?}"),
            }
        }
        assert_eq!(sequences, vec![0, 1, 2]);
        client.stop();
        client.block_for_close(Some(Duration::from_secs(5))).unwrap();
        assert!(client.next_record().is_none());
        assert_eq!(client.metadata().unwrap().dataset, TEST_DATASET);
        assert_eq!(client.session_id(), "5");
        server.join().unwrap();
    }

    #[test]
    fn second_start_fails() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            mock.expect_subscription();
            mock.expect_start_and_send_metadata();
            mock.expect_client_eof();
        });

        let client = test_client(port, ReconnectPolicy::None);
        client
            .subscribe(TEST_DATASET, Subscription::new(Schema::Trades))
            .unwrap();
        client.start().unwrap();
        assert!(matches!(client.start(), Err(Error::BadArgument { .. })));
        client.stop();
        client.block_for_close(Some(Duration::from_secs(5))).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn start_before_subscribe_fails() {
        let client = test_client(12_345, ReconnectPolicy::None);
        assert!(matches!(client.start(), Err(Error::BadArgument { .. })));
    }

    #[test]
    fn dataset_equality_is_enforced() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            mock.expect_subscription();
        });

        let client = test_client(port, ReconnectPolicy::None);
        client
            .subscribe(TEST_DATASET, Subscription::new(Schema::Trades))
            .unwrap();
        let res = client.subscribe("GLBX.MDP3", Subscription::new(Schema::Trades));
        assert!(matches!(res, Err(Error::BadArgument { param_name, .. }) if param_name == "dataset"));
        server.join().unwrap();
        client.terminate();
    }

    #[test]
    fn snapshot_with_start_is_rejected() {
        let client = test_client(12_345, ReconnectPolicy::None);
        let res = client.subscribe(
            TEST_DATASET,
            Subscription::new(Schema::Mbo).start(1_700_000_000_000_000_000u64).snapshot(),
        );
        assert!(matches!(res, Err(Error::BadArgument { param_name, .. }) if param_name == "snapshot"));
    }

    #[test]
    fn subscriptions_sent_in_order_with_chunking() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            // first subscription: 600 symbols split into two batches
            let first = mock.expect_subscription();
            assert_eq!(first.symbols.split(',').count(), 500);
            assert!(!first.is_last);
            assert_eq!(first.start, Some(1_700_000_000_000_000_000));
            let second = mock.expect_subscription();
            assert_eq!(second.symbols.split(',').count(), 100);
            assert!(second.is_last);
            // second subscription follows in order
            let third = mock.expect_subscription();
            assert_eq!(third.schema, "mbo");
            assert_eq!(third.symbols, "ES.FUT");
            assert_eq!(third.stype_in, "parent");
            assert!(third.is_last);
            mock.expect_client_eof();
        });

        let client = test_client(port, ReconnectPolicy::None);
        let symbols: Vec<String> = (0..600).map(|i| format!("SYM{i}")).collect();
        client
            .subscribe(
                TEST_DATASET,
                Subscription::new(Schema::Trades)
                    .symbols(symbols)
                    .start(1_700_000_000_000_000_000u64),
            )
            .unwrap();
        client
            .subscribe(
                TEST_DATASET,
                Subscription::new(Schema::Mbo)
                    .symbols("ES.FUT")
                    .stype_in(SType::Parent),
            )
            .unwrap();
        client.stop();
        client.block_for_close(Some(Duration::from_secs(5))).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn auth_failure_surfaces_on_close() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.accept();
            mock.send("lsg_version=1.0.0\n");
            mock.send(&format!("cram={CHALLENGE}\n"));
            let _auth = mock.read_line();
            mock.send("success=0|error=Authentication failed: unknown key\n");
        });

        let client = test_client(port, ReconnectPolicy::None);
        client
            .subscribe(TEST_DATASET, Subscription::new(Schema::Trades))
            .unwrap();
        let res = client.block_for_close(Some(Duration::from_secs(5)));
        assert!(matches!(res, Err(Error::Auth(msg)) if msg.contains("unknown key")));
        server.join().unwrap();
    }

    #[test]
    fn error_records_surface_as_session_error() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            mock.expect_subscription();
            mock.expect_start_and_send_metadata();
            mock.send_record(&dbn::ErrorMsg::new(1, "bad subscription", true));
            mock.drop_connection();
        });

        let client = test_client(port, ReconnectPolicy::None);
        client
            .subscribe(TEST_DATASET, Subscription::new(Schema::Trades))
            .unwrap();
        client.start().unwrap();
        let res = client.block_for_close(Some(Duration::from_secs(5)));
        assert!(
            matches!(res, Err(Error::Session { messages }) if messages == vec!["bad subscription".to_owned()])
        );
        server.join().unwrap();
    }

    #[test]
    fn callbacks_and_streams_receive_records() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(true);
            mock.expect_subscription();
            mock.expect_start_and_send_metadata();
            mock.send_record_with_ts_out(&trade_rec(0), 77);
            mock.expect_client_eof();
            mock.drop_connection();
        });

        let client = LiveClient::builder()
            .key(TEST_KEY)
            .unwrap()
            .gateway("127.0.0.1")
            .unwrap()
            .port(port)
            .ts_out(true)
            .build()
            .unwrap();
        let callback_count = Arc::new(AtomicU32::new(0));
        {
            let callback_count = Arc::clone(&callback_count);
            client.add_callback(move |_rec| {
                callback_count.fetch_add(1, Ordering::SeqCst);
            });
        }
        let sink = Arc::new(Mutex::new(Vec::<u8>::new()));
        client.add_stream(SharedSink(Arc::clone(&sink)));
        // a panicking callback must not kill the session
        client.add_callback(|_rec| panic!("callback failure"));

        client
            .subscribe(TEST_DATASET, Subscription::new(Schema::Trades))
            .unwrap();
        let mut records = client.iter();
        client.start().unwrap();
        match records.next().unwrap() {
            RecordEnum::Trade(rec) => assert_eq!(rec.sequence, 0),
            rec => panic!("unexpected record {rec:?}"),
        }
        client.stop();
        client.block_for_close(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(callback_count.load(Ordering::SeqCst), 1);

        let sink = sink.lock().unwrap();
        // metadata, then the record, then the 8-byte send timestamp trailer
        let rec_size = std::mem::size_of::<TradeMsg>();
        assert!(sink.len() > rec_size + 8);
        let trailer: [u8; 8] = sink[sink.len() - 8..].try_into().unwrap();
        assert_eq!(u64::from_le_bytes(trailer), 77);
        let rec_bytes = &sink[sink.len() - 8 - rec_size..sink.len() - 8];
        let rec = unsafe { dbn::record::transmute_record_bytes::<TradeMsg>(rec_bytes) }.unwrap();
        assert_eq!(rec.sequence, 0);
        server.join().unwrap();
    }

    #[test]
    fn reconnect_replays_subscriptions_without_start() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            let sub = mock.expect_subscription();
            assert_eq!(sub.symbols, "TEST");
            assert_eq!(sub.start, Some(1_700_000_000_000_000_000));
            mock.expect_start_and_send_metadata();
            mock.send_record(&trade_rec(0));
            // abnormal disconnect
            mock.drop_connection();

            // the client reconnects, replays the subscription with the start
            // cleared, and restarts the session
            mock.authenticate(false);
            let sub = mock.expect_subscription();
            assert_eq!(sub.symbols, "TEST");
            assert_eq!(sub.start, None);
            assert!(sub.is_last);
            mock.expect_start_and_send_metadata();
            mock.send_record(&trade_rec(1));
            mock.expect_client_eof();
            mock.drop_connection();
        });

        let client = test_client(port, ReconnectPolicy::Reconnect);
        let gaps = Arc::new(Mutex::new(Vec::new()));
        {
            let gaps = Arc::clone(&gaps);
            client.add_reconnect_callback(move |gap_start, gap_end| {
                gaps.lock().unwrap().push((gap_start, gap_end));
            });
        }
        client
            .subscribe(
                TEST_DATASET,
                Subscription::new(Schema::Trades)
                    .symbols("TEST")
                    .start(1_700_000_000_000_000_000u64),
            )
            .unwrap();
        let mut records = client.iter();
        client.start().unwrap();

        let first = records.next().unwrap();
        assert!(matches!(first, RecordEnum::Trade(rec) if rec.sequence == 0));
        let second = records.next().unwrap();
        assert!(matches!(second, RecordEnum::Trade(rec) if rec.sequence == 1));

        client.stop();
        client.block_for_close(Some(Duration::from_secs(5))).unwrap();
        let gaps = gaps.lock().unwrap();
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].0 <= gaps[0].1);
        server.join().unwrap();
    }

    #[test]
    fn terminate_exhausts_iterators() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            mock.expect_subscription();
        });

        let client = test_client(port, ReconnectPolicy::None);
        client
            .subscribe(TEST_DATASET, Subscription::new(Schema::Trades))
            .unwrap();
        server.join().unwrap();
        client.terminate();
        assert!(client.next_record().is_none());
        client.block_for_close(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn mixed_record_types_dispatch() {
        let mut mock = MockGateway::new();
        let port = mock.port();
        let server = std::thread::spawn(move || {
            mock.authenticate(false);
            mock.expect_subscription();
            mock.expect_start_and_send_metadata();
            mock.send_record(&OhlcvMsg::default_for_schema(Schema::Ohlcv1S));
            let mapping = dbn::SymbolMappingMsg::new(
                42,
                0,
                SType::InstrumentId,
                "42",
                SType::RawSymbol,
                "AAPL",
                0,
                0,
            )
            .unwrap();
            mock.send_record(&mapping);
            // heartbeats aren't fanned out
            mock.send_record(&dbn::SystemMsg::heartbeat(7));
            mock.send_record(&trade_rec(9));
            mock.expect_client_eof();
            mock.drop_connection();
        });

        let client = test_client(port, ReconnectPolicy::None);
        client
            .subscribe(TEST_DATASET, Subscription::new(Schema::Trades))
            .unwrap();
        let mut records = client.iter();
        client.start().unwrap();
        assert!(matches!(records.next().unwrap(), RecordEnum::Ohlcv(_)));
        assert!(matches!(
            records.next().unwrap(),
            RecordEnum::SymbolMapping(_)
        ));
        // the heartbeat is skipped; the trade is next
        assert!(matches!(records.next().unwrap(), RecordEnum::Trade(rec) if rec.sequence == 9));
        client.stop();
        client.block_for_close(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(client.symbol_map().get(42).map(String::as_str), Some("AAPL"));
        server.join().unwrap();
    }

    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
