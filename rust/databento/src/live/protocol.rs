//! The live session task: connection state machine, CRAM authentication,
//! subscription replay, DBN decoding, and record fan-out.

use std::{
    io::Write,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};

use dbn::{
    decode::{AsyncDbnMetadataDecoder, AsyncDbnRecordDecoder},
    encode::DbnMetadataEncoder,
    Metadata, PitSymbolMap, Record, RecordEnum, VersionUpgradePolicy, DBN_VERSION,
};
use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::mpsc::UnboundedReceiver,
    time::timeout,
};

use crate::{
    cram,
    live::{
        gateway::{AuthenticationRequest, AuthenticationResponse, ChallengeRequest, Greeting,
                  SessionStart, SubscriptionRequest},
        queue::{PushResult, RecordQueue},
        ReconnectPolicy, Subscription, AUTH_TIMEOUT, CONNECT_TIMEOUT, HEARTBEAT_MISS_FACTOR,
        SYMBOL_LIST_BATCH_SIZE,
    },
    ApiKey, Error, Result,
};

/// The cap on repeated warnings per callback or stream sink, to prevent log
/// floods.
const WARN_CAP: u32 = 10;

type RecordDecoder = AsyncDbnRecordDecoder<BufReader<OwnedReadHalf>>;

/// A registered user callback with its warning budget.
pub(crate) struct CallbackEntry {
    pub(crate) func: Box<dyn FnMut(&RecordEnum) + Send>,
    warn_count: u32,
}

impl CallbackEntry {
    pub(crate) fn new(func: Box<dyn FnMut(&RecordEnum) + Send>) -> Self {
        Self {
            func,
            warn_count: 0,
        }
    }
}

/// A registered user byte-stream sink with its warning budget.
pub(crate) struct StreamEntry {
    pub(crate) writer: Box<dyn Write + Send>,
    warn_count: u32,
}

impl StreamEntry {
    pub(crate) fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            warn_count: 0,
        }
    }
}

pub(crate) type GapCallback = Box<dyn FnMut(OffsetDateTime, OffsetDateTime) + Send>;

/// State shared between the session task and the client façade.
pub(crate) struct SessionShared {
    pub(crate) queue: RecordQueue,
    pub(crate) callbacks: Mutex<Vec<CallbackEntry>>,
    pub(crate) streams: Mutex<Vec<StreamEntry>>,
    pub(crate) reconnect_callbacks: Mutex<Vec<GapCallback>>,
    pub(crate) metadata: Mutex<Option<Metadata>>,
    pub(crate) symbol_map: Mutex<PitSymbolMap>,
    pub(crate) session_id: Mutex<String>,
}

impl SessionShared {
    pub(crate) fn new(queue_capacity: usize) -> Self {
        Self {
            queue: RecordQueue::new(queue_capacity),
            callbacks: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            reconnect_callbacks: Mutex::new(Vec::new()),
            metadata: Mutex::new(None),
            symbol_map: Mutex::new(PitSymbolMap::new()),
            session_id: Mutex::new(String::new()),
        }
    }
}

/// Commands from the client façade to the session task.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(Subscription),
    Start,
    Stop,
    Terminate,
}

/// The static configuration of a session.
pub(crate) struct SessionConfig {
    pub(crate) key: ApiKey,
    pub(crate) dataset: String,
    pub(crate) gateway: String,
    pub(crate) port: u16,
    pub(crate) ts_out: bool,
    pub(crate) heartbeat_interval: Option<Duration>,
    pub(crate) policy: ReconnectPolicy,
}

/// An authenticated connection to the gateway.
struct Conn {
    writer: OwnedWriteHalf,
    decoder: RecordDecoder,
    /// `true` once the session start message has been sent on this connection and
    /// the metadata decoded; DBN records follow.
    streaming: bool,
}

enum CloseReason {
    /// An orderly close after a stop request or server EOF following a stop.
    Graceful,
    /// A forced abort; pending records are discarded.
    Terminated,
    /// The transport was lost while the session was expected to continue.
    /// Eligible for reconnection.
    Disconnected(Error),
    /// An unrecoverable failure, e.g. corrupt data; never reconnects.
    Fatal(Error),
}

enum Flow {
    Continue,
    Close(CloseReason),
}

enum RecvOutcome {
    Record(RecordEnum, Option<u64>),
    UnknownRecord(u8),
    Eof,
    HeartbeatTimeout,
    Err(dbn::Error),
}

/// The live session task. Owns the connection and runs on the client's
/// current-thread runtime until close.
pub(crate) struct Session {
    config: SessionConfig,
    shared: Arc<SessionShared>,
    cmd_rx: UnboundedReceiver<Command>,
    /// Every subscription sent this session, recorded for replay on reconnect.
    subscriptions: Vec<Subscription>,
    /// Whether the session ever started streaming; governs re-issuing the session
    /// start on reconnect.
    started: bool,
    stop_requested: bool,
    /// Error records accumulated from the gateway, surfaced at close.
    error_msgs: Vec<String>,
    /// `ts_event` of the most recently dispatched record, for gap callbacks.
    last_record_ts: u64,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        shared: Arc<SessionShared>,
        cmd_rx: UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            config,
            shared,
            cmd_rx,
            subscriptions: Vec::new(),
            started: false,
            stop_requested: false,
            error_msgs: Vec::new(),
            last_record_ts: 0,
        }
    }

    /// Runs the session until close, returning how it ended.
    pub(crate) async fn run(mut self) -> Result<()> {
        let res = self.run_inner().await;
        self.shared.queue.close();
        res
    }

    async fn run_inner(&mut self) -> Result<()> {
        let mut conn = self.connect().await?;
        loop {
            match self.run_conn(&mut conn).await {
                Flow::Continue => continue,
                Flow::Close(CloseReason::Graceful) => return self.finalize(None),
                Flow::Close(CloseReason::Terminated) => {
                    self.shared.queue.clear();
                    return Ok(());
                }
                Flow::Close(CloseReason::Disconnected(err)) => {
                    if self.config.policy == ReconnectPolicy::Reconnect && !self.stop_requested {
                        warn!(
                            "[{}] connection lost ({err}); reconnecting",
                            self.config.dataset
                        );
                        match self.reconnect().await {
                            Some(new_conn) => {
                                conn = new_conn;
                                continue;
                            }
                            // terminated or stopped while reconnecting
                            None => return Ok(()),
                        }
                    }
                    return self.finalize(Some(err));
                }
                Flow::Close(CloseReason::Fatal(err)) => return self.finalize(Some(err)),
            }
        }
    }

    /// Surfaces accumulated session errors over transport errors over a clean
    /// close.
    fn finalize(&mut self, transport_err: Option<Error>) -> Result<()> {
        if !self.error_msgs.is_empty() {
            return Err(Error::Session {
                messages: std::mem::take(&mut self.error_msgs),
            });
        }
        match transport_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Establishes a TCP connection and completes the CRAM handshake.
    async fn connect(&mut self) -> Result<Conn> {
        let gateway = format!("{}:{}", self.config.gateway, self.config.port);
        info!("[{}] connecting to {gateway}", self.config.dataset);
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&gateway))
            .await
            .map_err(|_| Error::Timeout {
                gateway: gateway.clone(),
                during: "connecting",
            })?
            .map_err(|e| Error::Connect {
                gateway: gateway.clone(),
                source: e,
            })?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let greeting = timeout(CONNECT_TIMEOUT, read_line(&mut reader))
            .await
            .map_err(|_| Error::Timeout {
                gateway: gateway.clone(),
                during: "waiting for the greeting",
            })?
            .and_then(|line| Greeting::parse(&line))?;
        debug!(
            "[{}] greeting from gateway v{}",
            self.config.dataset, greeting.lsg_version
        );
        let challenge = timeout(CONNECT_TIMEOUT, read_line(&mut reader))
            .await
            .map_err(|_| Error::Timeout {
                gateway: gateway.clone(),
                during: "waiting for the CRAM challenge",
            })?
            .and_then(|line| ChallengeRequest::parse(&line))?;

        let auth_req = AuthenticationRequest {
            auth: cram::challenge_response(&challenge.cram, &self.config.key),
            dataset: self.config.dataset.clone(),
            encoding: "dbn".to_owned(),
            ts_out: self.config.ts_out,
            heartbeat_interval_s: self.config.heartbeat_interval.map(|i| i.as_secs()),
            client: Some(format!("Rust {}", env!("CARGO_PKG_VERSION"))),
            details: None,
        };
        writer
            .write_all(auth_req.to_string().as_bytes())
            .await
            .map_err(|e| Error::io(e, "sending authentication request"))?;

        let auth_res = timeout(AUTH_TIMEOUT, read_line(&mut reader))
            .await
            .map_err(|_| Error::Timeout {
                gateway: gateway.clone(),
                during: "authenticating",
            })?
            .and_then(|line| AuthenticationResponse::parse(&line))?;
        if !auth_res.is_success() {
            return Err(Error::Auth(
                auth_res.error.unwrap_or_else(|| "unknown failure".to_owned()),
            ));
        }
        let session_id = auth_res.session_id.unwrap_or_default();
        info!(
            "[{}] authenticated; session ID {session_id}",
            self.config.dataset
        );
        *self.shared.session_id.lock().unwrap() = session_id;

        // The version is a placeholder until the session metadata arrives.
        let decoder = AsyncDbnRecordDecoder::with_version(
            reader,
            DBN_VERSION,
            VersionUpgradePolicy::Upgrade,
            self.config.ts_out,
        )?;
        Ok(Conn {
            writer,
            decoder,
            streaming: false,
        })
    }

    /// Runs one connection until it closes for any reason.
    async fn run_conn(&mut self, conn: &mut Conn) -> Flow {
        loop {
            if conn.streaming {
                let hb_limit = self
                    .config
                    .heartbeat_interval
                    .map(|i| i * HEARTBEAT_MISS_FACTOR);
                let outcome = tokio::select! {
                    biased;
                    cmd = self.cmd_rx.recv() => {
                        match self.handle_command(conn, cmd).await {
                            Flow::Continue => continue,
                            flow => return flow,
                        }
                    }
                    outcome = recv_record(&mut conn.decoder, hb_limit) => outcome,
                };
                match outcome {
                    RecvOutcome::Record(rec, ts_out) => {
                        self.handle_record(rec, ts_out);
                        if let Flow::Close(reason) = self.pause_if_backlogged(conn).await {
                            return Flow::Close(reason);
                        }
                    }
                    RecvOutcome::UnknownRecord(rtype) => {
                        warn!(
                            "[{}] skipping record with unknown rtype {rtype:#04X}",
                            self.config.dataset
                        );
                    }
                    RecvOutcome::Eof => {
                        return if self.stop_requested {
                            info!("[{}] session closed", self.config.dataset);
                            Flow::Close(CloseReason::Graceful)
                        } else {
                            Flow::Close(CloseReason::Disconnected(Error::Disconnected))
                        };
                    }
                    RecvOutcome::HeartbeatTimeout => {
                        error!(
                            "[{}] no records within {HEARTBEAT_MISS_FACTOR}x the heartbeat interval; treating the connection as dead",
                            self.config.dataset
                        );
                        return Flow::Close(CloseReason::Disconnected(Error::Disconnected));
                    }
                    RecvOutcome::Err(e) => {
                        return match e {
                            dbn::Error::Io { .. } => {
                                Flow::Close(CloseReason::Disconnected(Error::Dbn(e)))
                            }
                            // corrupt data is fatal; reconnecting can't fix it
                            e => {
                                error!(
                                    "[{}] error decoding DBN record: {e}",
                                    self.config.dataset
                                );
                                Flow::Close(CloseReason::Fatal(Error::Dbn(e)))
                            }
                        };
                    }
                }
            } else {
                // Nothing arrives from the gateway between authentication and the
                // session start, so only watch for commands.
                let cmd = self.cmd_rx.recv().await;
                match self.handle_command(conn, cmd).await {
                    Flow::Continue => {}
                    flow => return flow,
                }
            }
        }
    }

    /// Pauses reading from the transport while the record queue sits at or above
    /// half capacity, while staying responsive to commands.
    async fn pause_if_backlogged(&mut self, conn: &mut Conn) -> Flow {
        while self.shared.queue.above_watermark() {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match self.handle_command(conn, cmd).await {
                        Flow::Continue => {}
                        flow => return flow,
                    }
                }
                () = self.shared.queue.drained_below_watermark() => {}
            }
        }
        Flow::Continue
    }

    async fn handle_command(&mut self, conn: &mut Conn, cmd: Option<Command>) -> Flow {
        match cmd {
            // the client was dropped
            None | Some(Command::Terminate) => Flow::Close(CloseReason::Terminated),
            Some(Command::Subscribe(sub)) => {
                match self.send_subscriptions(conn, &sub, true).await {
                    Ok(()) => {
                        self.subscriptions.push(sub);
                        Flow::Continue
                    }
                    Err(err) => Flow::Close(CloseReason::Disconnected(err)),
                }
            }
            Some(Command::Start) => {
                if conn.streaming {
                    warn!("[{}] session already started", self.config.dataset);
                    return Flow::Continue;
                }
                self.started = true;
                match self.start_streaming(conn).await {
                    Ok(()) => Flow::Continue,
                    Err(err) => Flow::Close(CloseReason::Disconnected(err)),
                }
            }
            Some(Command::Stop) => {
                self.stop_requested = true;
                debug!("[{}] closing the write half", self.config.dataset);
                let _ = conn.writer.shutdown().await;
                if conn.streaming {
                    // keep draining until the gateway sends EOF
                    Flow::Continue
                } else {
                    Flow::Close(CloseReason::Graceful)
                }
            }
        }
    }

    /// Sends the session start message and decodes the stream metadata.
    async fn start_streaming(&mut self, conn: &mut Conn) -> Result<()> {
        info!("[{}] starting session", self.config.dataset);
        conn.writer
            .write_all(SessionStart::default().to_string().as_bytes())
            .await
            .map_err(|e| Error::io(e, "sending session start"))?;
        let metadata = timeout(
            CONNECT_TIMEOUT,
            AsyncDbnMetadataDecoder::new(conn.decoder.get_mut()).decode(),
        )
        .await
        .map_err(|_| Error::Timeout {
            gateway: self.config.gateway.clone(),
            during: "waiting for session metadata",
        })??;
        conn.decoder.set_version(metadata.version)?;
        // should match the session's ts_out flag, but set again for safety
        conn.decoder.set_ts_out(metadata.ts_out);
        self.dispatch_metadata(metadata);
        conn.streaming = true;
        Ok(())
    }

    /// Surfaces the stream metadata: stores it the first time, verifies
    /// compatibility on reconnects, and forwards its bytes to user sinks.
    fn dispatch_metadata(&mut self, metadata: Metadata) {
        let mut encoded = Vec::new();
        if let Err(e) = DbnMetadataEncoder::new(&mut encoded).encode(&metadata) {
            warn!(
                "[{}] failed to re-encode session metadata for streams: {e}",
                self.config.dataset
            );
        } else {
            let mut streams = self.shared.streams.lock().unwrap();
            for entry in streams.iter_mut() {
                write_to_stream(&self.config.dataset, entry, &encoded, None);
            }
        }
        let mut stored = self.shared.metadata.lock().unwrap();
        match stored.as_ref() {
            None => *stored = Some(metadata),
            Some(prev) => {
                if prev.dataset != metadata.dataset
                    || prev.schema != metadata.schema
                    || prev.stype_in != metadata.stype_in
                    || prev.stype_out != metadata.stype_out
                    || prev.ts_out != metadata.ts_out
                {
                    warn!(
                        "[{}] metadata from the reconnected session is incompatible with the previous session",
                        self.config.dataset
                    );
                }
            }
        }
    }

    /// Sends one logical subscription as a batch of requests of at most 500
    /// symbols each, with `is_last` set only on the final batch.
    async fn send_subscriptions(
        &mut self,
        conn: &mut Conn,
        sub: &Subscription,
        include_start: bool,
    ) -> Result<()> {
        let batches = sub
            .symbols
            .to_chunked_api_string(sub.stype_in, SYMBOL_LIST_BATCH_SIZE)?;
        let last_idx = batches.len().saturating_sub(1);
        for (i, symbols) in batches.into_iter().enumerate() {
            let request = SubscriptionRequest {
                schema: sub.schema.to_string(),
                stype_in: sub.stype_in.to_string(),
                symbols,
                start: if include_start { sub.start } else { None },
                snapshot: sub.snapshot,
                id: sub.id,
                is_last: i == last_idx,
            };
            debug!(
                "[{}] subscribing: {}",
                self.config.dataset,
                request.to_string().trim_end()
            );
            conn.writer
                .write_all(request.to_string().as_bytes())
                .await
                .map_err(|e| Error::io(e, "sending subscription request"))?;
        }
        Ok(())
    }

    /// Dispatches a decoded record per its type, then fans it out.
    fn handle_record(&mut self, rec: RecordEnum, ts_out: Option<u64>) {
        self.last_record_ts = rec.header().ts_event;
        match &rec {
            RecordEnum::SymbolMapping(mapping) => {
                if let Err(e) = self
                    .shared
                    .symbol_map
                    .lock()
                    .unwrap()
                    .on_symbol_mapping(mapping)
                {
                    warn!(
                        "[{}] failed to update symbol map: {e}",
                        self.config.dataset
                    );
                }
            }
            RecordEnum::Error(msg) => {
                let err_text = msg
                    .err()
                    .unwrap_or("<error record with invalid UTF-8>")
                    .to_owned();
                error!("[{}] gateway error: {err_text}", self.config.dataset);
                self.error_msgs.push(err_text);
                // error records are accumulated, not fanned out
                return;
            }
            RecordEnum::System(msg) => {
                if msg.is_heartbeat() {
                    debug!("[{}] gateway heartbeat", self.config.dataset);
                    // heartbeats only reset the liveness timer
                    return;
                }
                info!(
                    "[{}] gateway message: {}",
                    self.config.dataset,
                    msg.msg().unwrap_or_default()
                );
            }
            _ => {}
        }
        self.fan_out(rec, ts_out);
    }

    /// Fans a record out to the bounded queue, user callbacks, and user byte
    /// sinks, in that order.
    fn fan_out(&mut self, rec: RecordEnum, ts_out: Option<u64>) {
        if self.shared.queue.is_enabled() {
            if self.shared.queue.push(rec.clone()) == PushResult::Dropped {
                error!(
                    "[{}] record queue is full; dropped record with rtype {:#04X} ts_event={}",
                    self.config.dataset,
                    rec.header().rtype,
                    rec.header().ts_event,
                );
            }
        }
        {
            let mut callbacks = self.shared.callbacks.lock().unwrap();
            for entry in callbacks.iter_mut() {
                let res = catch_unwind(AssertUnwindSafe(|| (entry.func)(&rec)));
                if res.is_err() {
                    entry.warn_count += 1;
                    if entry.warn_count <= WARN_CAP {
                        error!(
                            "[{}] panic in user callback dispatching record with rtype {:#04X}",
                            self.config.dataset,
                            rec.header().rtype,
                        );
                    }
                }
            }
        }
        {
            let mut streams = self.shared.streams.lock().unwrap();
            for entry in streams.iter_mut() {
                write_to_stream(&self.config.dataset, entry, rec.as_ref(), ts_out);
            }
        }
    }

    /// Rebuilds the connection after an abnormal disconnect: redoes the
    /// handshake, replays every recorded subscription with `start` cleared,
    /// invokes the gap callbacks, and resumes streaming if the session was
    /// streaming. Returns `None` if the session was stopped or terminated while
    /// reconnecting.
    async fn reconnect(&mut self) -> Option<Conn> {
        let gap_start = dbn::ts_to_dt(self.last_record_ts).unwrap_or_else(OffsetDateTime::now_utc);
        let mut backoff = Duration::from_secs(1);
        loop {
            match self.try_reconnect_once().await {
                Ok(conn) => {
                    let gap_end = OffsetDateTime::now_utc();
                    let mut callbacks = self.shared.reconnect_callbacks.lock().unwrap();
                    for callback in callbacks.iter_mut() {
                        if catch_unwind(AssertUnwindSafe(|| (callback)(gap_start, gap_end)))
                            .is_err()
                        {
                            error!(
                                "[{}] panic in reconnect callback",
                                self.config.dataset
                            );
                        }
                    }
                    return Some(conn);
                }
                Err(err) => {
                    warn!(
                        "[{}] reconnect attempt failed: {err}; retrying in {backoff:?}",
                        self.config.dataset
                    );
                }
            }
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Terminate) => {
                        self.shared.queue.clear();
                        return None;
                    }
                    Some(Command::Stop) => {
                        self.stop_requested = true;
                        return None;
                    }
                    // deferred until the connection is re-established
                    Some(Command::Subscribe(sub)) => self.subscriptions.push(sub),
                    Some(Command::Start) => self.started = true,
                },
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(Duration::from_secs(10));
        }
    }

    async fn try_reconnect_once(&mut self) -> Result<Conn> {
        let mut conn = self.connect().await?;
        // replay in the order originally requested, with any replay start cleared
        let subscriptions = self.subscriptions.clone();
        for sub in &subscriptions {
            self.send_subscriptions(&mut conn, sub, false).await?;
        }
        if self.started {
            self.start_streaming(&mut conn).await?;
        }
        Ok(conn)
    }
}

fn write_to_stream(dataset: &str, entry: &mut StreamEntry, bytes: &[u8], ts_out: Option<u64>) {
    let res = entry.writer.write_all(bytes).and_then(|()| match ts_out {
        Some(ts_out) => entry.writer.write_all(&ts_out.to_le_bytes()),
        None => Ok(()),
    });
    if let Err(e) = res {
        entry.warn_count += 1;
        if entry.warn_count <= WARN_CAP {
            error!("[{dataset}] error writing record to user stream: {e}");
        }
    }
}

/// Reads one `\n`-terminated control line.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<String> {
    let mut line = String::new();
    let nbytes = reader
        .read_line(&mut line)
        .await
        .map_err(|e| Error::io(e, "reading control line"))?;
    if nbytes == 0 {
        return Err(Error::Gateway(
            "gateway closed the connection during the handshake".to_owned(),
        ));
    }
    Ok(line)
}

/// Receives the next record, with a liveness limit when a heartbeat interval was
/// negotiated.
async fn recv_record(decoder: &mut RecordDecoder, hb_limit: Option<Duration>) -> RecvOutcome {
    match hb_limit {
        Some(limit) => match timeout(limit, decode_once(decoder)).await {
            Ok(outcome) => outcome,
            Err(_) => RecvOutcome::HeartbeatTimeout,
        },
        None => decode_once(decoder).await,
    }
}

async fn decode_once(decoder: &mut RecordDecoder) -> RecvOutcome {
    let rec = match decoder.decode_ref().await {
        Ok(Some(rec_ref)) => {
            let rtype = rec_ref.header().rtype;
            match RecordEnum::try_from_ref(rec_ref) {
                Ok(rec) => rec,
                Err(_) => return RecvOutcome::UnknownRecord(rtype),
            }
        }
        Ok(None) => return RecvOutcome::Eof,
        Err(e) => return RecvOutcome::Err(e),
    };
    RecvOutcome::Record(rec, decoder.last_ts_out())
}
