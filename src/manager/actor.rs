//! The implementation of the `ManagerActor`, the single owner of all
//! connection state.
//!
//! 管理器actor的实现，它是所有连接状态的唯一所有者。

use super::command::{ManagerCommand, ManagerEvent};
use crate::{
    config::{Config, ConnectOptions},
    connection::{Connection, ConnectionId, ConnectionState},
    credentials::{self, CredentialProvider, ResolvedCredentials},
    error::{Error, Result},
    monitor::{self, Monitor},
    timer::{TimerEntryId, TimerQueue},
    transport::{Transport, TransportHandle},
};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, trace, warn};

/// Things the actor waits for besides commands and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    /// The periodic (or rotation) recycle.
    Recycle,
    /// The throttled connect attempt of a waiting connection.
    Connect(ConnectionId),
    /// The end of a retirement drain.
    Finish(ConnectionId),
}

/// A pool entry: the connection plus what the actor tracks about it.
///
/// 连接池条目：连接本身以及actor为其跟踪的信息。
struct PooledConnection<H: TransportHandle> {
    connection: Connection<H>,
    connect_timer: Option<TimerEntryId>,
    attempt_started: Option<Instant>,
    /// Watches the installed session for errors and unexpected closes.
    watcher: Option<JoinHandle<()>>,
}

/// Channels through which the actor publishes state to the handles.
pub(crate) struct Publishers<H: TransportHandle> {
    pub(crate) connected_tx: broadcast::Sender<Connection<H>>,
    pub(crate) active_tx: watch::Sender<Option<Connection<H>>>,
    pub(crate) namespace_tx: watch::Sender<Option<String>>,
}

/// The actor that owns the connection pool and the recycle scheduler.
///
/// It runs in a dedicated task. All connection state transitions happen here,
/// one at a time, so every check-then-act sequence is atomic with respect to
/// the rest of the system.
///
/// 拥有连接池和回收调度器的actor。
///
/// 它在专用任务中运行。所有连接状态转换都在这里逐一发生，
/// 因此每个“先检查后执行”的序列相对于系统其余部分都是原子的。
pub(crate) struct ManagerActor<T: Transport> {
    transport: Arc<T>,
    provider: Arc<dyn CredentialProvider>,
    monitor: Arc<dyn Monitor>,
    config: Config,

    running: bool,
    /// Newest first. Only the head may be waiting, connecting or connected.
    pool: VecDeque<PooledConnection<T::Handle>>,
    last_attempt: Option<Instant>,
    next_connection_id: u64,
    credentials: Option<ResolvedCredentials>,
    recycle_every: Duration,
    recycle_timer: Option<TimerEntryId>,
    timers: TimerQueue<TimerEvent>,
    stop_waiters: Vec<oneshot::Sender<Result<()>>>,

    command_rx: mpsc::Receiver<ManagerCommand>,
    /// Handed to new connections as their back-reference.
    command_tx: mpsc::WeakSender<ManagerCommand>,
    commands_open: bool,
    event_tx: mpsc::Sender<ManagerEvent<T::Handle>>,
    event_rx: mpsc::Receiver<ManagerEvent<T::Handle>>,
    publishers: Publishers<T::Handle>,
}

impl<T: Transport> ManagerActor<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        provider: Arc<dyn CredentialProvider>,
        monitor: Arc<dyn Monitor>,
        config: Config,
        command_rx: mpsc::Receiver<ManagerCommand>,
        command_tx: mpsc::WeakSender<ManagerCommand>,
        publishers: Publishers<T::Handle>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(128);
        let recycle_every = config.recycle_interval;
        Self {
            transport,
            provider,
            monitor,
            config,
            running: false,
            pool: VecDeque::new(),
            last_attempt: None,
            next_connection_id: 1,
            credentials: None,
            recycle_every,
            recycle_timer: None,
            timers: TimerQueue::new(),
            stop_waiters: Vec::new(),
            command_rx,
            command_tx,
            commands_open: true,
            event_tx,
            event_rx,
            publishers,
        }
    }

    /// Runs the actor's main event loop.
    ///
    /// The loop ends once every public handle is gone and the pool has drained.
    ///
    /// 运行 actor 的主事件循环。
    ///
    /// 当所有公共句柄都已释放且连接池排空后，循环结束。
    pub(crate) async fn run(mut self) {
        loop {
            let deadline = self.timers.next_deadline();
            tokio::select! {
                // Commands first, so a caller's follow-up request (a `stop()`
                // right after `start()`) is seen before any timer or handshake result.
                // 优先处理命令，使调用者的后续请求先于定时器和握手结果被处理。
                biased;

                // 1. Handle commands from the public handles and connections.
                // 1. 处理来自公共句柄和连接的命令。
                command = self.command_rx.recv(), if self.commands_open => match command {
                    Some(command) => {
                        self.handle_command(command);
                        // Let the woken caller queue its next command.
                        tokio::task::yield_now().await;
                    }
                    None => self.handles_dropped(),
                },
                // 2. Handle results reported by handshake and watcher tasks.
                // 2. 处理握手和监视任务回报的结果。
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event);
                }
                // 3. Fire expired timers.
                // 3. 触发已到期的定时器。
                _ = sleep_until(deadline) => {
                    self.fire_expired_timers();
                }
            }

            if !self.commands_open && self.pool.is_empty() {
                break;
            }
        }
        info!("client manager exited");
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Start { response_tx } => {
                let _ = response_tx.send(self.start());
            }
            ManagerCommand::Stop { response_tx } => self.stop(response_tx),
            ManagerCommand::Recycle => self.recycle(),
            ManagerCommand::ConnectionFailed { id } => self.connection_failed(id),
            ManagerCommand::Retire { id } => {
                // Retiring the live head is a recycle: it gets a replacement.
                let is_head = self.pool.front().is_some_and(|e| e.connection.id() == id);
                if self.running && is_head {
                    self.recycle();
                } else {
                    self.retire(id);
                }
            }
            ManagerCommand::PoolStates { response_tx } => {
                let states = self
                    .pool
                    .iter()
                    .map(|entry| (entry.connection.id(), entry.connection.state()))
                    .collect();
                let _ = response_tx.send(states);
            }
        }
    }

    fn handle_event(&mut self, event: ManagerEvent<T::Handle>) {
        match event {
            ManagerEvent::Handshake {
                id,
                fetched,
                result,
            } => {
                if let Some(credentials) = fetched {
                    self.cache_credentials(credentials);
                }
                self.handshake_finished(id, result);
            }
            ManagerEvent::SessionLost { id, error } => {
                // Errors observed after retirement are expected.
                let connected = self
                    .connection(id)
                    .is_some_and(|c| c.state() == ConnectionState::Connected);
                if connected {
                    warn!(conn_id = %id, %error, "connection closed unexpectedly");
                    self.monitor.count(monitor::FAILED, 1);
                    self.connection_failed(id);
                } else {
                    trace!(conn_id = %id, %error, "ignoring session error of retired connection");
                }
            }
        }
    }

    fn fire_expired_timers(&mut self) {
        let now = Instant::now();
        while let Some(event) = self.timers.pop_expired(now) {
            trace!(?event, "timer fired");
            match event {
                TimerEvent::Recycle => self.periodic_recycle(),
                TimerEvent::Connect(id) => self.connect(id),
                TimerEvent::Finish(id) => self.finish(id),
            }
        }
    }

    // --- Lifecycle of the manager ---

    fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::AlreadyRunning);
        }
        if !self.stop_waiters.is_empty() {
            return Err(Error::ShuttingDown);
        }
        info!("starting");
        self.running = true;
        self.recycle();
        self.schedule_periodic_recycle();
        Ok(())
    }

    fn stop(&mut self, response_tx: oneshot::Sender<Result<()>>) {
        if !self.running {
            let _ = response_tx.send(Err(Error::NotRunning));
            return;
        }
        info!(pool_size = self.pool.len(), "stopping");
        self.shut_down();
        if self.pool.is_empty() {
            let _ = response_tx.send(Ok(()));
        } else {
            self.stop_waiters.push(response_tx);
        }
    }

    /// Every handle was dropped: behave as if `stop()` had been called.
    fn handles_dropped(&mut self) {
        self.commands_open = false;
        if self.running {
            info!("all handles dropped, draining connections");
            self.shut_down();
        }
    }

    fn shut_down(&mut self) {
        self.running = false;
        if let Some(timer) = self.recycle_timer.take() {
            self.timers.cancel(timer);
        }
        // Retires the live connection without a replacement.
        self.recycle();
    }

    // --- Pool scheduling ---

    /// Retires the head connection and, while running, queues a replacement
    /// whose connect attempt respects `min_reconnection_interval`.
    ///
    /// 退役头部连接，并在运行时排入一个替代连接，其连接尝试遵守
    /// `min_reconnection_interval`。
    fn recycle(&mut self) {
        debug!(pool_size = self.pool.len(), "recycling");
        self.monitor.count(monitor::RECYCLE, 1);

        if let Some(head) = self.pool.front().map(|entry| entry.connection.id()) {
            self.retire(head);
        }

        if self.running {
            let id = ConnectionId::new(self.next_connection_id);
            self.next_connection_id += 1;
            let connection = Connection::new(id, self.command_tx.clone());

            // Measured from the start of the previous attempt.
            let now = Instant::now();
            let connect_at = match self.last_attempt {
                Some(last) => (last + self.config.min_reconnection_interval).max(now),
                None => now,
            };
            if connect_at > now {
                debug!(
                    conn_id = %id,
                    delay_ms = (connect_at - now).as_millis() as u64,
                    "throttling connection attempt"
                );
            }
            let connect_timer = self.timers.schedule(connect_at, TimerEvent::Connect(id));

            self.pool.push_front(PooledConnection {
                connection,
                connect_timer: Some(connect_timer),
                attempt_started: None,
                watcher: None,
            });
        }

        self.publish_active();
    }

    fn periodic_recycle(&mut self) {
        self.recycle_timer = None;
        if !self.running {
            return;
        }
        if self
            .credentials
            .as_ref()
            .is_some_and(|c| c.rotation_interval.is_some())
        {
            debug!("rotation interval elapsed, refreshing credentials");
            self.credentials = None;
        }
        self.recycle();
        self.schedule_periodic_recycle();
    }

    /// Replaces any pending periodic recycle with one `recycle_every` from now.
    fn schedule_periodic_recycle(&mut self) {
        if let Some(timer) = self.recycle_timer.take() {
            self.timers.cancel(timer);
        }
        let deadline = Instant::now() + self.recycle_every;
        self.recycle_timer = Some(self.timers.schedule(deadline, TimerEvent::Recycle));
    }

    fn cache_credentials(&mut self, credentials: ResolvedCredentials) {
        self.publishers
            .namespace_tx
            .send_replace(Some(credentials.namespace.clone()));

        let every = match credentials.rotation_interval {
            Some(interval) if interval.is_zero() => {
                warn!("ignoring zero rotation interval");
                self.config.recycle_interval
            }
            Some(interval) => interval,
            None => self.config.recycle_interval,
        };
        let suggested = credentials.rotation_interval.is_some();
        self.credentials = Some(credentials);

        if suggested || every != self.recycle_every {
            debug!(interval_ms = every.as_millis() as u64, "rescheduling periodic recycle");
            self.recycle_every = every;
            if self.running {
                self.schedule_periodic_recycle();
            }
        }
    }

    // --- Connection transitions ---

    fn connect(&mut self, id: ConnectionId) {
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        entry.connect_timer = None;
        if !entry.connection.begin_connecting() {
            return;
        }
        let now = Instant::now();
        entry.attempt_started = Some(now);
        self.last_attempt = Some(now);
        self.monitor.count(monitor::ATTEMPT, 1);

        tokio::spawn(handshake(
            id,
            Arc::clone(&self.transport),
            Arc::clone(&self.provider),
            self.credentials.clone(),
            self.config.connect.clone(),
            self.event_tx.clone(),
        ));
    }

    fn handshake_finished(&mut self, id: ConnectionId, result: Result<T::Handle>) {
        let handle = match result {
            Ok(handle) => Arc::new(handle),
            Err(error) => {
                warn!(conn_id = %id, %error, "error while connecting");
                self.monitor.count(monitor::FAILED, 1);
                // Stale credentials may be the cause; the next attempt fetches again.
                self.credentials = None;
                self.connection_failed(id);
                return;
            }
        };

        let event_tx = self.event_tx.clone();
        let Some(entry) = self.entry_mut(id) else {
            debug!(conn_id = %id, "connection finished during handshake, closing new session");
            spawn_close(id, handle);
            return;
        };
        if !entry.connection.install(Arc::clone(&handle)) {
            // Retired while the handshake was in flight; this session is not needed.
            debug!(conn_id = %id, "connection retired during handshake, closing new session");
            spawn_close(id, handle);
            return;
        }

        let watched = Arc::clone(&handle);
        entry.watcher = Some(tokio::spawn(async move {
            let error = watched.closed().await;
            let _ = event_tx.send(ManagerEvent::SessionLost { id, error }).await;
        }));
        let connection = entry.connection.clone();
        let started = entry.attempt_started;

        if let Some(started) = started {
            self.monitor
                .measure(monitor::HANDSHAKE_MS, started.elapsed().as_secs_f64() * 1000.0);
        }
        self.monitor.count(monitor::CONNECTED, 1);
        info!(conn_id = %id, "connected");

        self.publish_active();
        // No subscribers is fine.
        let _ = self.publishers.connected_tx.send(connection);
    }

    /// Failures only matter for live connections; the manager, not the
    /// connection, decides on retirement and replacement.
    fn connection_failed(&mut self, id: ConnectionId) {
        let Some(connection) = self.connection(id) else {
            return;
        };
        if connection.state().is_retired() {
            return;
        }
        debug!(conn_id = %id, "failed");
        self.recycle();
    }

    fn retire(&mut self, id: ConnectionId) {
        let delay = self.config.retirement_delay;
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        if !entry.connection.begin_retiring() {
            return;
        }
        let connect_timer = entry.connect_timer.take();
        if let Some(timer) = connect_timer {
            self.timers.cancel(timer);
        }
        self.timers
            .schedule(Instant::now() + delay, TimerEvent::Finish(id));
        self.monitor.count(monitor::RETIRED, 1);
        debug!(conn_id = %id, delay_ms = delay.as_millis() as u64, "retiring");
        self.publish_active();
    }

    fn finish(&mut self, id: ConnectionId) {
        let Some(position) = self.pool.iter().position(|e| e.connection.id() == id) else {
            return;
        };
        let Some(entry) = self.pool.remove(position) else {
            return;
        };
        if let Some(watcher) = entry.watcher {
            watcher.abort();
        }
        if let Some(handle) = entry.connection.finish() {
            debug!(conn_id = %id, "finished, closing transport session");
            spawn_close(id, handle);
        } else {
            debug!(conn_id = %id, "finished");
        }
        self.monitor.count(monitor::FINISHED, 1);
        self.publish_active();

        if self.pool.is_empty() && !self.stop_waiters.is_empty() {
            info!("all connections finished");
            for waiter in self.stop_waiters.drain(..) {
                let _ = waiter.send(Ok(()));
            }
        }
    }

    // --- Helpers ---

    fn entry_mut(&mut self, id: ConnectionId) -> Option<&mut PooledConnection<T::Handle>> {
        self.pool.iter_mut().find(|e| e.connection.id() == id)
    }

    fn connection(&self, id: ConnectionId) -> Option<&Connection<T::Handle>> {
        self.pool
            .iter()
            .map(|e| &e.connection)
            .find(|c| c.id() == id)
    }

    /// The head, if running and exactly `Connected`.
    fn publish_active(&self) {
        let active = self
            .pool
            .front()
            .filter(|_| self.running)
            .map(|e| &e.connection)
            .filter(|c| c.state() == ConnectionState::Connected)
            .cloned();
        self.publishers.active_tx.send_if_modified(|current| {
            if *current == active {
                return false;
            }
            *current = active;
            true
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Closes a session in the background; a dead session cannot close cleanly,
/// so errors are only logged.
fn spawn_close<H: TransportHandle>(id: ConnectionId, handle: Arc<H>) {
    tokio::spawn(async move {
        if let Err(error) = handle.close().await {
            debug!(conn_id = %id, %error, "ignoring error while closing session");
        }
    });
}

/// Fetches credentials if needed and performs the transport handshake,
/// reporting the outcome to the actor.
///
/// 按需获取凭据并执行传输握手，将结果回报给actor。
async fn handshake<T: Transport>(
    id: ConnectionId,
    transport: Arc<T>,
    provider: Arc<dyn CredentialProvider>,
    cached: Option<ResolvedCredentials>,
    options: ConnectOptions,
    event_tx: mpsc::Sender<ManagerEvent<T::Handle>>,
) {
    debug!(conn_id = %id, "connecting");
    let (fetched, credentials) = match cached {
        Some(credentials) => (None, credentials),
        None => match credentials::fetch(provider.as_ref()).await {
            Ok(credentials) => (Some(credentials.clone()), credentials),
            Err(error) => {
                let _ = event_tx
                    .send(ManagerEvent::Handshake {
                        id,
                        fetched: None,
                        result: Err(error),
                    })
                    .await;
                return;
            }
        },
    };

    let result = transport
        .connect(&credentials.connection_string, &options)
        .await;

    let event = ManagerEvent::Handshake {
        id,
        fetched,
        result,
    };
    if let Err(mpsc::error::SendError(event)) = event_tx.send(event).await {
        // The manager is gone; nobody else will close this session.
        if let ManagerEvent::Handshake {
            result: Ok(handle), ..
        } = event
        {
            let _ = handle.close().await;
        }
    }
}
