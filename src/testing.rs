//! 测试辅助工具模块
//! Test utilities module
//!
//! An in-memory transport whose handshakes can succeed, fail or be held open,
//! and a monitor that records what it is told.

#![cfg(test)]

use crate::{
    config::ConnectOptions,
    error::{Error, Result},
    monitor::Monitor,
    transport::{Transport, TransportChannel, TransportHandle},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::{
    sync::{Semaphore, watch},
    time::Instant,
};

/// What every handshake does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    /// Wait for [`MockTransport::release`] and then succeed.
    Hold,
}

#[derive(Debug)]
struct MockTransportState {
    behavior: ConnectBehavior,
    attempts: Mutex<Vec<(Instant, String)>>,
    handles: Mutex<Vec<Arc<SessionState>>>,
    gate: Semaphore,
}

/// A transport that never touches the network.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            state: Arc::new(MockTransportState {
                behavior,
                attempts: Mutex::new(Vec::new()),
                handles: Mutex::new(Vec::new()),
                gate: Semaphore::new(0),
            }),
        }
    }

    /// Lets one held handshake complete.
    pub fn release(&self) {
        self.state.gate.add_permits(1);
    }

    /// Start times of every handshake so far.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn attempt_uris(&self) -> Vec<String> {
        self.state
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, uri)| uri.clone())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.lock().unwrap().len()
    }

    /// Every session handed out, oldest first.
    pub fn sessions(&self) -> Vec<Arc<SessionState>> {
        self.state.handles.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Handle = MockHandle;

    async fn connect(&self, uri: &str, _options: &ConnectOptions) -> Result<MockHandle> {
        self.state
            .attempts
            .lock()
            .unwrap()
            .push((Instant::now(), uri.to_string()));
        match self.state.behavior {
            ConnectBehavior::Fail => return Err(Error::transport("connection refused")),
            ConnectBehavior::Hold => {
                self.state
                    .gate
                    .acquire()
                    .await
                    .map_err(Error::transport)?
                    .forget();
            }
            ConnectBehavior::Succeed => {}
        }
        let session = Arc::new(SessionState::new());
        self.state.handles.lock().unwrap().push(Arc::clone(&session));
        Ok(MockHandle { session })
    }
}

/// Observable state of one mock session.
#[derive(Debug)]
pub struct SessionState {
    closes: AtomicUsize,
    dead: watch::Sender<bool>,
    channels_opened: AtomicUsize,
    channels_closed: AtomicUsize,
    fail_channel_open: AtomicBool,
    fail_channel_close: AtomicBool,
    channel_error: watch::Sender<bool>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            closes: AtomicUsize::new(0),
            dead: watch::Sender::new(false),
            channels_opened: AtomicUsize::new(0),
            channels_closed: AtomicUsize::new(0),
            fail_channel_open: AtomicBool::new(false),
            fail_channel_close: AtomicBool::new(false),
            channel_error: watch::Sender::new(false),
        }
    }

    /// Simulates the server dropping the session.
    pub fn kill(&self) {
        self.dead.send_replace(true);
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn channels_opened(&self) -> usize {
        self.channels_opened.load(Ordering::SeqCst)
    }

    pub fn channels_closed(&self) -> usize {
        self.channels_closed.load(Ordering::SeqCst)
    }

    pub fn fail_channel_open(&self) {
        self.fail_channel_open.store(true, Ordering::SeqCst);
    }

    pub fn fail_channel_close(&self) {
        self.fail_channel_close.store(true, Ordering::SeqCst);
    }

    /// Makes every open channel report an error.
    pub fn break_channels(&self) {
        self.channel_error.send_replace(true);
    }
}

#[derive(Debug)]
pub struct MockHandle {
    session: Arc<SessionState>,
}

#[async_trait]
impl TransportHandle for MockHandle {
    type Channel = MockChannel;

    async fn create_channel(&self) -> Result<MockChannel> {
        if self.session.fail_channel_open.load(Ordering::SeqCst) {
            return Err(Error::transport("channel open refused"));
        }
        self.session.channels_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockChannel {
            session: Arc::clone(&self.session),
            confirm: false,
        })
    }

    async fn create_confirm_channel(&self) -> Result<MockChannel> {
        let mut channel = self.create_channel().await?;
        channel.confirm = true;
        Ok(channel)
    }

    async fn close(&self) -> Result<()> {
        self.session.closes.fetch_add(1, Ordering::SeqCst);
        let already_dead = self.session.dead.send_replace(true);
        if already_dead {
            return Err(Error::transport("connection already closed"));
        }
        Ok(())
    }

    async fn closed(&self) -> Error {
        let mut dead = self.session.dead.subscribe();
        let _ = dead.wait_for(|dead| *dead).await;
        Error::transport("connection closed")
    }
}

#[derive(Debug)]
pub struct MockChannel {
    session: Arc<SessionState>,
    pub confirm: bool,
}

#[async_trait]
impl TransportChannel for MockChannel {
    async fn close(&self) -> Result<()> {
        self.session.channels_closed.fetch_add(1, Ordering::SeqCst);
        if self.session.fail_channel_close.load(Ordering::SeqCst) {
            return Err(Error::transport("channel close failed"));
        }
        Ok(())
    }

    async fn failed(&self) -> Error {
        let mut broken = self.session.channel_error.subscribe();
        let _ = broken.wait_for(|broken| *broken).await;
        Error::transport("channel error")
    }
}

/// A monitor that keeps every counter and measurement.
#[derive(Debug, Clone, Default)]
pub struct RecordingMonitor {
    counts: Arc<Mutex<HashMap<String, u64>>>,
    measurements: Arc<Mutex<Vec<(String, f64)>>>,
}

impl RecordingMonitor {
    pub fn count_of(&self, key: &str) -> u64 {
        self.counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn measurements_of(&self, key: &str) -> Vec<f64> {
        self.measurements
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl Monitor for RecordingMonitor {
    fn count(&self, key: &str, value: u64) {
        *self.counts.lock().unwrap().entry(key.to_string()).or_default() += value;
    }

    fn measure(&self, key: &str, value: f64) {
        self.measurements
            .lock()
            .unwrap()
            .push((key.to_string(), value));
    }
}
