use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dgg_chat::{ChatError, Connection, FrameSink, FrameSource, Result, Session, Transport};
use http::HeaderMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// What the next dial should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialScript {
    Accept,
    Fail,
    /// Park the dial until [`FakeTransport::release`] decides its outcome.
    Hold,
}

/// A dial as seen by the fake server.
#[derive(Debug, Clone)]
pub struct DialRecord {
    pub url: String,
    pub headers: HeaderMap,
    pub at: Instant,
}

/// In-memory transport. Dials succeed unless scripted otherwise.
pub struct FakeTransport {
    script: Mutex<VecDeque<DialScript>>,
    fail_by_default: AtomicBool,
    dials: Mutex<Vec<DialRecord>>,
    held: Mutex<VecDeque<oneshot::Sender<DialScript>>>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
    accepted_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEnd>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fail_by_default: AtomicBool::new(false),
            dials: Mutex::new(Vec::new()),
            held: Mutex::new(VecDeque::new()),
            accepted_tx,
            accepted_rx: tokio::sync::Mutex::new(accepted_rx),
        })
    }

    /// A session on this transport with the default reconnect policy.
    pub fn session(self: &Arc<Self>, login_key: Option<&str>) -> Session {
        let builder = Session::builder()
            .url("ws://chat.test/ws")
            .transport(self.clone());
        match login_key {
            Some(key) => builder.login_key(key).build().unwrap(),
            None => builder.build().unwrap(),
        }
    }

    pub fn script(&self, steps: &[DialScript]) {
        self.script.lock().unwrap().extend(steps.iter().copied());
    }

    /// Makes every unscripted dial fail.
    pub fn fail_by_default(&self, fail: bool) {
        self.fail_by_default.store(fail, Ordering::SeqCst);
    }

    pub fn dials(&self) -> Vec<DialRecord> {
        self.dials.lock().unwrap().clone()
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().unwrap().len()
    }

    /// Number of dials currently parked by [`DialScript::Hold`].
    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Lets the oldest held dial finish as `outcome`.
    pub fn release(&self, outcome: DialScript) {
        let gate = self
            .held
            .lock()
            .unwrap()
            .pop_front()
            .expect("no dial is held");
        let _ = gate.send(outcome);
    }

    /// Waits for the next accepted connection.
    pub async fn accepted(&self) -> ServerEnd {
        self.accepted_rx
            .lock()
            .await
            .recv()
            .await
            .expect("transport dropped")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn dial(&self, url: &str, headers: &HeaderMap) -> Result<Connection> {
        self.dials.lock().unwrap().push(DialRecord {
            url: url.to_string(),
            headers: headers.clone(),
            at: Instant::now(),
        });

        let mut step = self.script.lock().unwrap().pop_front().unwrap_or(
            if self.fail_by_default.load(Ordering::SeqCst) {
                DialScript::Fail
            } else {
                DialScript::Accept
            },
        );
        if step == DialScript::Hold {
            let (gate_tx, gate_rx) = oneshot::channel();
            self.held.lock().unwrap().push_back(gate_tx);
            step = gate_rx.await.unwrap_or(DialScript::Fail);
        }
        if step != DialScript::Accept {
            return Err(ChatError::Connection("connection refused".to_string()));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let writes = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let server = ServerEnd {
            frames: frames_tx,
            writes: writes.clone(),
            closed: closed.clone(),
        };
        let _ = self.accepted_tx.send(server);

        Ok(Connection {
            sink: Box::new(FakeSink { writes, closed }),
            source: Box::new(FakeSource { frames: frames_rx }),
        })
    }
}

/// The server's side of one accepted connection.
#[derive(Clone)]
pub struct ServerEnd {
    frames: mpsc::UnboundedSender<Result<String>>,
    writes: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl ServerEnd {
    pub fn push(&self, frame: &str) {
        let _ = self.frames.send(Ok(frame.to_string()));
    }

    /// Makes the client's pending read fail.
    pub fn break_connection(&self) {
        let _ = self
            .frames
            .send(Err(ChatError::Connection("connection reset".to_string())));
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// True once the client closed its end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeSink {
    writes: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn write_frame(&mut self, frame: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::Connection("write on closed connection".to_string()));
        }
        self.writes.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeSource {
    frames: mpsc::UnboundedReceiver<Result<String>>,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn read_frame(&mut self) -> Result<String> {
        match self.frames.recv().await {
            Some(frame) => frame,
            None => Err(ChatError::Connection("connection dropped".to_string())),
        }
    }
}
