//! Scripted mock transport shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use grpc_resilient::{
    Channel, ChannelFactory, ChannelState, Code, Metadata, Status, TransportOptions,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type InvokeResult = Result<Value, Status>;

/// Factory whose channels answer invokes from a shared script queue.
/// An exhausted script answers `{"ok": true}`.
pub struct MockTransport {
    creates: AtomicUsize,
    create_failures: AtomicUsize,
    invokes: Arc<AtomicUsize>,
    ready_delay: Mutex<Duration>,
    script: Arc<Mutex<VecDeque<InvokeResult>>>,
    channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            creates: AtomicUsize::new(0),
            create_failures: AtomicUsize::new(0),
            invokes: Arc::new(AtomicUsize::new(0)),
            ready_delay: Mutex::new(Duration::ZERO),
            script: Arc::new(Mutex::new(VecDeque::new())),
            channels: Mutex::new(Vec::new()),
        })
    }

    /// Make the next `n` `create()` calls fail with UNAVAILABLE.
    pub fn fail_creates(&self, n: usize) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    /// Delay `wait_for_ready` on channels created from now on.
    pub fn set_ready_delay(&self, delay: Duration) {
        *self.ready_delay.lock().unwrap() = delay;
    }

    pub fn queue_ok(&self, value: Value) {
        self.script.lock().unwrap().push_back(Ok(value));
    }

    pub fn queue_status(&self, code: Code, message: &str) {
        self.script.lock().unwrap().push_back(Err(Status::new(code, message)));
    }

    pub fn queue_status_with_details(&self, code: Code, message: &str, details: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(Status::new(code, message).with_details(details)));
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn invoke_count(&self) -> usize {
        self.invokes.load(Ordering::SeqCst)
    }

    pub fn last_channel(&self) -> Arc<MockChannel> {
        self.channels.lock().unwrap().last().expect("no channel created yet").clone()
    }
}

impl ChannelFactory for MockTransport {
    fn create(&self, _options: &TransportOptions) -> Result<Arc<dyn Channel>, Status> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Status::new(Code::Unavailable, "connect ECONNREFUSED"));
        }
        let channel = Arc::new(MockChannel {
            script: self.script.clone(),
            invokes: self.invokes.clone(),
            state: Mutex::new(ChannelState::Ready),
            ready_delay: *self.ready_delay.lock().unwrap(),
            methods: Mutex::new(Vec::new()),
            metadata: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel)
    }
}

pub struct MockChannel {
    script: Arc<Mutex<VecDeque<InvokeResult>>>,
    invokes: Arc<AtomicUsize>,
    state: Mutex<ChannelState>,
    ready_delay: Duration,
    pub methods: Mutex<Vec<String>>,
    pub metadata: Mutex<Vec<Metadata>>,
    closed: AtomicBool,
}

impl MockChannel {
    pub fn set_state(&self, state: ChannelState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn recorded_metadata(&self) -> Vec<Metadata> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn recorded_methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn wait_for_ready(&self, _timeout: Duration) -> Result<(), Status> {
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }
        Ok(())
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }

    async fn invoke(
        &self,
        method: &str,
        _request: Value,
        metadata: &Metadata,
        _timeout: Duration,
    ) -> Result<Value, Status> {
        self.invokes.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().unwrap().push(method.to_string());
        self.metadata.lock().unwrap().push(metadata.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(json!({ "ok": true })))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
