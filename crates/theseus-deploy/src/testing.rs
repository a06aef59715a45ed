//! In-memory runtime and record sinks for tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use theseus_state::{Container, StateError, StateResult};

use crate::orchestrator::ContainerRecords;
use crate::runtime::{
    ContainerRuntime, CreateSpec, RuntimeError, RuntimeErrorKind, RuntimeResult, RuntimeSession,
};

#[derive(Default)]
struct Inner {
    unreachable: bool,
    fail_pull: Option<RuntimeErrorKind>,
    fail_create: Option<RuntimeErrorKind>,
    fail_start: Option<RuntimeErrorKind>,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<String>>,
    specs: Mutex<Vec<CreateSpec>>,
    open_sessions: AtomicUsize,
    next_id: AtomicU64,
}

/// A runtime that succeeds unless told which step to fail.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    inner: Arc<Inner>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn configure(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Arc::try_unwrap(self.inner).unwrap_or_else(|_| {
            panic!("FakeRuntime must be configured before it is shared")
        });
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn unreachable(self) -> Self {
        self.configure(|i| i.unreachable = true)
    }

    pub fn fail_pull(self, kind: RuntimeErrorKind) -> Self {
        self.configure(|i| i.fail_pull = Some(kind))
    }

    pub fn fail_create(self, kind: RuntimeErrorKind) -> Self {
        self.configure(|i| i.fail_create = Some(kind))
    }

    pub fn fail_start(self, kind: RuntimeErrorKind) -> Self {
        self.configure(|i| i.fail_start = Some(kind))
    }

    /// Runtime calls in order, e.g. `"pull nginx"`, `"create web"`, `"start fake-1"`.
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Runtime ids of every container created so far.
    pub fn created(&self) -> Vec<String> {
        self.inner.created.lock().unwrap().clone()
    }

    pub fn create_specs(&self) -> Vec<CreateSpec> {
        self.inner.specs.lock().unwrap().clone()
    }

    /// Sessions handed out and not yet dropped.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn connect(&self) -> RuntimeResult<Box<dyn RuntimeSession>> {
        if self.inner.unreachable {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Unavailable,
                "fake runtime is unreachable",
            ));
        }
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            inner: self.inner.clone(),
        }))
    }
}

struct FakeSession {
    inner: Arc<Inner>,
}

impl FakeSession {
    fn log(&self, call: String) {
        self.inner.calls.lock().unwrap().push(call);
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuntimeSession for FakeSession {
    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        self.log(format!("pull {image}"));
        match self.inner.fail_pull {
            Some(kind) => Err(RuntimeError::new(kind, format!("cannot pull {image}"))),
            None => Ok(()),
        }
    }

    async fn create_container(&self, spec: &CreateSpec) -> RuntimeResult<String> {
        self.log(format!("create {}", spec.name));
        if let Some(kind) = self.inner.fail_create {
            return Err(RuntimeError::new(kind, format!("cannot create {}", spec.name)));
        }
        let id = format!("fake-{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.inner.created.lock().unwrap().push(id.clone());
        self.inner.specs.lock().unwrap().push(spec.clone());
        Ok(id)
    }

    async fn start_container(&self, runtime_id: &str) -> RuntimeResult<()> {
        self.log(format!("start {runtime_id}"));
        match self.inner.fail_start {
            Some(kind) => Err(RuntimeError::new(kind, format!("cannot start {runtime_id}"))),
            None => Ok(()),
        }
    }
}

/// A record sink whose every write fails.
pub struct FailingRecords;

impl ContainerRecords for FailingRecords {
    fn record(&self, _container: &Container) -> StateResult<()> {
        Err(StateError::TransactionFailed("disk full".to_string()))
    }
}
