//! Ordered call/listen sequences that cannot miss their own events.
//!
//! A [`Batch`] subscribes every listen step before running anything, so an
//! event triggered by an earlier call is already routed to its listener by
//! the time the listen step starts waiting.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::MuxError;
use crate::mux::{Canceler, Listener, Multiplexer};

/// Log target for batch execution.
pub(crate) const BATCH_TARGET: &str = "switchyard::batch";

/// Holds the decoded output of one batch step once it has run.
///
/// Slots are cheap handles; clones observe the same value.
pub struct Slot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> Slot<T> {
    fn empty() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }

    fn fill(&self, value: T) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Moves the value out, leaving the slot empty.
    #[must_use]
    pub fn take(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Returns `true` when the step has stored a value.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T: Clone> Slot<T> {
    /// Returns a copy of the stored value.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        formatter.debug_tuple("Slot").field(&*value).finish()
    }
}

type ParamsFn = Box<dyn Fn() -> Result<Value, MuxError> + Send + Sync>;
type DeliverFn = Box<dyn Fn(Value) -> Result<(), MuxError> + Send + Sync>;

enum Step {
    Call {
        method: String,
        params: ParamsFn,
        deliver: DeliverFn,
    },
    Listen {
        topic: String,
        deliver: DeliverFn,
    },
}

impl Step {
    fn label(&self) -> &str {
        match self {
            Self::Call { method, .. } => method,
            Self::Listen { topic, .. } => topic,
        }
    }
}

fn deliver_into<T>(slot: &Slot<T>) -> DeliverFn
where
    T: DeserializeOwned + Send + 'static,
{
    let slot = slot.clone();
    Box::new(move |value| {
        let decoded = serde_json::from_value(value).map_err(MuxError::Protocol)?;
        slot.fill(decoded);
        Ok(())
    })
}

/// An ordered sequence of calls and event waits.
///
/// ```ignore
/// let mut batch = Batch::new();
/// batch.call::<_, IgnoredAny>("Page.enable", json!({}));
/// batch.call::<_, IgnoredAny>("Page.navigate", json!({"url": url}));
/// let loaded = batch.listen::<Value>("Page.loadEventFired");
/// batch.run(&mux, &cancel).await?;
/// ```
#[derive(Default)]
pub struct Batch {
    steps: Vec<Step>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call step with fixed params.
    ///
    /// Params are serialised when the step runs, so an encoding failure
    /// surfaces from [`run`](Self::run) as [`MuxError::Encode`].
    pub fn call<P, R>(&mut self, method: &str, params: P) -> Slot<R>
    where
        P: Serialize + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        self.call_with(method, move || {
            serde_json::to_value(&params).map_err(MuxError::Encode)
        })
    }

    /// Appends a call step whose params are built when the step runs.
    ///
    /// The builder may read slots filled by earlier steps.
    pub fn call_with<F, R>(&mut self, method: &str, build: F) -> Slot<R>
    where
        F: Fn() -> Result<Value, MuxError> + Send + Sync + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let slot = Slot::empty();
        self.steps.push(Step::Call {
            method: method.to_owned(),
            params: Box::new(build),
            deliver: deliver_into(&slot),
        });
        slot
    }

    /// Appends a step that waits for the next event on `topic`.
    ///
    /// The subscription is made before any step runs.
    pub fn listen<T>(&mut self, topic: &str) -> Slot<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let slot = Slot::empty();
        self.steps.push(Step::Listen {
            topic: topic.to_owned(),
            deliver: deliver_into(&slot),
        });
        slot
    }

    /// Number of declared steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` when no step has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in declaration order, stopping at the first failure.
    ///
    /// Every listener subscribed for this run is detached before the method
    /// returns, and also when the returned future is dropped part-way. A
    /// batch can be run again; each run subscribes afresh.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step unchanged.
    pub async fn run(&self, mux: &Multiplexer, cancel: &CancellationToken) -> Result<(), MuxError> {
        let mut cleanup = Cleanup::default();
        let mut plan: Vec<Prepared<'_>> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Call {
                    method,
                    params,
                    deliver,
                } => Prepared::Call {
                    method,
                    params,
                    deliver,
                },
                Step::Listen { topic, deliver } => {
                    let (listener, canceler) = mux.listen::<Value>(topic);
                    cleanup.0.push(canceler);
                    Prepared::Listen { listener, deliver }
                }
            })
            .collect();
        debug!(
            target: BATCH_TARGET,
            steps = plan.len(),
            listeners = cleanup.0.len(),
            "batch prepared"
        );

        for (index, (step, prepared)) in self.steps.iter().zip(plan.iter_mut()).enumerate() {
            if let Err(error) = prepared.run(mux, cancel).await {
                debug!(
                    target: BATCH_TARGET,
                    index,
                    step = step.label(),
                    %error,
                    "batch aborted"
                );
                return Err(error);
            }
        }
        Ok(())
    }
}

/// A step bound to one run: listen steps carry the listener subscribed for
/// that run.
enum Prepared<'a> {
    Call {
        method: &'a str,
        params: &'a ParamsFn,
        deliver: &'a DeliverFn,
    },
    Listen {
        listener: Listener<Value>,
        deliver: &'a DeliverFn,
    },
}

impl Prepared<'_> {
    async fn run(&mut self, mux: &Multiplexer, cancel: &CancellationToken) -> Result<(), MuxError> {
        match self {
            Self::Call {
                method,
                params,
                deliver,
            } => {
                let params = (**params)()?;
                let result = mux.call_value(method, params, cancel).await?;
                (**deliver)(result)
            }
            Self::Listen { listener, deliver } => {
                let params = listener.recv(cancel).await?;
                (**deliver)(params)
            }
        }
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = formatter.debug_list();
        for step in &self.steps {
            match step {
                Step::Call { method, .. } => list.entry(&format_args!("call {method}")),
                Step::Listen { topic, .. } => list.entry(&format_args!("listen {topic}")),
            };
        }
        list.finish()
    }
}

/// Cancels every prepared listener when the run ends, however it ends.
#[derive(Default)]
struct Cleanup(Vec<Canceler>);

impl Drop for Cleanup {
    fn drop(&mut self) {
        for canceler in &self.0 {
            canceler.cancel();
        }
        if !self.0.is_empty() {
            debug!(target: BATCH_TARGET, listeners = self.0.len(), "batch listeners detached");
        }
    }
}
