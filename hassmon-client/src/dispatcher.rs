//! Delivery of state change events to the user callback
//!
//! The callback runs inline on the read loop, one event at a time, in the
//! order frames arrived. A callback that returns an error or panics is logged
//! with the offending entity id and the loop moves on to the next frame.
//!
//! # Examples
//!
//! ```rust
//! use hassmon_client::{DispatchOutcome, Dispatcher};
//! use hassmon_core::StateChangeEvent;
//!
//! # async fn example(event: StateChangeEvent) {
//! let dispatcher = Dispatcher::new(|event: StateChangeEvent| async move {
//!     if event.new_state.is_none() {
//!         return Err(format!("{} has no value", event.entity_id).into());
//!     }
//!     Ok(())
//! });
//!
//! let outcome = dispatcher.dispatch(event).await;
//! assert!(matches!(outcome, DispatchOutcome::Delivered | DispatchOutcome::Failed));
//! # }
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use hassmon_core::StateChangeEvent;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Error type a callback may return
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one callback invocation
pub type CallbackResult = Result<(), CallbackError>;

/// Type-erased callback
pub type EventCallback =
    Arc<dyn Fn(StateChangeEvent) -> BoxFuture<'static, CallbackResult> + Send + Sync>;

/// What happened to a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// The callback returned an error
    Failed,
    /// The callback panicked
    Panicked,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::Panicked => "panicked",
        }
    }
}

/// Invokes the user callback with fault isolation
#[derive(Clone)]
pub struct Dispatcher {
    callback: EventCallback,
}

impl Dispatcher {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(StateChangeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let callback: EventCallback = Arc::new(move |event| Box::pin(callback(event)));
        Self { callback }
    }

    /// A dispatcher that discards every event
    pub fn noop() -> Self {
        Self::new(|_event| async { Ok(()) })
    }

    /// Run the callback for `event` and contain any failure
    pub async fn dispatch(&self, event: StateChangeEvent) -> DispatchOutcome {
        let entity_id = event.entity_id.clone();
        let subscription_id = event.subscription_id;
        let callback = Arc::clone(&self.callback);

        // The call itself sits inside the future so a panic before the first await is caught too.
        let invocation = AssertUnwindSafe(async move { callback(event).await }).catch_unwind();

        match invocation.await {
            Ok(Ok(())) => DispatchOutcome::Delivered,
            Ok(Err(error)) => {
                tracing::error!(
                    entity_id = %entity_id,
                    subscription_id,
                    error = %error,
                    "Error in state change callback"
                );
                DispatchOutcome::Failed
            }
            Err(panic) => {
                tracing::error!(
                    entity_id = %entity_id,
                    subscription_id,
                    panic = %panic_message(panic.as_ref()),
                    "State change callback panicked"
                );
                DispatchOutcome::Panicked
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::noop()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
