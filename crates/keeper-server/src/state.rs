use std::sync::Arc;
use std::time::Duration;

use keeper_core::config::HttpConfig;
use keeper_core::store::BoxStore;
use keeper_core::Queue;

use crate::client::QueueHandle;

/// State of the queue service's handlers.
#[derive(Clone)]
pub struct QueueAppState {
    pub queue: Queue,
    pub dequeue_timeout: Duration,
}

impl QueueAppState {
    pub fn new(queue: Queue, http: &HttpConfig) -> Self {
        Self {
            queue,
            dequeue_timeout: http.dequeue_timeout(),
        }
    }
}

/// State of the box service's handlers.
#[derive(Clone)]
pub struct BoxAppState {
    pub store: Arc<dyn BoxStore>,
    pub queue: QueueHandle,
    pub dequeue_timeout: Duration,
}

impl BoxAppState {
    pub fn new(store: Arc<dyn BoxStore>, queue: QueueHandle, http: &HttpConfig) -> Self {
        Self {
            store,
            queue,
            dequeue_timeout: http.dequeue_timeout(),
        }
    }
}
