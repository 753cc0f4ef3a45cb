//! Outstanding requests, one per event type.
//!
//! The table owns every callback waiting on a request. An entry leaves the
//! table exactly once: on result, cancellation, timeout, send failure or
//! connection teardown. Whoever removes it settles its callbacks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::RequestError;
use crate::protocol::RequestId;

/// Outcome delivered to request callbacks.
pub type RequestResult = Result<Value, RequestError>;

/// Continuation invoked once with the outcome of a request.
pub type ResponseCallback = Box<dyn FnOnce(RequestResult)>;

/// One in-flight request.
pub(crate) struct PendingRequest {
    event_type: String,
    id: RequestId,
    callbacks: Vec<ResponseCallback>,
    acknowledged: bool,
    started_at: Instant,
    timeout: Duration,
    data: Value,
    data_infos: Option<Value>,
}

impl PendingRequest {
    pub(crate) fn new(
        event_type: &str,
        id: RequestId,
        callback: ResponseCallback,
        started_at: Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            event_type: event_type.to_owned(),
            id,
            callbacks: vec![callback],
            acknowledged: false,
            started_at,
            timeout,
            data: Value::Null,
            data_infos: None,
        }
    }

    /// Stores the payload re-sent in the execute phase.
    pub(crate) fn with_payload(mut self, data: Value, data_infos: Option<Value>) -> Self {
        self.data = data;
        self.data_infos = data_infos;
        self
    }

    pub(crate) fn event_type(&self) -> &str {
        &self.event_type
    }

    pub(crate) const fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) const fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub(crate) const fn data(&self) -> &Value {
        &self.data
    }

    pub(crate) const fn data_infos(&self) -> Option<&Value> {
        self.data_infos.as_ref()
    }

    /// Marks the request as taken by a fulfiller and restarts its clock.
    pub(crate) const fn acknowledge(&mut self, now: Instant) {
        self.acknowledged = true;
        self.started_at = now;
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Acknowledged requests never expire; only discovery is bounded.
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        !self.acknowledged && self.elapsed(now) > self.timeout
    }

    pub(crate) fn timeout_error(&self, now: Instant) -> RequestError {
        RequestError::TimedOut {
            event_type: self.event_type.clone(),
            elapsed_ms: millis(self.elapsed(now)),
            timeout_ms: millis(self.timeout),
        }
    }

    /// Delivers the same value to every waiter, in attachment order.
    pub(crate) fn resolve(self, value: &Value) {
        for callback in self.callbacks {
            callback(Ok(value.clone()));
        }
    }

    /// Delivers the same error to every waiter, in attachment order.
    pub(crate) fn reject(self, error: &RequestError) {
        for callback in self.callbacks {
            callback(Err(error.clone()));
        }
    }
}

/// Converts a duration to whole milliseconds, saturating.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Pending requests keyed by event type.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: HashMap<String, PendingRequest>,
    last_id: RequestId,
}

impl PendingTable {
    /// Allocates the next request id. Ids start at 1 and are never reused.
    pub(crate) const fn next_id(&mut self) -> RequestId {
        self.last_id += 1;
        self.last_id
    }

    pub(crate) fn contains(&self, event_type: &str) -> bool {
        self.entries.contains_key(event_type)
    }

    /// Appends a waiter to an in-flight request.
    ///
    /// Hands the callback back when nothing is pending for `event_type`.
    pub(crate) fn attach(
        &mut self,
        event_type: &str,
        callback: ResponseCallback,
    ) -> Result<(), ResponseCallback> {
        match self.entries.get_mut(event_type) {
            Some(entry) => {
                entry.callbacks.push(callback);
                Ok(())
            }
            None => Err(callback),
        }
    }

    pub(crate) fn insert(&mut self, request: PendingRequest) {
        self.entries.insert(request.event_type.clone(), request);
    }

    /// Returns the entry for `event_type` when its id is `id`.
    pub(crate) fn matching_mut(
        &mut self,
        event_type: &str,
        id: RequestId,
    ) -> Option<&mut PendingRequest> {
        self.entries
            .get_mut(event_type)
            .filter(|entry| entry.id == id)
    }

    /// Removes the entry for `event_type` when its id is `id`.
    ///
    /// A mismatched id leaves the table untouched.
    pub(crate) fn take_matching(
        &mut self,
        event_type: &str,
        id: RequestId,
    ) -> Option<PendingRequest> {
        self.matching_mut(event_type, id)?;
        self.entries.remove(event_type)
    }

    pub(crate) fn remove(&mut self, event_type: &str) -> Option<PendingRequest> {
        self.entries.remove(event_type)
    }

    /// Removes and returns every unacknowledged entry past its budget.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<PendingRequest> {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.event_type.clone())
            .collect();
        expired
            .iter()
            .filter_map(|event_type| self.entries.remove(event_type))
            .collect()
    }

    /// Removes every entry.
    pub(crate) fn drain(&mut self) -> Vec<PendingRequest> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
