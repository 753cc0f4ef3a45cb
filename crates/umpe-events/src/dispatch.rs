//! Invocation of local handlers.

use std::cell::RefCell;

use serde_json::{Value, json};
use tracing::error;

use crate::error::RequestError;
use crate::handler::HandlerResult;
use crate::registry::{HandlerRegistry, WILDCARD_EVENT};

pub(crate) const DISPATCH_TARGET: &str = "umpe::dispatch";

/// Whether wildcard handlers observe a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wildcard {
    Notify,
    Skip,
}

/// Invokes the handlers for `event_type` in registration order.
///
/// Every handler runs even when an earlier one fails; failures are logged and
/// kept in the returned outcomes. Wildcard handlers run afterwards when
/// requested, and their outcomes are discarded.
pub(crate) fn notify_local(
    registry: &RefCell<HandlerRegistry>,
    event_type: &str,
    payload: &Value,
    wildcard: Wildcard,
) -> Vec<HandlerResult> {
    let handlers = registry.borrow().snapshot(event_type);
    let outcomes = handlers
        .iter()
        .map(|handler| {
            let outcome = handler.invoke(event_type, payload);
            if let Err(failure) = &outcome {
                error!(
                    target: DISPATCH_TARGET,
                    event_type,
                    error = %failure,
                    "event handler failed"
                );
            }
            outcome
        })
        .collect();

    if wildcard == Wildcard::Notify && event_type != WILDCARD_EVENT {
        let observers = registry.borrow().snapshot(WILDCARD_EVENT);
        for observer in &observers {
            if let Err(failure) = observer.invoke(event_type, payload) {
                error!(
                    target: DISPATCH_TARGET,
                    event_type,
                    error = %failure,
                    "wildcard handler failed"
                );
            }
        }
    }

    outcomes
}

/// Folds local handler outcomes into a request outcome.
///
/// The first failure rejects the whole request.
pub(crate) fn collect_local(
    event_type: &str,
    outcomes: Vec<HandlerResult>,
) -> Result<Value, RequestError> {
    outcomes
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
        .map_err(|source| RequestError::HandlerFailed {
            event_type: event_type.to_owned(),
            source,
        })
}

/// Encodes handler outcomes for a remote requester.
///
/// Failed slots become `{"error": "<message>"}` so the requester can tell
/// them apart from values.
pub(crate) fn encode_remote(outcomes: Vec<HandlerResult>) -> Value {
    Value::Array(
        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(value) => value,
                Err(failure) => json!({ "error": failure.message() }),
            })
            .collect(),
    )
}
