//! Crate-level behaviour tests and the in-memory relay they run on.

mod behaviour;
mod support;

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use self::support::Network;
use crate::handler::Handler;
use crate::pending::RequestResult;

#[test]
fn two_engines_complete_a_request_through_the_relay() {
    let mut network = Network::new();
    network.join("requester");
    network.join("fulfiller");
    network
        .peer("fulfiller")
        .on("ping", Handler::new(|_, payload| Ok(json!({ "got": payload }))))
        .expect("register");

    let outcome: Rc<RefCell<Option<RequestResult>>> = Rc::default();
    let sink = Rc::clone(&outcome);
    network
        .peer("requester")
        .request("ping", json!("hi"), move |result| *sink.borrow_mut() = Some(result));
    network.pump();

    assert_eq!(*outcome.borrow(), Some(Ok(json!([{ "got": ["hi"] }]))));
    assert_eq!(network.peer("requester").pending_count(), 0);
}

#[test]
fn peers_learn_distinct_connection_ids() {
    let mut network = Network::new();
    network.join("a");
    network.join("b");

    let first = network.peer("a").connection_id();
    let second = network.peer("b").connection_id();

    assert!(network.peer("a").is_connected());
    assert_ne!(first, second);
    assert_eq!(network.connection_of("a"), first);
}

#[test]
fn log_frames_reach_the_host_without_replies() {
    let mut network = Network::new();
    network.join("a");
    network.join("b");
    network.clear_wire();

    network.peer("a").log("hello").expect("log");
    network.pump();

    let phases: Vec<&str> = network
        .wire()
        .iter()
        .map(|routed| routed.phase.as_str())
        .collect();
    assert_eq!(phases, vec!["log"]);
}
