//! End-to-end scenarios against a scripted HAL: heartbeat cadence, retry
//! exhaustion, class-exempt messages, overflow eviction and correlation.

use ocpp_core::hal::mock::{EventKind, MockHal};
use ocpp_core::{
    Action, ConfigKey, ConfigValue, Error, Message, MessageId, Role, Session, Tuning,
};

fn response(id: &MessageId, action: Action, is_error: bool) -> Message {
    Message {
        id: id.clone(),
        role: if is_error {
            Role::CallError
        } else {
            Role::CallResult
        },
        action,
        payload: Vec::new(),
    }
}

fn free_count(s: &Session<MockHal>) -> usize {
    s.hal()
        .events
        .iter()
        .filter(|(kind, _)| *kind == EventKind::Free)
        .count()
}

/// Complete a BootNotification round-trip at t=0 so the engine has a
/// fresh transmission timestamp.
fn boot(s: &mut Session<MockHal>) {
    s.push_request(Action::BootNotification, Vec::new(), false)
        .unwrap();
    s.step().unwrap();
    let id = s.hal().sent[0].id.clone();
    s.hal_mut()
        .push_incoming(response(&id, Action::BootNotification, false));
    s.step().unwrap();
}

#[test]
fn test_heartbeat_fires_at_interval_boundary() {
    let mut s = Session::new(MockHal::new());
    boot(&mut s);
    s.config_mut()
        .set(ConfigKey::HeartbeatInterval, ConfigValue::Int(30))
        .unwrap();

    s.hal_mut().set_now(29);
    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), 1, "no heartbeat before the interval");

    s.hal_mut().set_now(30);
    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), 2);
    let hb = s.hal().last_sent().unwrap();
    assert_eq!(hb.role, Role::Call);
    assert_eq!(hb.action, Action::Heartbeat);
}

#[test]
fn test_heartbeat_disabled_by_zero_interval() {
    let mut s = Session::new(MockHal::new());
    boot(&mut s);
    s.config_mut()
        .set(ConfigKey::HeartbeatInterval, ConfigValue::Int(0))
        .unwrap();

    s.hal_mut().set_now(100_000);
    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), 1);
}

#[test]
fn test_heartbeat_suppressed_while_work_pending() {
    let mut s = Session::new(MockHal::new());
    boot(&mut s);
    s.config_mut()
        .set(ConfigKey::HeartbeatInterval, ConfigValue::Int(30))
        .unwrap();

    // A request in flight keeps the link busy; no keep-alive on top of it.
    s.push_request(Action::DataTransfer, Vec::new(), false)
        .unwrap();
    s.hal_mut().set_now(90);
    s.step().unwrap();
    assert_eq!(s.hal().last_sent().unwrap().action, Action::DataTransfer);

    s.hal_mut().set_now(120);
    s.step().unwrap();
    assert!(s
        .hal()
        .sent
        .iter()
        .all(|m| m.action != Action::Heartbeat));
}

#[test]
fn test_boot_notification_survives_endless_send_failures() {
    let mut s = Session::new(MockHal::new());
    s.hal_mut().send_error = Some(-1);
    s.push_request(Action::BootNotification, Vec::new(), false)
        .unwrap();

    let interval = u64::from(s.config().heartbeat_interval());
    for i in 0..100 {
        s.hal_mut().set_now(i * interval);
        s.step().unwrap();
        assert_eq!(s.pending_requests(), 1);
    }
    assert_eq!(free_count(&s), 0);
    assert_eq!(s.hal().sent.len(), 100);
}

#[test]
fn test_droppable_freed_after_attempt_budget() {
    let tuning = Tuning {
        tx_timeout_sec: 5,
        tx_retries: 2,
    };
    let mut s = Session::with_tuning(MockHal::new(), tuning);
    s.hal_mut().send_error = Some(-1);
    s.push_request(Action::DataTransfer, Vec::new(), false)
        .unwrap();

    s.step().unwrap();
    s.hal_mut().set_now(5);
    s.step().unwrap();
    assert_eq!(free_count(&s), 0, "budget not exhausted yet");

    s.hal_mut().set_now(10);
    s.step().unwrap();
    assert_eq!(free_count(&s), 1);
    assert_eq!(s.pending_requests(), 0);

    let sends_so_far = s.hal().sent.len();
    s.hal_mut().set_now(15);
    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), sends_so_far, "no sends after the drop");
}

#[test]
fn test_forced_push_evicts_oldest_droppable() {
    let mut s = Session::new(MockHal::new());
    for _ in 0..ocpp_core::TX_POOL_LEN {
        s.push_request(Action::DataTransfer, Vec::new(), false)
            .unwrap();
    }

    assert!(matches!(
        s.push_request(Action::StartTransaction, Vec::new(), false),
        Err(Error::OutOfMemory)
    ));

    s.push_request(Action::StartTransaction, Vec::new(), true)
        .unwrap();
    assert_eq!(free_count(&s), 1);
    assert_eq!(s.pending_requests(), ocpp_core::TX_POOL_LEN);
    let (_, evicted) = &s.hal().events[0];
    assert_eq!(evicted.action, Action::DataTransfer);
}

#[test]
fn test_forced_push_fails_when_nothing_evictable() {
    let mut s = Session::new(MockHal::new());
    for _ in 0..ocpp_core::TX_POOL_LEN {
        s.push_request(Action::StartTransaction, Vec::new(), false)
            .unwrap();
    }

    assert!(matches!(
        s.push_request(Action::StartTransaction, Vec::new(), true),
        Err(Error::OutOfMemory)
    ));
    assert_eq!(free_count(&s), 0);
}

#[test]
fn test_transaction_call_error_backoff_until_attempts_exhausted() {
    let mut s = Session::new(MockHal::new());
    let retry = u64::from(s.config().transaction_message_retry_interval());
    assert_eq!(s.config().transaction_message_attempts(), 3);

    s.push_request(Action::StartTransaction, Vec::new(), false)
        .unwrap();
    s.step().unwrap();
    let id = s.hal().sent[0].id.clone();

    // First rejection: requeued with one backoff interval.
    s.hal_mut()
        .push_incoming(response(&id, Action::StartTransaction, true));
    s.step().unwrap();
    assert_eq!(free_count(&s), 0);
    assert_eq!(s.pending_requests(), 1);

    s.hal_mut().set_now(retry);
    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), 2);

    // Second rejection: requeued with two backoff intervals.
    s.hal_mut()
        .push_incoming(response(&id, Action::StartTransaction, true));
    s.step().unwrap();
    assert_eq!(free_count(&s), 0);

    s.hal_mut().set_now(retry + retry * 2);
    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), 3);

    // Third rejection exhausts TransactionMessageAttempts.
    s.hal_mut()
        .push_incoming(response(&id, Action::StartTransaction, true));
    s.step().unwrap();
    assert_eq!(free_count(&s), 1);
    assert_eq!(s.pending_requests(), 0);
}

#[test]
fn test_response_frees_matching_request_only() {
    let mut s = Session::new(MockHal::new());
    s.push_request(Action::Authorize, Vec::new(), false).unwrap();
    s.push_request(Action::DataTransfer, Vec::new(), false)
        .unwrap();

    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), 1);
    let id = s.hal().sent[0].id.clone();

    s.hal_mut()
        .push_incoming(response(&id, Action::Authorize, false));
    s.step().unwrap();

    let incoming: Vec<_> = s
        .hal()
        .events
        .iter()
        .filter(|(kind, _)| *kind == EventKind::Incoming)
        .collect();
    assert_eq!(incoming.len(), 1);
    assert_eq!(free_count(&s), 1);

    // The other request is untouched and goes out next.
    assert_eq!(s.pending_requests(), 1);
    s.step().unwrap();
    assert_eq!(s.hal().last_sent().unwrap().action, Action::DataTransfer);
}

#[test]
fn test_uncorrelated_response_is_reported_and_ignored() {
    let mut s = Session::new(MockHal::new());
    s.push_request(Action::Authorize, Vec::new(), false).unwrap();
    s.step().unwrap();

    let bogus = MockHal::message_id("unknown-id");
    s.hal_mut()
        .push_incoming(response(&bogus, Action::Authorize, false));
    s.step().unwrap();

    let (kind, msg) = s.hal().events.last().unwrap();
    assert_eq!(*kind, EventKind::Failed);
    assert_eq!(msg.id, bogus);
    assert_eq!(free_count(&s), 0);
    assert_eq!(s.pending_requests(), 1);
}

#[test]
fn test_free_precedes_incoming_on_settled_response() {
    let mut s = Session::new(MockHal::new());
    boot(&mut s);

    let kinds: Vec<EventKind> = s.hal().events.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec![EventKind::Free, EventKind::Incoming]);
}

#[test]
fn test_incoming_request_is_delivered() {
    let mut s = Session::new(MockHal::new());
    let call = Message {
        id: MockHal::message_id("csms-1"),
        role: Role::Call,
        action: Action::RemoteStartTransaction,
        payload: b"{\"connectorId\":1}".to_vec(),
    };
    s.hal_mut().push_incoming(call.clone());
    s.step().unwrap();

    let (kind, msg) = s.hal().events.last().unwrap();
    assert_eq!(*kind, EventKind::Incoming);
    assert_eq!(*msg, call);
}

#[test]
fn test_response_push_echoes_request_identity() {
    let mut s = Session::new(MockHal::new());
    let req = Message {
        id: MockHal::message_id("csms-2"),
        role: Role::Call,
        action: Action::GetConfiguration,
        payload: Vec::new(),
    };
    s.push_response(&req, b"{\"configurationKey\":[]}".to_vec(), false)
        .unwrap();
    s.step().unwrap();

    let sent = s.hal().last_sent().unwrap();
    assert_eq!(sent.id, req.id);
    assert_eq!(sent.role, Role::CallResult);
    assert_eq!(sent.action, Action::GetConfiguration);
    // Delivered responses are settled immediately.
    assert_eq!(s.pending_requests(), 0);
    assert_eq!(free_count(&s), 1);
}

#[test]
fn test_retry_jumps_ahead_of_fresh_pushes() {
    let mut s = Session::new(MockHal::new());
    s.push_request(Action::Authorize, Vec::new(), false).unwrap();
    s.step().unwrap(); // Authorize in flight

    s.push_request(Action::DataTransfer, Vec::new(), false)
        .unwrap();

    // Authorize times out; its retry must precede the fresh DataTransfer.
    s.hal_mut().set_now(10);
    s.step().unwrap();
    assert_eq!(s.hal().sent.len(), 2);
    assert_eq!(s.hal().sent[1].action, Action::Authorize);
}
