//! End-to-end runs of the controller against a scripted in-memory broker.
//!
//! Run with:
//!   cargo test -p vzconn-agent --test controller_integration

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use vzconn_agent::testing::{memory_pair, BrokerEnd, MemoryConnector, RecordingCertApplier};
use vzconn_agent::{
    ConnectionState, ConnectorConfig, ConnectorError, Controller, FixedClock, Phase, Severity,
    StaticVizierInfo, VizierIdentity,
};
use vzconn_core::{
    Payload, RegisterVizierAck, RegistrationStatus, Topic, VizierHeartbeat, VizierHeartbeatAck,
    VizierId, VizierSslCertResponse,
};

const AGENT_ID: &str = "11111111-1111-1111-1111-111111111111";

// =============================================================================
// Scripted broker
// =============================================================================

/// What the broker saw, in arrival order.
#[derive(Default)]
struct Observed {
    registrations: usize,
    cert_requests: usize,
    heartbeats: Vec<VizierHeartbeat>,
}

/// Answer every request the Vizier sends. `ack_for` picks the sequence number
/// to acknowledge for the n-th heartbeat.
fn spawn_broker(
    mut broker: BrokerEnd,
    ack_for: impl Fn(usize, u64) -> u64 + Send + 'static,
) -> (Arc<Mutex<Observed>>, JoinHandle<()>) {
    let observed = Arc::new(Mutex::new(Observed::default()));
    let seen = Arc::clone(&observed);

    let handle = tokio::spawn(async move {
        while let Some(env) = broker.next_sent().await {
            match env.payload {
                Payload::RegisterVizierRequest(_) => {
                    seen.lock().registrations += 1;
                    broker.reply(
                        RegisterVizierAck {
                            status: RegistrationStatus::Ok,
                        },
                        Topic::Register,
                    );
                }
                Payload::VizierSslCertRequest(_) => {
                    seen.lock().cert_requests += 1;
                    broker.reply(
                        VizierSslCertResponse {
                            key: b"tls-key".to_vec(),
                            cert: b"tls-cert".to_vec(),
                        },
                        Topic::Ssl,
                    );
                }
                Payload::VizierHeartbeat(hb) => {
                    let n = {
                        let mut seen = seen.lock();
                        seen.heartbeats.push(hb.clone());
                        seen.heartbeats.len() - 1
                    };
                    let sequence_number = ack_for(n, hb.sequence_number);
                    broker.reply(VizierHeartbeatAck { sequence_number }, Topic::Heartbeat);
                }
                other => panic!("unexpected message from vizier: {}", other.type_name()),
            }
        }
    });

    (observed, handle)
}

fn controller(connector: MemoryConnector, applier: Arc<RecordingCertApplier>) -> Controller {
    let identity = VizierIdentity::new(AGENT_ID.parse::<VizierId>().unwrap(), "signing-key");
    let clock = FixedClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    Controller::with_clock(
        identity,
        Arc::new(connector),
        applier,
        Arc::new(StaticVizierInfo::new("34.1.2.3")),
        ConnectorConfig::default(),
        Arc::new(clock),
    )
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn registers_provisions_and_heartbeats_until_stopped() {
    let (stream, broker) = memory_pair();
    let (observed, _broker_task) = spawn_broker(broker, |_, seq| seq);
    let applier = Arc::new(RecordingCertApplier::new(true));

    let mut ctrl = controller(MemoryConnector::new(stream.clone()), Arc::clone(&applier));
    let state = ctrl.subscribe();

    ctrl.start().await.unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Heartbeating);

    // Heartbeats at t=0, 5 and 10.
    tokio::time::sleep(Duration::from_secs(12)).await;
    ctrl.stop();
    ctrl.wait().await.unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Stopped);

    let observed = observed.lock();
    assert_eq!(observed.registrations, 1);
    assert_eq!(observed.cert_requests, 1);
    let sequence: Vec<u64> = observed.heartbeats.iter().map(|hb| hb.sequence_number).collect();
    assert_eq!(sequence, vec![0, 1, 2]);
    for hb in &observed.heartbeats {
        assert_eq!(hb.vizier_id.to_string(), AGENT_ID);
        assert_eq!(hb.address, "34.1.2.3");
        assert_eq!(hb.time, 1_700_000_000);
    }

    assert_eq!(
        applier.calls(),
        vec![(b"tls-key".to_vec(), b"tls-cert".to_vec())]
    );
    // register + ssl + 3 heartbeats
    assert_eq!(stream.send_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn no_heartbeat_is_sent_after_stop() {
    let (stream, broker) = memory_pair();
    let (observed, _broker_task) = spawn_broker(broker, |_, seq| seq);

    let mut ctrl = controller(
        MemoryConnector::new(stream),
        Arc::new(RecordingCertApplier::new(true)),
    );
    ctrl.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stop = ctrl.stop_handle();
    stop.stop();
    stop.stop();
    ctrl.wait().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(observed.lock().heartbeats.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn wrong_sequence_ack_ends_the_connection() {
    let (stream, broker) = memory_pair();
    // Third heartbeat gets the ack meant for a fourth.
    let (observed, _broker_task) =
        spawn_broker(broker, |n, seq| if n == 2 { seq + 1 } else { seq });

    let mut ctrl = controller(
        MemoryConnector::new(stream),
        Arc::new(RecordingCertApplier::new(true)),
    );
    ctrl.start().await.unwrap();

    let err = ctrl.wait().await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Heartbeat));
    assert_eq!(err.severity(), Severity::FatalRuntime);
    assert!(matches!(
        err.root(),
        ConnectorError::SequenceMismatch {
            expected: 2,
            got: 3
        }
    ));
    assert_eq!(ctrl.state(), ConnectionState::Failed);
    assert_eq!(observed.lock().heartbeats.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn rejected_registration_never_reaches_cert_provisioning() {
    let (stream, broker) = memory_pair();
    for _ in 0..5 {
        broker.reply(
            RegisterVizierAck {
                status: RegistrationStatus::Failed,
            },
            Topic::Register,
        );
    }
    let applier = Arc::new(RecordingCertApplier::new(true));
    let connector = MemoryConnector::new(stream.clone());

    let mut ctrl = controller(connector, Arc::clone(&applier));
    let err = ctrl.start().await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Register));
    assert_eq!(err.severity(), Severity::FatalStartup);
    assert_eq!(stream.send_count(), 1);
    assert_eq!(stream.recv_count(), 5);
    assert!(applier.calls().is_empty());
    assert_eq!(ctrl.state(), ConnectionState::Failed);
    drop(broker);
}
