//! Integration tests for termwire.
//!
//! These tests drive publications, images and snapshots end to end.

use std::time::Duration;

use bytes::Bytes;
use termwire::config::{SnapshotConfig, TransportConfig};
use termwire::idle::NoOpIdleStrategy;
use termwire::protocol::HEADER_LENGTH;
use termwire::schema::{
    ClusterSession, ClusterTimeUnit, ConsensusModule, EncodeRecord, MessageHeader, PendingMessage,
    PendingMessageTracker, SessionMessageHeader, SnapshotMark, SnapshotMarker, Timer,
    SNAPSHOT_TYPE_ID,
};
use termwire::snapshot::{
    ConsensusModuleSnapshotListener, ConsensusModuleState, ConsensusModuleStateLoader,
    PendingMessageState, SessionState, SnapshotContext, SnapshotReader, SnapshotWriter,
};
use termwire::transport::{connect, Agent, ManualClock, NanoClock, RandomLoss};
use termwire::{
    Publication, Subscription, TermwireError, ADMIN_ACTION, BACK_PRESSURED, NOT_CONNECTED,
};

const TERM_LENGTH: usize = 64 * 1024;
const STREAM_ID: i32 = 1001;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ipc(config: &TransportConfig) -> (Publication, Subscription) {
    let publication = Publication::new(config, 7, STREAM_ID).unwrap();
    let mut subscription = Subscription::new(STREAM_ID);
    subscription.add_image(publication.image());
    (publication, subscription)
}

/// Offer until accepted, draining the subscription while back pressured.
fn offer_polling(
    publication: &Publication,
    subscription: &mut Subscription,
    payload: &[u8],
    received: &mut Vec<Vec<u8>>,
) -> i64 {
    loop {
        let position = publication.offer(payload);
        if position > 0 {
            return position;
        }
        assert!(position == BACK_PRESSURED || position == ADMIN_ACTION, "offer failed: {position}");
        subscription.poll(|p, _| received.push(p.to_vec()), 10);
    }
}

fn drain(subscription: &mut Subscription, received: &mut Vec<Vec<u8>>) {
    while subscription.poll(|p, _| received.push(p.to_vec()), 10) > 0 {}
}

/// Messages arrive once each, in order, with identical bytes.
#[test]
fn test_ordering_and_payload_integrity() {
    let (publication, mut subscription) = ipc(&TransportConfig::default());
    let mut received = Vec::new();

    let sent: Vec<Vec<u8>> = (0..1_000u32)
        .map(|i| {
            let mut payload = i.to_le_bytes().to_vec();
            payload.resize(4 + (i as usize % 300), (i % 251) as u8);
            payload
        })
        .collect();
    for payload in &sent {
        offer_polling(&publication, &mut subscription, payload, &mut received);
    }
    drain(&mut subscription, &mut received);

    assert_eq!(received, sent);
}

/// Every length from one byte to well past the MTU reassembles exactly.
#[test]
fn test_fragmentation_round_trip() {
    let config = TransportConfig::default();
    let (publication, mut subscription) = ipc(&config);
    let max_payload = config.max_payload_length();

    let mut lengths: Vec<usize> = (1..=4 * 32 + 1).collect();
    lengths.extend([
        max_payload - 1,
        max_payload,
        max_payload + 1,
        2 * max_payload,
        2 * max_payload + 17,
        config.max_message_length(),
    ]);

    for length in lengths {
        let payload: Vec<u8> = (0..length).map(|i| (i * 31 % 256) as u8).collect();
        let mut received = Vec::new();
        offer_polling(&publication, &mut subscription, &payload, &mut received);
        drain(&mut subscription, &mut received);
        assert_eq!(received, vec![payload], "length {length}");
    }

    assert!(matches!(
        publication.try_offer(&vec![0; config.max_message_length() + 1]),
        Err(termwire::OfferError::MessageTooLong { .. })
    ));
}

/// 64 frames fill a term exactly; the 65th rolls over, with a check at 63.
#[test]
fn test_sixty_five_messages_across_rollover() {
    let config = TransportConfig::default().with_term_length(TERM_LENGTH);
    let (publication, mut subscription) = ipc(&config);
    let length = TERM_LENGTH / 64 - HEADER_LENGTH;
    let mut received = Vec::new();

    for i in 0..63u8 {
        offer_polling(&publication, &mut subscription, &vec![i; length], &mut received);
    }
    drain(&mut subscription, &mut received);
    assert_eq!(received.len(), 63);

    for i in 63..65u8 {
        offer_polling(&publication, &mut subscription, &vec![i; length], &mut received);
    }
    drain(&mut subscription, &mut received);

    assert_eq!(received.len(), 65);
    for (i, payload) in received.iter().enumerate() {
        assert_eq!(payload.len(), length);
        assert_eq!(payload[0], i as u8);
    }
    assert_eq!(publication.position(), 65 * 1024);
    assert_eq!(subscription.images()[0].position(), publication.position());
}

/// A claim 32 bytes short of the term end leaves a header-only padding frame.
#[test]
fn test_rollover_with_minimal_padding_header() {
    let config = TransportConfig::default().with_term_length(TERM_LENGTH);
    let (publication, mut subscription) = ipc(&config);
    let message_length = 1024 - HEADER_LENGTH;
    let last_length = TERM_LENGTH - HEADER_LENGTH - 63 * 1024 - HEADER_LENGTH;
    let mut received = Vec::new();

    for _ in 0..56 {
        offer_polling(&publication, &mut subscription, &vec![1; message_length], &mut received);
        subscription.poll(|p, _| received.push(p.to_vec()), 10);
    }
    for _ in 0..7 {
        offer_polling(&publication, &mut subscription, &vec![1; message_length], &mut received);
    }
    let before_padding =
        offer_polling(&publication, &mut subscription, &vec![2; last_length], &mut received);
    assert_eq!(before_padding, (TERM_LENGTH - HEADER_LENGTH) as i64);

    let after_rollover =
        offer_polling(&publication, &mut subscription, &vec![3; message_length], &mut received);
    assert_eq!(after_rollover, (TERM_LENGTH + 1024) as i64);
    drain(&mut subscription, &mut received);

    let lengths: Vec<usize> = received.iter().map(Vec::len).collect();
    assert_eq!(lengths.len(), 65);
    assert!(lengths[..63].iter().all(|&l| l == message_length));
    assert_eq!(lengths[63], last_length);
    assert_eq!(lengths[64], message_length);
    assert_eq!(received[64][0], 3);
}

/// A lagging subscriber back pressures the publication until it advances.
#[test]
fn test_back_pressure_until_subscriber_advances() {
    let config = TransportConfig::default().with_term_length(TERM_LENGTH);
    let (publication, mut subscription) = ipc(&config);
    let payload = vec![0u8; TERM_LENGTH / 64 - HEADER_LENGTH];

    let mut accepted = 0;
    while publication.offer(&payload) > 0 {
        accepted += 1;
    }
    assert_eq!(accepted * 1024, config.publication_window());
    for _ in 0..3 {
        assert_eq!(publication.offer(&payload), BACK_PRESSURED);
    }

    assert_eq!(subscription.poll(|_, _| {}, 1), 1);
    assert!(publication.offer(&payload) > 0);
    assert_eq!(publication.offer(&payload), BACK_PRESSURED);
}

/// A new subscription joins at the current position; earlier data is skipped.
#[test]
fn test_resubscription_joins_at_current_position() {
    let config = TransportConfig::default().with_term_length(TERM_LENGTH);
    let (publication, mut subscription) = ipc(&config);
    let payload = vec![9u8; TERM_LENGTH / 64 - HEADER_LENGTH];
    let mut received = Vec::new();

    for _ in 0..32 {
        offer_polling(&publication, &mut subscription, &payload, &mut received);
        subscription.poll(|p, _| received.push(p.to_vec()), 10);
    }
    assert_eq!(publication.position(), subscription.images()[0].position());

    subscription.close();
    assert_eq!(subscription.poll(|_, _| panic!("closed"), 10), 0);
    assert_eq!(publication.offer(&payload), NOT_CONNECTED);

    let rejoin_position = publication.position();
    let mut subscription = Subscription::new(STREAM_ID);
    subscription.add_image(publication.image());
    assert_eq!(subscription.images()[0].join_position(), rejoin_position);

    let mut second = Vec::new();
    for _ in 0..64 {
        offer_polling(&publication, &mut subscription, &payload, &mut second);
        subscription.poll(|p, _| second.push(p.to_vec()), 10);
    }
    drain(&mut subscription, &mut second);

    assert_eq!(second.len(), 64);
    assert_eq!(publication.position(), subscription.images()[0].position());
}

/// Two writers and a reader racing through hundreds of rotations.
#[test]
fn test_concurrent_writers_and_reader_across_rollovers() {
    const PER_WRITER: u64 = 20_000;

    let config = TransportConfig::default()
        .with_term_length(4096)
        .with_mtu_length(1024);
    let publication = Publication::new(&config, 1, STREAM_ID).unwrap();
    let mut image = publication.image();

    std::thread::scope(|scope| {
        for writer in 0..2u8 {
            let publication = publication.clone();
            scope.spawn(move || {
                for seq in 0..PER_WRITER {
                    let mut payload = vec![writer];
                    payload.extend_from_slice(&seq.to_le_bytes());
                    payload.resize(9 + (seq % 200) as usize, seq as u8);
                    loop {
                        match publication.offer(&payload) {
                            position if position > 0 => break,
                            BACK_PRESSURED | ADMIN_ACTION => std::thread::yield_now(),
                            other => panic!("unexpected offer result {other}"),
                        }
                    }
                }
            });
        }

        scope.spawn(move || {
            let mut next = [0u64; 2];
            while next.iter().sum::<u64>() < 2 * PER_WRITER {
                let fragments = image.poll(
                    |payload, _| {
                        let writer = payload[0] as usize;
                        let mut seq = [0u8; 8];
                        seq.copy_from_slice(&payload[1..9]);
                        let seq = u64::from_le_bytes(seq);
                        assert_eq!(seq, next[writer], "writer {writer} out of order");
                        assert_eq!(payload.len(), 9 + (seq % 200) as usize);
                        assert!(payload[9..].iter().all(|&b| b == seq as u8));
                        next[writer] += 1;
                    },
                    64,
                );
                if fragments == 0 {
                    std::thread::yield_now();
                }
            }
        });
    });

    assert!(publication.position() > 100 * 4096);
}

fn network_config() -> TransportConfig {
    TransportConfig::default()
        .with_term_length(4096)
        .with_mtu_length(256)
        .with_nak_delay(Duration::from_micros(20))
        .with_nak_retry_interval(Duration::from_micros(100))
        .with_max_nak_retries(100)
        .with_retransmit_linger(Duration::from_micros(50))
        .with_heartbeat_interval(Duration::from_micros(50))
        .with_status_message_interval(Duration::from_micros(100))
}

/// Random loss over the simulated network is repaired without reordering.
#[test]
fn test_network_random_loss_recovery() {
    init_tracing();
    let config = network_config();
    let publication = Publication::new(&config, 3, STREAM_ID).unwrap();
    let (mut sender, mut receiver, image) =
        connect(&publication, &config, Box::new(RandomLoss::new(0.1, 42))).unwrap();
    let mut subscription = Subscription::new(STREAM_ID);
    subscription.add_image(image);
    let clock = ManualClock::new();

    let sent: Vec<Vec<u8>> = (0..2_000u32)
        .map(|i| {
            let mut payload = i.to_le_bytes().to_vec();
            payload.resize(4 + (i as usize * 7 % 500), 0xAB);
            payload
        })
        .collect();

    let mut received = Vec::new();
    let mut next = 0;
    for _ in 0..1_000_000 {
        if next < sent.len() && publication.offer(&sent[next]) > 0 {
            next += 1;
        }
        clock.advance(Duration::from_micros(5));
        sender.do_work(clock.nano_time()).unwrap();
        receiver.do_work(clock.nano_time()).unwrap();
        subscription.poll(|p, _| received.push(p.to_vec()), 10);
        if received.len() == sent.len() {
            break;
        }
    }

    assert_eq!(received, sent);
    let counters = receiver.counters();
    assert!(counters.frames_dropped > 0);
    assert!(counters.naks_sent > 0);
    assert_eq!(counters.gaps_skipped, 0);
    assert!(sender.counters().retransmits > 0);
}

fn sample_state() -> ConsensusModuleState {
    ConsensusModuleState {
        log_position: 1 << 20,
        leadership_term_id: 4,
        time_unit: ClusterTimeUnit::Nanos,
        app_version: 0x0001_0200,
        consensus_module: ConsensusModule {
            next_session_id: 100,
            next_service_session_id: i64::MIN + 5,
            log_service_session_id: i64::MIN + 2,
            pending_message_capacity: 4096,
        },
        sessions: (0..5)
            .map(|i| SessionState {
                cluster_session_id: 90 + i,
                correlation_id: 1_000 + i,
                opened_log_position: i * 4096,
                time_of_last_activity: 1_700_000_000_000 + i,
                close_reason: termwire::schema::CloseReason::NullValue,
                response_stream_id: 102,
                response_channel: format!("aeron:udp?endpoint=client-{i}:9020"),
            })
            .collect(),
        timers: (0..10)
            .map(|i| Timer {
                correlation_id: i,
                deadline: 5_000 + i,
            })
            .collect(),
        pending_message_trackers: vec![PendingMessageTracker {
            next_service_session_id: i64::MIN + 5,
            log_service_session_id: i64::MIN + 2,
            pending_message_capacity: 4096,
            service_id: 0,
        }],
        pending_messages: (0..3)
            .map(|i| PendingMessageState {
                header: SessionMessageHeader {
                    leadership_term_id: 4,
                    cluster_session_id: i64::MIN + 3 + i,
                    timestamp: 77 + i,
                },
                payload: Bytes::from(vec![i as u8; 40 + i as usize * 500]),
            })
            .collect(),
    }
}

/// A snapshot written to a publication replays to an equal state.
#[test]
fn test_snapshot_round_trip_over_ipc() {
    let publication = Publication::new(&TransportConfig::default(), 1, 108).unwrap();
    let mut reader = SnapshotReader::new(publication.image(), ConsensusModuleStateLoader::new());
    let state = sample_state();

    let mut writer = SnapshotWriter::new(publication.clone(), &SnapshotConfig::default())
        .with_idle_strategy(NoOpIdleStrategy);
    let end = writer.take_snapshot(&state).unwrap();
    assert_eq!(end, publication.position());
    assert_eq!(writer.records_written(), 2 + 1 + 5 + 10 + 1 + 3);

    reader.load(&mut NoOpIdleStrategy).unwrap();
    let (image, loader) = reader.into_parts();
    assert_eq!(image.position(), end);
    assert_eq!(loader.records_loaded(), writer.records_written());
    assert_eq!(loader.into_state(), state);
}

/// The same snapshot survives a lossy network hop.
#[test]
fn test_snapshot_round_trip_over_lossy_network() {
    let config = network_config().with_term_length(64 * 1024).with_mtu_length(1408);
    let publication = Publication::new(&config, 2, 108).unwrap();
    let (mut sender, mut receiver, image) =
        connect(&publication, &config, Box::new(RandomLoss::new(0.2, 7))).unwrap();
    let mut reader = SnapshotReader::new(image, ConsensusModuleStateLoader::new());
    let state = sample_state();

    SnapshotWriter::new(publication.clone(), &SnapshotConfig::default())
        .take_snapshot(&state)
        .unwrap();

    let clock = ManualClock::new();
    for _ in 0..200_000 {
        clock.advance(Duration::from_micros(5));
        sender.do_work(clock.nano_time()).unwrap();
        receiver.do_work(clock.nano_time()).unwrap();
        reader.poll().unwrap();
        if reader.is_done() {
            break;
        }
    }

    assert!(reader.is_done());
    let (_, loader) = reader.into_parts();
    assert_eq!(loader.into_state(), state);
}

#[derive(Debug, Default)]
struct EventLog {
    events: Vec<String>,
    sequences: Vec<u64>,
}

impl EventLog {
    fn push(&mut self, event: String, ctx: SnapshotContext) {
        self.events.push(event);
        self.sequences.push(ctx.sequence);
    }
}

impl ConsensusModuleSnapshotListener for EventLog {
    fn on_load_begin_snapshot(&mut self, marker: &SnapshotMarker, ctx: SnapshotContext, _raw: &[u8]) {
        self.push(format!("{marker:?}"), ctx);
    }

    fn on_load_end_snapshot(&mut self, marker: &SnapshotMarker, ctx: SnapshotContext, _raw: &[u8]) {
        self.push(format!("{marker:?}"), ctx);
    }

    fn on_load_cluster_session(&mut self, session: &ClusterSession<'_>, ctx: SnapshotContext, _raw: &[u8]) {
        self.push(format!("{session:?}"), ctx);
    }

    fn on_load_timer(&mut self, timer: &Timer, ctx: SnapshotContext, _raw: &[u8]) {
        self.push(format!("{timer:?}"), ctx);
    }

    fn on_load_consensus_module_state(&mut self, state: &ConsensusModule, ctx: SnapshotContext, _raw: &[u8]) {
        self.push(format!("{state:?}"), ctx);
    }

    fn on_load_pending_message_tracker(
        &mut self,
        tracker: &PendingMessageTracker,
        ctx: SnapshotContext,
        _raw: &[u8],
    ) {
        self.push(format!("{tracker:?}"), ctx);
    }

    fn on_load_pending_message(&mut self, message: &PendingMessage<'_>, ctx: SnapshotContext, _raw: &[u8]) {
        self.push(format!("{message:?}"), ctx);
    }
}

fn marker(mark: SnapshotMark) -> SnapshotMarker {
    SnapshotMarker {
        type_id: SNAPSHOT_TYPE_ID,
        log_position: 0,
        leadership_term_id: 0,
        index: 0,
        mark,
        time_unit: ClusterTimeUnit::Millis,
        app_version: 1,
    }
}

fn unknown_record(template_id: u16) -> Bytes {
    let mut buf = bytes::BytesMut::new();
    MessageHeader::new(template_id, 12).encode_into(&mut buf);
    buf.extend_from_slice(&[0xEE; 12]);
    buf.freeze()
}

fn replay(records: &[Bytes]) -> termwire::Result<EventLog> {
    let publication = Publication::new(&TransportConfig::default(), 1, 1).unwrap();
    let mut reader = SnapshotReader::new(publication.image(), EventLog::default());
    for record in records {
        assert!(publication.offer(record) > 0);
    }
    reader.load(&mut NoOpIdleStrategy)?;
    Ok(reader.into_parts().1)
}

/// Unknown templates between known records change nothing.
#[test]
fn test_unknown_templates_are_idempotent() {
    let known = vec![
        marker(SnapshotMark::Begin).encode(),
        Timer {
            correlation_id: 1,
            deadline: 2,
        }
        .encode(),
        ConsensusModule {
            next_session_id: 3,
            ..ConsensusModule::default()
        }
        .encode(),
        marker(SnapshotMark::End).encode(),
    ];
    let mut with_unknown = Vec::new();
    for (i, record) in known.iter().enumerate() {
        with_unknown.push(unknown_record(500 + i as u16));
        with_unknown.push(record.clone());
    }

    let plain = replay(&known).unwrap();
    let noisy = replay(&with_unknown).unwrap();
    assert_eq!(plain.events, noisy.events);
    assert_eq!(plain.sequences, vec![0, 1, 2, 3]);
    assert_eq!(noisy.sequences, plain.sequences);
}

#[test]
fn test_snapshot_protocol_violations() {
    let end_first = replay(&[marker(SnapshotMark::End).encode()]).unwrap_err();
    assert_eq!(end_first.to_string(), "Protocol violation: missing begin snapshot");

    let double_begin = replay(&[
        marker(SnapshotMark::Begin).encode(),
        marker(SnapshotMark::Begin).encode(),
    ])
    .unwrap_err();
    assert_eq!(double_begin.to_string(), "Protocol violation: already in snapshot");

    let mut foreign = bytes::BytesMut::new();
    MessageHeader {
        schema_id: 7,
        ..MessageHeader::new(104, 16)
    }
    .encode_into(&mut foreign);
    foreign.extend_from_slice(&[0; 16]);
    assert!(matches!(
        replay(&[marker(SnapshotMark::Begin).encode(), foreign.freeze()]),
        Err(TermwireError::SchemaMismatch {
            expected: 111,
            actual: 7
        })
    ));
}

#[test]
fn test_config_from_json() {
    let config = TransportConfig::from_json(
        r#"{ "term_length": 131072, "mtu_length": 4096, "nak_delay": 250000 }"#,
    )
    .unwrap();
    assert_eq!(config.term_length, 131072);
    assert_eq!(config.nak_delay, Duration::from_micros(250));
    assert_eq!(config.publication_window(), 65536);

    assert!(matches!(
        TransportConfig::from_json(r#"{ "term_length": 5000 }"#),
        Err(TermwireError::Config(_))
    ));
    assert!(matches!(
        SnapshotConfig::from_json("{ not json"),
        Err(TermwireError::Json(_))
    ));
}
