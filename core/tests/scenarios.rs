//! End-to-end scenarios driving `Connection` against an in-memory broker
//! built on `tokio::io::duplex`, no real socket involved.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use mqttbytes::{
    ConnAck, ConnectReturnCode, Packet, PubAck, Publish as WirePublish, QoS, SubAck,
    SubscribeReturnCodes,
};
use rumqttc_core::{BoxedNetwork, Connection, ConnectionState, ErrorCode, MqttOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

async fn read_packet(stream: &mut DuplexStream) -> Packet {
    let mut buf = BytesMut::new();
    loop {
        match mqttbytes::mqtt_read(&mut buf, 256 * 1024) {
            Ok(packet) => return packet,
            Err(mqttbytes::Error::InsufficientBytes(_)) => {
                let n = stream.read_buf(&mut buf).await.unwrap();
                assert!(n > 0, "peer closed before a full frame arrived");
            }
            Err(e) => panic!("malformed frame from client: {e:?}"),
        }
    }
}

async fn write_packet(stream: &mut DuplexStream, packet: &Packet) {
    let mut buf = BytesMut::new();
    mqttbytes::mqtt_write(packet, &mut buf).unwrap();
    stream.write_all(&buf).await.unwrap();
}

async fn accept_connect(broker: &mut DuplexStream, session_present: bool) {
    match read_packet(broker).await {
        Packet::Connect(_) => {}
        other => panic!("expected CONNECT, got {other:?}"),
    }
    write_packet(broker, &Packet::ConnAck(ConnAck::new(ConnectReturnCode::Accepted, session_present))).await;
}

/// Hands out queued duplex ends in order, one per (re)connect attempt.
/// Panics if more attempts happen than the test staged for.
fn queued_connector(mut ends: Vec<DuplexStream>) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<BoxedNetwork>> + Send>> {
    ends.reverse();
    let ends = Arc::new(Mutex::new(ends));
    move || {
        let ends = ends.clone();
        Box::pin(async move {
            let io = ends.lock().unwrap().pop().expect("connector invoked more times than the test staged for");
            Ok(Box::new(io) as BoxedNetwork)
        })
    }
}

async fn yield_until(mut poll: impl FnMut() -> bool) {
    for _ in 0..200 {
        if poll() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn connect_subscribe_and_dispatch_inbound_publish() {
    let (client_io, mut broker_io) = tokio::io::duplex(4096);
    let connector = queued_connector(vec![client_io]);

    let options = MqttOptions::new("scenario-1", "localhost", 1883).set_keep_alive(60);
    let connection = Connection::new(options, connector).unwrap();
    connection.connect().unwrap();

    accept_connect(&mut broker_io, false).await;

    let (suback_tx, suback_rx) = oneshot::channel();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_for_cb = received.clone();

    connection
        .subscribe(
            "a/b",
            QoS::AtLeastOnce,
            Box::new(move |topic, payload, _dup, _qos, _retain| {
                received_for_cb.lock().unwrap().push((topic.to_owned(), payload.to_vec()));
            }),
            None,
            move |result| {
                let _ = suback_tx.send(result);
            },
        )
        .unwrap();

    match read_packet(&mut broker_io).await {
        Packet::Subscribe(sub) => {
            let suback = SubAck::new(sub.pkid, vec![SubscribeReturnCodes::Success(QoS::AtLeastOnce)]);
            write_packet(&mut broker_io, &Packet::SubAck(suback)).await;
        }
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    }

    assert_eq!(suback_rx.await.unwrap().unwrap(), vec![SubscribeReturnCodes::Success(QoS::AtLeastOnce)]);

    write_packet(&mut broker_io, &Packet::Publish(WirePublish::new("a/b", QoS::AtMostOnce, &b"hi"[..]))).await;

    yield_until(|| !received.lock().unwrap().is_empty()).await;

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "a/b");
    assert_eq!(received[0].1, b"hi".to_vec());
}

#[tokio::test]
async fn qos1_publish_survives_a_transport_drop_and_completes_exactly_once() {
    let (client_io_1, mut broker_io_1) = tokio::io::duplex(4096);
    let (client_io_2, mut broker_io_2) = tokio::io::duplex(4096);
    let connector = queued_connector(vec![client_io_1, client_io_2]);

    let options = MqttOptions::new("scenario-2", "localhost", 1883)
        .set_clean_session(false)
        .set_reconnect_options(0, 1)
        .set_keep_alive(60);
    let connection = Connection::new(options, connector).unwrap();
    connection.connect().unwrap();

    accept_connect(&mut broker_io_1, false).await;
    yield_until(|| connection.state() == ConnectionState::Connected).await;

    let (complete_tx, complete_rx) = oneshot::channel();
    connection
        .publish("x", QoS::AtLeastOnce, false, &b"p"[..], move |result| {
            let _ = complete_tx.send(result);
        })
        .unwrap();

    let first_attempt = match read_packet(&mut broker_io_1).await {
        Packet::Publish(publish) => publish,
        other => panic!("expected PUBLISH, got {other:?}"),
    };
    assert!(!first_attempt.dup);
    assert_eq!(first_attempt.qos, QoS::AtLeastOnce);

    // drop the transport before acking: the broker side just goes away.
    drop(broker_io_1);

    accept_connect(&mut broker_io_2, true).await;

    let retried = match read_packet(&mut broker_io_2).await {
        Packet::Publish(publish) => publish,
        other => panic!("expected retried PUBLISH, got {other:?}"),
    };
    assert!(retried.dup);
    assert_eq!(retried.pkid, first_attempt.pkid);
    assert_eq!(retried.topic, "x");

    write_packet(&mut broker_io_2, &Packet::PubAck(PubAck::new(retried.pkid))).await;

    assert_eq!(complete_rx.await.unwrap(), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn ping_timeout_moves_connected_to_reconnecting() {
    let (client_io, mut broker_io) = tokio::io::duplex(4096);
    let connector = queued_connector(vec![client_io]);

    let options = MqttOptions::new("scenario-3", "localhost", 1883)
        .set_keep_alive(2)
        .set_ping_timeout(Duration::from_secs(1));
    let connection = Connection::new(options, connector).unwrap();
    connection.connect().unwrap();

    accept_connect(&mut broker_io, false).await;
    yield_until(|| connection.state() == ConnectionState::Connected).await;

    // at the 2s mark a PINGREQ is due; the broker never answers it.
    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    match read_packet(&mut broker_io).await {
        Packet::PingReq => {}
        other => panic!("expected PINGREQ, got {other:?}"),
    }

    // ping_timeout elapses 1s after that with nothing received.
    tokio::time::advance(Duration::from_secs(1)).await;
    tokio::task::yield_now().await;
    yield_until(|| connection.state() == ConnectionState::Reconnecting).await;
}

#[tokio::test]
async fn unsubscribe_stops_dispatch_and_fires_cleanup_once() {
    let (client_io, mut broker_io) = tokio::io::duplex(4096);
    let connector = queued_connector(vec![client_io]);

    let options = MqttOptions::new("scenario-4", "localhost", 1883).set_keep_alive(60);
    let connection = Connection::new(options, connector).unwrap();
    connection.connect().unwrap();
    accept_connect(&mut broker_io, false).await;

    let cleanup_calls = Arc::new(Mutex::new(0u32));
    let cleanup_calls_cb = cleanup_calls.clone();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_cb = received.clone();

    let (suback_tx, suback_rx) = oneshot::channel();
    connection
        .subscribe(
            "a/+",
            QoS::AtMostOnce,
            Box::new(move |topic, _payload, _dup, _qos, _retain| {
                received_cb.lock().unwrap().push(topic.to_owned());
            }),
            Some(Box::new(move || {
                *cleanup_calls_cb.lock().unwrap() += 1;
            })),
            move |result| {
                let _ = suback_tx.send(result);
            },
        )
        .unwrap();

    match read_packet(&mut broker_io).await {
        Packet::Subscribe(sub) => {
            write_packet(&mut broker_io, &Packet::SubAck(SubAck::new(sub.pkid, vec![SubscribeReturnCodes::Success(QoS::AtMostOnce)]))).await;
        }
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    }
    suback_rx.await.unwrap().unwrap();

    let (unsuback_tx, unsuback_rx) = oneshot::channel();
    connection
        .unsubscribe("a/+", move |result| {
            let _ = unsuback_tx.send(result);
        })
        .unwrap();

    match read_packet(&mut broker_io).await {
        Packet::Unsubscribe(unsub) => {
            write_packet(&mut broker_io, &Packet::UnsubAck(mqttbytes::UnsubAck::new(unsub.pkid))).await;
        }
        other => panic!("expected UNSUBSCRIBE, got {other:?}"),
    }
    unsuback_rx.await.unwrap().unwrap();

    assert_eq!(*cleanup_calls.lock().unwrap(), 1);

    write_packet(&mut broker_io, &Packet::Publish(WirePublish::new("a/b", QoS::AtMostOnce, &b"hi"[..]))).await;
    // give the event loop a chance to misbehave before asserting silence
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn resubscribe_existing_with_no_subscriptions_completes_without_sending_anything() {
    let (client_io, mut broker_io) = tokio::io::duplex(4096);
    let connector = queued_connector(vec![client_io]);

    let options = MqttOptions::new("scenario-5", "localhost", 1883).set_keep_alive(60);
    let connection = Connection::new(options, connector).unwrap();
    connection.connect().unwrap();
    accept_connect(&mut broker_io, false).await;
    yield_until(|| connection.state() == ConnectionState::Connected).await;

    let (tx, rx) = oneshot::channel();
    connection
        .resubscribe_existing_topics(move |result| {
            let _ = tx.send(result);
        })
        .unwrap();

    assert_eq!(rx.await.unwrap().unwrap(), Vec::<SubscribeReturnCodes>::new());

    // nothing should have reached the broker: a PINGREQ 60s out won't
    // arrive in this test's lifetime, so any byte at all is a failure.
    let mut probe = [0u8; 1];
    let result = tokio::time::timeout(Duration::from_millis(50), broker_io.read(&mut probe)).await;
    assert!(result.is_err(), "broker unexpectedly received bytes after an empty resubscribe");
}

#[tokio::test]
async fn releasing_the_last_handle_disconnects_and_destroys_pending_requests() {
    let (client_io, mut broker_io) = tokio::io::duplex(4096);
    let connector = queued_connector(vec![client_io]);

    let options = MqttOptions::new("scenario-6", "localhost", 1883)
        .set_clean_session(false)
        .set_keep_alive(60);
    let connection = Connection::new(options, connector).unwrap();
    connection.connect().unwrap();
    accept_connect(&mut broker_io, false).await;
    yield_until(|| connection.state() == ConnectionState::Connected).await;

    let (complete_tx, complete_rx) = oneshot::channel();
    connection
        .publish("x", QoS::AtLeastOnce, false, &b"p"[..], move |result| {
            let _ = complete_tx.send(result);
        })
        .unwrap();

    // the publish is now ongoing, unacked. Drop every handle: the only
    // live reference is `connection` itself.
    drop(connection);

    match read_packet(&mut broker_io).await {
        Packet::Disconnect => {}
        other => panic!("expected DISCONNECT, got {other:?}"),
    }

    assert_eq!(complete_rx.await.unwrap(), Err(ErrorCode::ConnectionDestroyed));
}
