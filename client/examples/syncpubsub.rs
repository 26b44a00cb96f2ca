use std::thread;
use std::time::Duration;

use mqttbytes::QoS;
use rumqttc_client::start_in_thread;
use rumqttc_core::{BoxedNetwork, MqttOptions};

async fn connect() -> std::io::Result<BoxedNetwork> {
    let stream = tokio::net::TcpStream::connect(("localhost", 1883)).await?;
    Ok(Box::new(stream) as BoxedNetwork)
}

fn main() {
    tracing_subscriber::fmt::init();

    let mqttoptions = MqttOptions::new("test-1", "localhost", 1883).set_keep_alive(5);

    let (client, handle) = start_in_thread(mqttoptions, connect).unwrap();
    client.connect().unwrap();

    client
        .subscribe(
            "hello/world",
            QoS::AtLeastOnce,
            Box::new(|topic, payload, _dup, _qos, _retain| {
                println!("received on {topic}: {payload:?}");
            }),
            None,
            |result| println!("subscribed: {result:?}"),
        )
        .unwrap();

    let publish_client = client.clone();
    thread::spawn(move || {
        for i in 0..100u8 {
            publish_client
                .publish("hello/world", QoS::AtLeastOnce, false, vec![1, 2, 3, i], |result| {
                    if let Err(e) = result {
                        eprintln!("publish failed: {e}");
                    }
                })
                .unwrap();
            thread::sleep(Duration::from_secs(1));
        }
    });

    thread::sleep(Duration::from_secs(10));
    client.disconnect().unwrap();
    handle.join().unwrap();
}
