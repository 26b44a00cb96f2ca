use std::time::Duration;

use mqttbytes::QoS;
use rumqttc_core::{BoxedNetwork, Connection, MqttOptions};

async fn connect() -> std::io::Result<BoxedNetwork> {
    let stream = tokio::net::TcpStream::connect(("localhost", 1883)).await?;
    Ok(Box::new(stream) as BoxedNetwork)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mqttoptions = MqttOptions::new("test-async-1", "localhost", 1883).set_keep_alive(10);
    let connection = Connection::new(mqttoptions, connect).unwrap();
    connection.connect().unwrap();

    connection
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

    for i in 0..10u8 {
        connection
            .publish("hello/world", QoS::AtLeastOnce, false, vec![1, 2, 3, i], |result| {
                if let Err(e) = result {
                    eprintln!("publish failed: {e}");
                }
            })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    connection.disconnect().unwrap();
}
