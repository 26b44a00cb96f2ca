//! Loads connection options from a TOML file instead of building them in
//! code. Run with `cargo run --example configured -- path/to/config.toml`.

use mqttbytes::QoS;
use rumqttc_core::{BoxedNetwork, Connection};

async fn connect() -> std::io::Result<BoxedNetwork> {
    let stream = tokio::net::TcpStream::connect(("localhost", 1883)).await?;
    Ok(Box::new(stream) as BoxedNetwork)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "rumqttc.toml".to_string());
    let mqttoptions = rumqttc_core::load_from_file(&config_path).unwrap_or_else(|e| panic!("failed to load {config_path}: {e}"));

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

    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    connection.disconnect().unwrap();
}
