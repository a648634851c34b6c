//! MQTT publisher
//!
//! The rumqttc event loop runs on its own thread and stops at the first
//! connection error. That error is handed back through `publish`, so a broken
//! broker link ends the poll loop instead of being retried in the background.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use pylonmon_core::monitor::{PublishError, Publisher};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use tracing::{debug, error, info};

use crate::cli::{split_server, MqttArgs};

/// Outgoing requests buffered before `publish` reports the queue as full
const REQUEST_CAPACITY: usize = 10;

/// How long `connect` waits for the broker's ConnAck
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type LinkError = Arc<Mutex<Option<String>>>;

/// Retained, at-least-once publisher
pub struct MqttPublisher {
    client: Client,
    server: String,
    link_error: LinkError,
}

impl MqttPublisher {
    /// Connect to the broker, failing if it does not acknowledge within [`CONNECT_TIMEOUT`]
    pub fn connect(args: &MqttArgs) -> Result<Self> {
        let (host, port) = split_server(&args.mqtt_server)?;

        let mut options = MqttOptions::new(&args.mqtt_client_id, &host, port);
        options.set_keep_alive(Duration::from_secs(30));
        if !args.mqtt_user.is_empty() && !args.mqtt_pass.is_empty() {
            options.set_credentials(&args.mqtt_user, &args.mqtt_pass);
        }

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let server = format!("{}:{}", host, port);
        let link_error = LinkError::default();
        let (ready_tx, ready_rx) = mpsc::channel();

        let label = server.clone();
        let shared = Arc::clone(&link_error);
        thread::Builder::new()
            .name("mqtt-eventloop".to_string())
            .spawn(move || drive(connection, &label, ready_tx, &shared))?;

        match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                client,
                server,
                link_error,
            }),
            Ok(Err(message)) => bail!("Error connecting to MQTT server {}: {}", server, message),
            Err(_) => Err(anyhow!(
                "Timed out connecting to MQTT server {} after {:?}",
                server,
                CONNECT_TIMEOUT
            )),
        }
    }

    fn destination(&self) -> String {
        format!("mqtt server {}", self.server)
    }
}

/// Run the event loop until the first connection error.
///
/// The first ConnAck or error is reported on `ready`; a later error is left
/// in `link_error` for the next publish.
fn drive(
    mut connection: Connection,
    server: &str,
    ready: mpsc::Sender<Result<(), String>>,
    link_error: &LinkError,
) {
    let mut connected = false;
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) if !connected => {
                info!("Connected to MQTT server {}", server);
                connected = true;
                let _ = ready.send(Ok(()));
            }
            Ok(event) => debug!("mqtt event: {:?}", event),
            Err(e) => {
                error!("MQTT connection to {} failed: {}", server, e);
                let message = e.to_string();
                if connected {
                    *link_error.lock().unwrap_or_else(|p| p.into_inner()) = Some(message);
                } else {
                    let _ = ready.send(Err(message));
                }
                return;
            }
        }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let link_error = self
            .link_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(message) = link_error {
            return Err(PublishError::new(self.destination(), message));
        }

        self.client
            .try_publish(topic, QoS::AtLeastOnce, true, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::new(self.destination(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    fn args(server: String) -> MqttArgs {
        MqttArgs {
            mqtt_server: server,
            mqtt_user: "bms".into(),
            mqtt_pass: "secret".into(),
            mqtt_client_id: "pylonmon-test".into(),
            mqtt_topic: "battery/power".into(),
        }
    }

    /// Broker that answers the first CONNECT with `connack`, then hangs up
    fn one_shot_broker(connack: [u8; 4]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf);
            socket.write_all(&connack).unwrap();
            thread::sleep(Duration::from_millis(100));
        });
        addr.to_string()
    }

    #[test]
    fn test_unreachable_broker_fails_connect() {
        let err = MqttPublisher::connect(&args("127.0.0.1:1".into()))
            .err()
            .expect("connect to a closed port should fail");
        assert!(err.to_string().contains("127.0.0.1:1"), "{}", err);
    }

    #[test]
    fn test_refused_connack_fails_connect() {
        let server = one_shot_broker([0x20, 0x02, 0x00, 0x05]);
        let err = MqttPublisher::connect(&args(server))
            .err()
            .expect("a refused ConnAck should fail");
        assert!(err.to_string().contains("NotAuthorized"), "{}", err);
    }

    #[test]
    fn test_lost_broker_surfaces_on_publish() {
        let server = one_shot_broker([0x20, 0x02, 0x00, 0x00]);
        let mut publisher = MqttPublisher::connect(&args(server.clone())).unwrap();

        // Publishes never block; once the link drops they report an error.
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = loop {
            match publisher.publish("battery/power", "[]") {
                Err(e) => break e,
                Ok(()) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                Ok(()) => panic!("publish kept succeeding after the broker hung up"),
            }
        };
        assert_eq!(err.destination, format!("mqtt server {}", server));
    }
}
