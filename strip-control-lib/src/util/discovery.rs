use std::cmp::max;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::time::Duration;

use derivative::Derivative;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::control_interface::DEFAULT_PORT;
use crate::error::Result;

const DISCOVERY_MESSAGE: &[u8] = b"HF-A11ASSISTHREAD";
const BROADCAST_ADDRESS: &str = "255.255.255.255:48899";

/// Broadcast rounds used by [`Discovery::find_devices`]; single broadcasts are often missed.
pub const DEFAULT_ROUNDS: usize = 3;

/// A controller that answered the discovery broadcast.
///
/// Two descriptors are the same device when host and hardware id match.
#[derive(Derivative)]
#[derivative(Hash, PartialEq, Eq)]
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    pub ip_address: Ipv4Addr,
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub port: u16,
    /// For example `F0FE6B2333C6`.
    pub hardware_id: String,
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub model: String,
}

impl DeviceDescriptor {
    pub fn new(ip_address: Ipv4Addr, hardware_id: String, model: String) -> Self {
        DeviceDescriptor {
            ip_address,
            port: DEFAULT_PORT,
            hardware_id,
            model,
        }
    }
}

impl Display for DeviceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Host: {}, Port: {}, Hardware ID: {}, Model: {}",
            self.ip_address, self.port, self.hardware_id, self.model
        )
    }
}

pub struct Discovery;

impl Discovery {
    /// Parses a reply of the form `ip,hardware_id,model`.
    ///
    /// Replies with another field count are malformed. Well-formed replies whose host is
    /// not an IPv4 address are skipped and logged separately.
    pub fn decode_discovery_response(data: &[u8]) -> Option<DeviceDescriptor> {
        let Ok(message) = std::str::from_utf8(data) else {
            warn!("Discovery reply is not valid UTF-8: {}", hex::encode(data));
            return None;
        };
        let message = message.trim_end_matches(['\0', '\r', '\n']);
        let fields: Vec<&str> = message.split(',').collect();
        let [ip, hardware_id, model] = fields[..] else {
            warn!(
                "Malformed discovery reply, expected 3 fields, got {}: {:?}",
                fields.len(),
                message
            );
            return None;
        };
        let Ok(ip_address) = ip.trim().parse::<Ipv4Addr>() else {
            info!(
                "Skipping device {} ({}) with non-IPv4 host {:?}",
                hardware_id.trim(),
                model.trim(),
                ip
            );
            return None;
        };
        Some(DeviceDescriptor::new(
            ip_address,
            hardware_id.trim().to_string(),
            model.trim().to_string(),
        ))
    }

    /// Finds controllers with [`DEFAULT_ROUNDS`] broadcast rounds.
    ///
    /// Each round ends once `round_timeout` passes without a reply. Returns an empty set
    /// if nobody answers.
    pub async fn find_devices(round_timeout: Duration) -> Result<HashSet<DeviceDescriptor>> {
        Self::find_devices_with_rounds(round_timeout, DEFAULT_ROUNDS).await
    }

    pub async fn find_devices_with_rounds(
        round_timeout: Duration,
        rounds: usize,
    ) -> Result<HashSet<DeviceDescriptor>> {
        // Only SO_BROADCAST is set. Discovery binds an ephemeral port nobody else shares,
        // so SO_REUSEADDR would change nothing, and tokio has no setter for it on UDP.
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        let mut discovered_devices = HashSet::<DeviceDescriptor>::new();
        for round in 1..=rounds.max(1) {
            debug!("Discovery round {}/{}", round, rounds);
            socket.send_to(DISCOVERY_MESSAGE, BROADCAST_ADDRESS).await?;
            Self::collect_replies(&socket, round_timeout, &mut discovered_devices).await?;
        }
        Ok(discovered_devices)
    }

    /// Receives replies until the socket stays silent for `idle_timeout`.
    pub async fn collect_replies(
        socket: &UdpSocket,
        idle_timeout: Duration,
        discovered_devices: &mut HashSet<DeviceDescriptor>,
    ) -> Result<()> {
        let mut buffer = [0; 4096];
        loop {
            match timeout(idle_timeout, socket.recv_from(&mut buffer)).await {
                Ok(Ok((number_of_bytes, src_addr))) => {
                    let received_data = &buffer[..number_of_bytes];
                    if received_data == DISCOVERY_MESSAGE {
                        // Our own broadcast looped back.
                        continue;
                    }
                    match Self::decode_discovery_response(received_data) {
                        Some(device) => {
                            if discovered_devices.contains(&device) {
                                debug!("Found device {} again, skipping", device);
                            } else {
                                info!("Found device: {}", device);
                                discovered_devices.insert(device);
                            }
                        }
                        None => debug!("Ignoring discovery reply from {}", src_addr),
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    debug!("No discovery reply within {:?}", idle_timeout);
                    return Ok(());
                }
            }
        }
    }

    pub fn pretty_print_devices(devices: &HashSet<DeviceDescriptor>) {
        let ip_width = devices
            .iter()
            .map(|d| d.ip_address.to_string().len())
            .fold("IP Address".len(), max);
        let port_width = devices
            .iter()
            .map(|d| d.port.to_string().len())
            .fold("Port".len(), max);
        let hardware_id_width = devices
            .iter()
            .map(|d| d.hardware_id.len())
            .fold("Hardware ID".len(), max);
        let model_width = devices
            .iter()
            .map(|d| d.model.len())
            .fold("Model".len(), max);

        println!(
            "{:<ip_width$}  {:<port_width$}  {:<hardware_id_width$}  {:<model_width$}",
            "IP Address", "Port", "Hardware ID", "Model",
        );
        println!(
            "{}  {}  {}  {}",
            "-".repeat(ip_width),
            "-".repeat(port_width),
            "-".repeat(hardware_id_width),
            "-".repeat(model_width),
        );

        let mut sorted: Vec<&DeviceDescriptor> = devices.iter().collect();
        sorted.sort_by_key(|d| d.ip_address);
        for device in sorted {
            println!(
                "{:<ip_width$}  {:<port_width$}  {:<hardware_id_width$}  {:<model_width$}",
                device.ip_address.to_string(),
                device.port,
                device.hardware_id,
                device.model,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_discovery_response() {
        let device = Discovery::decode_discovery_response(b"10.0.0.5,F0FE6B2333C6,AK001").unwrap();
        assert_eq!(device.ip_address, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(device.hardware_id, "F0FE6B2333C6");
        assert_eq!(device.model, "AK001");
        assert_eq!(device.port, DEFAULT_PORT);
    }

    #[test]
    fn test_malformed_replies_are_dropped() {
        assert!(Discovery::decode_discovery_response(b"garbage").is_none());
        assert!(Discovery::decode_discovery_response(b"10.0.0.5,F0FE6B2333C6").is_none());
        assert!(Discovery::decode_discovery_response(b"10.0.0.5,a,b,c").is_none());
        assert!(Discovery::decode_discovery_response(&[0xFF, 0xFE, b',', b',']).is_none());
    }

    #[test]
    fn test_non_ipv4_host_is_skipped() {
        assert!(Discovery::decode_discovery_response(b"not-an-ip,F0FE6B2333C6,AK001").is_none());
        assert!(Discovery::decode_discovery_response(b"fe80::1,F0FE6B2333C6,AK001").is_none());
        let device =
            Discovery::decode_discovery_response(b" 10.0.0.9 ,F0FE6B2333C6,AK001\0").unwrap();
        assert_eq!(device.ip_address, Ipv4Addr::new(10, 0, 0, 9));
    }

    #[test]
    fn test_descriptors_deduplicate_by_host_and_hardware_id() {
        let mut devices = HashSet::new();
        let a = DeviceDescriptor::new(Ipv4Addr::new(10, 0, 0, 5), "F0FE".into(), "AK001".into());
        let mut same = a.clone();
        same.model = "AK001-ZJ200".into();
        let other = DeviceDescriptor::new(Ipv4Addr::new(10, 0, 0, 6), "F0FE".into(), "AK001".into());
        devices.insert(a);
        devices.insert(same);
        devices.insert(other);
        assert_eq!(devices.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_replies_until_idle() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap();
        let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for reply in [
            &b"10.0.0.5,F0FE6B2333C6,AK001"[..],
            b"garbage",
            b"10.0.0.5,F0FE6B2333C6,AK001",
            b"10.0.0.7,ACCF23A1B2C3,HF-LPB100-ZJ200\r\n",
        ] {
            device.send_to(reply, address).await.unwrap();
        }

        let mut devices = HashSet::new();
        let started = std::time::Instant::now();
        Discovery::collect_replies(&socket, Duration::from_millis(100), &mut devices)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(devices.len(), 2);
        assert!(devices
            .iter()
            .any(|d| d.ip_address == Ipv4Addr::new(10, 0, 0, 7) && d.model == "HF-LPB100-ZJ200"));
    }

    #[tokio::test]
    async fn test_collect_replies_without_devices() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut devices = HashSet::new();
        Discovery::collect_replies(&socket, Duration::from_millis(50), &mut devices)
            .await
            .unwrap();
        assert!(devices.is_empty());
    }
}
