#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use devlink_peer::{ChunkedTransfer, CHUNK_SIZE};
use devlink_transport::{TcpTransport, Transport};

struct Simulator {
    child: Child,
    address: (String, u16),
}

impl Simulator {
    fn spawn(extra: &[&str]) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_devlink"))
            .args(["--log-level", "error", "--format", "json", "simulate"])
            .args(["--bind", "127.0.0.1:0"])
            .args(extra)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("simulate command should start");

        let stdout = child.stdout.take().expect("stdout should be piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("simulator should report its address");
        let ready: serde_json::Value = serde_json::from_str(&line).expect("ready line is json");
        let listening: std::net::SocketAddr = ready["listening"]
            .as_str()
            .expect("listening field")
            .parse()
            .expect("listening address");

        Self {
            child,
            address: (listening.ip().to_string(), listening.port()),
        }
    }

    fn connect(&self) -> TcpTransport {
        let mut transport = TcpTransport::new();
        transport
            .connect(&self.address, Duration::from_secs(2))
            .expect("connect to simulator");
        transport
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn simulate_serves_configured_chunks() {
    let simulator =
        Simulator::spawn(&["--chunks", "2", "--fill", "0x07", "--metadata", "sim-board"]);
    let mut transport = simulator.connect();

    let received = ChunkedTransfer::new(&mut transport)
        .recv(|_| {})
        .expect("read should succeed");

    assert_eq!(received.chunk_count, 2);
    assert_eq!(received.data.len(), 2 * CHUNK_SIZE);
    assert!(received.data.iter().all(|&b| b == 7));
    assert_eq!(&received.metadata[..9], b"sim-board");
}

#[test]
fn simulate_accepts_writes_then_serves_them() {
    let simulator = Simulator::spawn(&["--chunks", "0"]);
    let payload: Vec<u8> = (0..CHUNK_SIZE).map(|i| i as u8).collect();

    let mut transport = simulator.connect();
    ChunkedTransfer::new(&mut transport)
        .send(b"fresh", &payload, |_| {})
        .expect("write should succeed");
    transport.disconnect();

    let mut transport = simulator.connect();
    let received = ChunkedTransfer::new(&mut transport)
        .recv(|_| {})
        .expect("read should succeed");
    assert_eq!(received.data.as_ref(), payload.as_slice());
    assert_eq!(&received.metadata[..5], b"fresh");
}
