//! End-to-end control-channel scripts against a real TCP server (spec.md §8
//! E4, E5).

mod support;

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use xdf_recorder::clock::SystemClock;
use xdf_recorder::control::ControlServer;
use xdf_recorder::controller::{ControllerConfig, SessionController};
use xdf_recorder::model::{ChannelFormat, MetadataNode, StreamDescriptor};
use xdf_recorder::source::mock::{MockSource, MockStreamKind, MockStreamSpec};
use xdf_recorder::worker::WorkerConfig;
use xdf_recorder::xdf::chunk::{TAG_STREAM_FOOTER, TAG_STREAM_HEADER};

fn spawn_server() -> (ControlServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = Arc::new(MockSource::new(vec![MockStreamSpec {
        descriptor: StreamDescriptor {
            uid: "eeg".into(),
            name: "eeg".into(),
            r#type: "EEG".into(),
            hostname: "localhost".into(),
            source_id: "eeg".into(),
            channel_count: 4,
            channel_format: ChannelFormat::Float32,
            nominal_srate: 250.0,
            metadata: MetadataNode::default(),
        },
        kind: MockStreamKind::Regular { nominal_srate: 250.0 },
        available: true,
    }]));
    let controller = Arc::new(SessionController::new(
        source,
        Arc::new(SystemClock::new()),
        ControllerConfig {
            worker: WorkerConfig {
                pull_timeout_s: 0.02,
                ..Default::default()
            },
            stop_timeout_s: 1.0,
            ..Default::default()
        },
    ));
    let server = ControlServer::spawn("127.0.0.1", 0, controller).expect("spawn");
    (server, dir)
}

struct Client {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: std::net::SocketAddr) -> Self {
        let writer = TcpStream::connect(addr).expect("connect");
        let reader = BufReader::new(writer.try_clone().expect("clone"));
        Self { writer, reader }
    }

    fn send(&mut self, request: &str) -> serde_json::Value {
        writeln!(self.writer, "{request}").expect("write");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read");
        serde_json::from_str(&line).expect("valid json response")
    }
}

/// E4: status -> Idle; update; select all; templated filename; start; start
/// again -> InvalidState; stop; re-open file and assert E1 shape.
#[test]
fn e4_full_control_script() {
    let (server, dir) = spawn_server();
    let mut client = Client::connect(server.local_addr());

    let status = client.send("status");
    assert_eq!(status["result"]["state"], "Idle");

    let update = client.send("update");
    assert_eq!(update["ok"], true);

    let select = client.send("select all");
    assert_eq!(select["ok"], true);

    let root = dir.path().to_str().unwrap().to_string();
    let filename_req = format!("filename {{root:{root}}} {{template:session.xdf}}");
    let filename_resp = client.send(&filename_req);
    assert_eq!(filename_resp["ok"], true);
    let resolved = filename_resp["result"].as_str().expect("resolved filename");
    assert_eq!(resolved, format!("{root}/session.xdf"));

    let start = client.send("start");
    assert_eq!(start["ok"], true);

    let start_again = client.send("start");
    assert_eq!(start_again["ok"], false);
    assert_eq!(start_again["error"]["kind"], "InvalidState");

    std::thread::sleep(std::time::Duration::from_millis(300));
    let stop = client.send("stop");
    assert_eq!(stop["ok"], true);

    let chunks = support::parse_file(std::path::Path::new(resolved));
    assert_eq!(chunks.iter().filter(|c| c.tag == TAG_STREAM_HEADER).count(), 1);
    assert_eq!(chunks.iter().filter(|c| c.tag == TAG_STREAM_FOOTER).count(), 1);
}

/// E5: a filename template referencing an unsupplied variable is rejected,
/// leaving no file behind and state unchanged.
#[test]
fn e5_missing_template_variable_is_bad_request() {
    let (server, dir) = spawn_server();
    let mut client = Client::connect(server.local_addr());

    client.send("update");
    client.send("select all");

    let before = client.send("status");

    let root = dir.path().to_str().unwrap().to_string();
    let bad_req = format!("filename {{root:{root}}} {{template:{{missing}}.xdf}}");
    let resp = client.send(&bad_req);
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["kind"], "BadRequest");

    let after = client.send("status");
    assert_eq!(before["result"]["state"], after["result"]["state"]);
    assert_eq!(after["result"]["filename"], serde_json::Value::Null);

    let entries: Vec<_> = std::fs::read_dir(dir.path()).expect("readdir").collect();
    assert!(entries.is_empty(), "no file should have been created");
}
