//! Control Server: a line/JSON TCP front-end over the Session Controller
//! (spec.md §4.6). Thread-per-connection; the accept loop is its own thread.

pub mod protocol;

use crate::controller::SessionController;
use crate::error::RecorderError;
use protocol::{Request, Response};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Owns the accept-loop thread. Dropping it does not stop the listener
/// thread (the process-level shutdown path in `main` stops the Controller
/// first, which is what actually matters for file integrity); `join` is
/// exposed for tests that want to wait on a bounded run.
pub struct ControlServer {
    local_addr: std::net::SocketAddr,
    accept_thread: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Bind and start accepting connections in a background thread.
    pub fn spawn(bind_address: &str, port: u16, controller: Arc<SessionController>) -> std::io::Result<Self> {
        let listener = TcpListener::bind((bind_address, port))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "control server listening");

        let accept_thread = thread::spawn(move || accept_loop(listener, controller));
        Ok(Self {
            local_addr,
            accept_thread: Some(accept_thread),
        })
    }

    /// Address actually bound (useful when `port` was 0 in tests).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        // The accept thread blocks forever in `listener.accept()`; there is
        // no cooperative-cancellation path for it, so we deliberately do not
        // join here. It is reaped when the process exits.
        self.accept_thread.take();
    }
}

fn accept_loop(listener: TcpListener, controller: Arc<SessionController>) {
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let controller = Arc::clone(&controller);
                thread::spawn(move || handle_connection(stream, controller));
            }
            Err(err) => warn!(error = %err, "control server accept error"),
        }
    }
}

fn handle_connection(stream: TcpStream, controller: Arc<SessionController>) {
    let peer = stream.peer_addr().ok();
    debug!(?peer, "control client connected");
    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "failed to clone control client stream");
            return;
        }
    };
    let mut writer = stream;
    let mut reader = BufReader::new(reader_stream);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break, // EOF: closes gracefully, never affects session state.
            Ok(_) => {
                let response = dispatch(&line, &controller);
                if writer.write_all(response.to_line().as_bytes()).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(?peer, error = %err, "control client read error");
                break;
            }
        }
    }
    debug!(?peer, "control client disconnected");
}

fn dispatch(line: &str, controller: &SessionController) -> Response {
    match protocol::parse_line(line) {
        Ok(request) => match run_request(request, controller) {
            Ok(response) => response,
            Err(err) => Response::err(&err),
        },
        Err(err) => Response::err(&err),
    }
}

fn run_request(request: Request, controller: &SessionController) -> Result<Response, RecorderError> {
    match request {
        Request::Status => Ok(Response::ok(controller.status())),
        Request::Streams => Ok(Response::ok(controller.available_streams())),
        Request::Update => Ok(Response::ok(controller.update_streams()?)),
        Request::Select(selection) => Ok(Response::ok(controller.select(selection)?)),
        Request::Start => {
            controller.start()?;
            Ok(Response::ok(json!({ "recording": true })))
        }
        Request::Stop => {
            controller.stop()?;
            Ok(Response::ok(json!({ "recording": false })))
        }
        Request::Filename(spec) => Ok(Response::ok(controller.set_filename(&spec)?)),
        Request::GetFilename => Ok(Response::ok(controller.get_filename())),
    }
}
