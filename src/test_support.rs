//! Local HTTP and HTTPS endpoints for tests

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rcgen::CertifiedKey;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

/// Install a test-writer subscriber once; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Responds with the request body
pub struct EchoBody;

impl Respond for EchoBody {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_bytes(request.body.clone())
    }
}

/// Wiremock server driven from synchronous tests
///
/// The server runs on its own thread, so blocking calls from the test thread
/// are served without entering the runtime.
pub struct MockHttp {
    server:  MockServer,
    runtime: Runtime,
}

impl MockHttp {
    pub fn start() -> anyhow::Result<Self> {
        let runtime = Runtime::new()?;
        let server = runtime.block_on(MockServer::start());
        Ok(Self { server, runtime })
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    pub fn received(&self) -> Vec<wiremock::Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Plain HTTP/1.1 server that keeps connections alive and counts the ones
/// the client still holds open
pub struct KeepAliveServer {
    addr: SocketAddr,
    open: Arc<AtomicUsize>,
}

impl KeepAliveServer {
    /// Answer every request with `body` until the client hangs up
    pub fn start(body: &'static str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let open = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&open);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let _ = serve_keep_alive(stream, body);
                    counter.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        Ok(Self { addr, open })
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Connections accepted and not yet closed by the client
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

fn serve_keep_alive(mut stream: TcpStream, body: &str) -> anyhow::Result<()> {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let mut request = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        request.extend_from_slice(&chunk[..read]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            request.clear();
            stream.write_all(response.as_bytes())?;
            stream.flush()?;
        }
    }
}

/// Spawn an HTTPS server with a self-signed certificate for a host name that
/// does not match `127.0.0.1`. It answers `connections` connections with
/// `body` and then stops accepting.
pub fn spawn_self_signed_server(body: &'static str, connections: usize) -> anyhow::Result<SocketAddr> {
    let CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["self-signed.invalid".to_string()])?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(vec![cert.der().clone()], key)?;
    let config = Arc::new(config);

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::spawn(move || {
        for stream in listener.incoming().take(connections) {
            let Ok(stream) = stream else {
                continue;
            };
            let config = Arc::clone(&config);
            thread::spawn(move || {
                let _ = serve_once(config, stream, body);
            });
        }
    });

    Ok(addr)
}

fn serve_once(config: Arc<ServerConfig>, stream: TcpStream, body: &str) -> anyhow::Result<()> {
    let connection = ServerConnection::new(config)?;
    let mut tls = StreamOwned::new(connection, stream);

    let mut request = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = tls.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        request.extend_from_slice(&chunk[..read]);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    tls.write_all(response.as_bytes())?;
    tls.conn.send_close_notify();
    tls.flush()?;
    Ok(())
}
