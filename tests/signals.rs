//! Runs in its own test binary: the raised signal is process-wide.

use shardkv_server::{Config, Database, Server, ServerState};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_sigterm_stops_server() {
    let config = Config {
        handle_signals: true,
        poll_interval_ms: 10,
        ..Default::default()
    };
    let server = Arc::new(Server::new(config, Arc::new(Database::with_capacity(0))).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let runner = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.serve(listener))
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.state() != ServerState::Listening {
        assert!(Instant::now() < deadline, "server never started listening");
        thread::sleep(Duration::from_millis(2));
    }

    let _client = TcpStream::connect(addr).unwrap();
    signal_hook::low_level::raise(signal_hook::consts::SIGTERM).unwrap();

    runner.join().unwrap().unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.active_connections(), 0);
}
