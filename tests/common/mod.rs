//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Shared scaffolding for the end-to-end tests: spins up a real
//! [`ncd_daemon::spawn`] instance against a scratch directory and ephemeral
//! sockets, and a thin NETCONF client built on the same [`Framer`] the
//! daemon itself uses.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use ncd_daemon::config::{Config, SockFamily};
use ncd_netconf::{FrameMode, Framer};
use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};
use tokio::net::TcpStream;

static COUNTER: AtomicU32 = AtomicU32::new(0);

pub struct TestDaemon {
    pub daemon: ncd_daemon::Daemon,
    dir: PathBuf,
}

impl TestDaemon {
    /// Opens a new NETCONF TCP connection to the daemon, framed per
    /// RFC 6242 end-of-message until (and unless) a `base:1.1` hello
    /// upgrades it.
    pub async fn connect_netconf(&self) -> Framer<TcpStream> {
        let stream = TcpStream::connect(self.daemon.netconf_addr)
            .await
            .expect("connect to netconf listener");
        Framer::new(stream, FrameMode::Eom)
    }

    pub async fn shutdown(self) {
        self.daemon.shutdown().await;
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

/// Brings up a full daemon against a scratch directory and ephemeral
/// `127.0.0.1:0`/unix-socket endpoints, mirroring how `main` calls
/// `ncd_daemon::spawn`, so each test gets an isolated backend.
pub async fn spawn() -> TestDaemon {
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "ncd-daemon-itest-{}-{}",
        std::process::id(),
        id
    ));
    let xmldb_dir = dir.join("db");
    std::fs::create_dir_all(&xmldb_dir).expect("create scratch xmldb dir");

    let mut config = Config::default();
    config.clicon.clicon_xmldb_dir = xmldb_dir.to_string_lossy().into_owned();
    config.clicon.clicon_sock = dir.join("ncd.sock").to_string_lossy().into_owned();
    config.clicon.clicon_sock_family = SockFamily::Unix;
    config.clicon.netconf_listen = "127.0.0.1:0".to_owned();

    let db = PickleDb::new(
        dir.join("ncd.db"),
        PickleDbDumpPolicy::NeverDump,
        SerializationMethod::Bin,
    );
    let db = Arc::new(Mutex::new(db));

    let daemon = ncd_daemon::spawn(config, db).await;
    TestDaemon { daemon, dir }
}

/// Writes `body` as one frame and returns the next frame read back,
/// lossily decoded. Panics on I/O or framing errors, and if the peer
/// closes before replying — tests assert on reply content, not transport
/// failure modes.
pub async fn exchange(framer: &mut Framer<TcpStream>, body: &str) -> String {
    framer
        .write_message(body.as_bytes())
        .await
        .expect("write frame");
    let reply = framer
        .read_message()
        .await
        .expect("read frame")
        .expect("connection closed before a reply arrived");
    String::from_utf8_lossy(&reply).into_owned()
}

pub const HELLO_1_0: &str = concat!(
    r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">"#,
    r#"<capabilities>"#,
    r#"<capability>urn:ietf:params:netconf:base:1.0</capability>"#,
    r#"</capabilities></hello>"#,
);

pub const HELLO_1_1: &str = concat!(
    r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">"#,
    r#"<capabilities>"#,
    r#"<capability>urn:ietf:params:netconf:base:1.0</capability>"#,
    r#"<capability>urn:ietf:params:netconf:base:1.1</capability>"#,
    r#"</capabilities></hello>"#,
);
