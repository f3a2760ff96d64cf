//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

//! Library surface for the `ncd` binary. Exists so the end-to-end
//! integration tests under `tests/` can bring up a real backend and both
//! frontends against ephemeral sockets, without going through `main`'s
//! privilege-dropping and tracing setup.

pub mod backend;
pub mod config;
pub mod frontend;
pub mod schema;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use backend::{Backend, BackendHandle};
use config::Config;
use frontend::SessionIds;

/// A running daemon instance. Frontend tasks and the backend task keep
/// running independently of this handle; dropping it without calling
/// [`Daemon::shutdown`] leaves them running until the process exits.
pub struct Daemon {
    pub netconf_addr: SocketAddr,
    pub handle: BackendHandle,
    shutdown_tx: oneshot::Sender<()>,
    backend_task: JoinHandle<()>,
}

impl Daemon {
    /// Signals the backend task to stop and waits for it to exit. Frontend
    /// listener tasks are left running (as they are for the real process,
    /// where only an external signal or process exit tears them down).
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.backend_task.await;
    }
}

/// Brings up the datastore, the schema self-test, the backend task and both
/// client-facing frontends, returning once both listeners are bound and the
/// backend task is running. Mirrors the real daemon's startup sequence in
/// `main`, minus privilege dropping and tracing initialization, which only
/// make sense for the actual process.
pub async fn spawn(config: Config, db: ncd_utils::Database) -> Daemon {
    let datastore = ncd_datastore::Datastore::connect(&config.clicon.clicon_xmldb_dir)
        .expect("failed to initialize the datastore directory");
    let schema = schema::build();

    let confirmed_commit_timeout = Duration::from_secs(config.clicon.confirmed_commit_timeout_secs);
    let backend = Backend::new(datastore, Some(schema), db, confirmed_commit_timeout);

    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = BackendHandle::new(msg_tx);
    let session_ids = Arc::new(SessionIds::new());

    let ipc_listener = frontend::ipc::bind(
        config.clicon.clicon_sock_family,
        &config.clicon.clicon_sock,
    )
    .await
    .expect("failed to bind the IPC socket");
    tokio::spawn(frontend::ipc::serve(
        ipc_listener,
        handle.clone(),
        Arc::clone(&session_ids),
    ));

    let netconf_listener = TcpListener::bind(&config.clicon.netconf_listen)
        .await
        .expect("failed to bind the NETCONF listener");
    let netconf_addr = netconf_listener
        .local_addr()
        .expect("bound TCP listener always has a local address");
    tokio::spawn(frontend::netconf::serve(
        netconf_listener,
        handle.clone(),
        Arc::clone(&session_ids),
        config.clicon.clicon_netconf_hello_optional,
    ));

    let backend_task = tokio::spawn(async move {
        backend.run(msg_rx, shutdown_rx).await;
    });

    Daemon {
        netconf_addr,
        handle,
        shutdown_tx,
        backend_task,
    }
}
