use std::cell::{Cell, RefCell};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Notify;
use tokio::task;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use inmemdb_core::{snapshot, Database};

use crate::command;
use crate::resp::{self, ReplyBuf};

/// Listen backlog for the accepting socket.
const LISTEN_BACKLOG: u32 = 128;

/// Per-client cap on buffered unparsed request bytes. A single request
/// larger than this drops the connection.
const READ_BUF_SIZE: usize = 64 * 1024;

/// How often the loop wakes to run the (itself rate-limited) expiry sweep.
const SWEEP_TICK: Duration = Duration::from_millis(50);

/// Server state reachable from command handlers: the snapshot path for
/// SAVE/SHUTDOWN and the shutdown latch the loop polls.
pub struct ServerCtx {
    snapshot_path: PathBuf,
    shutdown: Cell<bool>,
}

impl ServerCtx {
    pub fn new(snapshot_path: PathBuf) -> Self {
        Self {
            snapshot_path,
            shutdown: Cell::new(false),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Marks the server for shutdown. The connection that requested it
    /// flushes its reply first, then wakes the accept loop.
    pub fn request_shutdown(&self) {
        self.shutdown.set(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.get()
    }
}

/// The TCP server: one listening socket, one task per client connection,
/// all cooperatively scheduled on a single thread.
///
/// The keyspace is shared through `Rc<RefCell<_>>`; dispatch never yields
/// while holding the borrow, so every command runs to completion before
/// any other connection touches the keyspace.
pub struct Server {
    listener: TcpListener,
    ctx: Rc<ServerCtx>,
    max_clients: usize,
}

impl Server {
    /// Binds the listening socket with `SO_REUSEADDR` and a backlog of 128.
    pub fn bind(addr: SocketAddr, max_clients: usize, snapshot_path: PathBuf) -> io::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        Ok(Self {
            listener,
            ctx: Rc::new(ServerCtx::new(snapshot_path)),
            max_clients,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and serves clients until SHUTDOWN or Ctrl-C.
    ///
    /// Must be driven inside a `LocalSet` on a current-thread runtime;
    /// connection tasks are spawned locally and die with it.
    pub async fn serve(self, db: Database) -> io::Result<()> {
        let db = Rc::new(RefCell::new(db));
        let shutdown = Rc::new(Notify::new());
        let clients = Rc::new(Cell::new(0usize));

        let mut sweep = time::interval(SWEEP_TICK);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.accept_client(stream, peer, &db, &shutdown, &clients);
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = sweep.tick() => db.borrow_mut().expire_sweep(),
                _ = shutdown.notified() => {
                    info!("Shutdown requested by client");
                    break;
                }
                _ = &mut ctrl_c => {
                    info!("Interrupt received, saving snapshot");
                    if let Err(e) = snapshot::save(&db.borrow(), self.ctx.snapshot_path()) {
                        error!(error = %e, "Snapshot save failed during shutdown");
                    }
                    break;
                }
            }
        }

        // Remaining connection tasks are dropped with the LocalSet, which
        // closes their sockets and releases their buffers.
        Ok(())
    }

    fn accept_client(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        db: &Rc<RefCell<Database>>,
        shutdown: &Rc<Notify>,
        clients: &Rc<Cell<usize>>,
    ) {
        if clients.get() >= self.max_clients {
            warn!(%peer, max_clients = self.max_clients, "Client cap reached, closing connection");
            return;
        }
        clients.set(clients.get() + 1);
        debug!(%peer, clients = clients.get(), "Client connected");

        let db = db.clone();
        let ctx = self.ctx.clone();
        let shutdown = shutdown.clone();
        let clients = clients.clone();
        task::spawn_local(async move {
            handle_connection(stream, peer, db, ctx, shutdown).await;
            clients.set(clients.get() - 1);
            debug!(%peer, "Client disconnected");
        });
    }
}

/// Reads requests, dispatches them, and writes replies until the peer
/// disconnects, misbehaves, or the server shuts down.
///
/// Pipelining falls out of the parse loop: every complete request in the
/// read buffer is answered before the combined reply bytes are written.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    db: Rc<RefCell<Database>>,
    ctx: Rc<ServerCtx>,
    shutdown: Rc<Notify>,
) {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        match stream.read_buf(&mut buf).await {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                debug!(%peer, error = %e, "Read failed");
                return;
            }
        }

        let mut reply = ReplyBuf::new();
        loop {
            match resp::parse(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.advance(consumed);
                    command::execute(&mut db.borrow_mut(), &ctx, &frame, &mut reply);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(%peer, error = %e, "Malformed request, dropping client");
                    return;
                }
            }
        }

        if !reply.is_empty() && stream.write_all(reply.as_bytes()).await.is_err() {
            return;
        }

        // The SHUTDOWN reply is on the wire; now the accept loop may stop.
        if ctx.shutdown_requested() {
            shutdown.notify_one();
            return;
        }

        if buf.len() >= READ_BUF_SIZE {
            warn!(%peer, "Unparsed request exceeds buffer limit, dropping client");
            return;
        }
    }
}
