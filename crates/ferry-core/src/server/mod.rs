//! Framed protocol listener.
//!
//! A [`Server`] accepts connections and answers calls from a shared
//! [`FileService`], usually a [`crate::service::LocalService`]. Each
//! connection runs in its own task and carries any number of sequential
//! calls.
//!
//! Failures are answered with an `Error` frame. The connection is dropped
//! only when the error leaves the stream in an unknown state (see
//! [`Error::is_fatal_to_connection`]); other connections are unaffected.

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::{
    self, decode_payload, encode_payload, ErrorPayload, FileRequest, MessageType, TransferManifest,
};
use crate::service::FileService;
use crate::transfer::{configure_tcp_keepalive, Direction, FramedSink, FramedSource};

/// Listens for framed connections.
pub struct Server {
    listener: TcpListener,
    service: Arc<dyn FileService>,
    io_timeout: Option<Duration>,
}

impl Server {
    /// Bind to `addr` and serve `service`.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the address cannot be bound.
    pub async fn bind(addr: &str, service: Arc<dyn FileService>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(Error::transport)?;
        Ok(Self {
            listener,
            service,
            io_timeout: None,
        })
    }

    /// Limit each frame read or write inside a call.
    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Option<Duration>) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Address the server is bound to.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::transport)
    }

    /// Serve until the process exits.
    ///
    /// # Errors
    ///
    /// Never returns under normal operation.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes.
    ///
    /// Connections already accepted keep running to completion.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok` once `shutdown` fires.
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr()?,
            service = %self.service.endpoint(),
            "server listening"
        );

        let service = self.service;
        let io_timeout = self.io_timeout;
        accept_loop(self.listener, shutdown, move |stream, peer| {
            let service = Arc::clone(&service);
            async move {
                if let Err(e) = serve_connection(stream, peer, service, io_timeout).await {
                    tracing::error!(%peer, "connection failed: {e}");
                }
            }
        })
        .await
    }

    /// Run in a background task.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the bound address cannot be read.
    pub fn spawn(self) -> Result<ListenerHandle> {
        let addr = self.local_addr()?;
        Ok(ListenerHandle::spawn(addr, |stop| self.run_until(stop)))
    }
}

/// Handle to a listener running in a background task.
#[derive(Debug)]
pub struct ListenerHandle {
    addr: SocketAddr,
    stop_tx: oneshot::Sender<()>,
    task_handle: JoinHandle<Result<()>>,
}

impl ListenerHandle {
    pub(crate) fn spawn<F, Fut>(addr: SocketAddr, run: F) -> Self
    where
        F: FnOnce(std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let stop = Box::pin(async move {
            let _ = stop_rx.await;
        });
        let task_handle = tokio::spawn(run(stop));
        Self {
            addr,
            stop_tx,
            task_handle,
        }
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns the listener's error, or `Internal` if its task panicked.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop_tx.send(());
        match self.task_handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("listener task panicked: {e}"))),
        }
    }
}

/// Accept connections until `shutdown` completes, handing each to `handle`
/// in its own task.
pub(crate) async fn accept_loop<F, Fut>(
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send,
    handle: F,
) -> Result<()>
where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::debug!("listener received stop signal");
                return Ok(());
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {e}");
                        continue;
                    }
                };

                if let Err(e) = configure_tcp_keepalive(&stream) {
                    tracing::warn!(%peer, "Failed to configure TCP keep-alive: {e}");
                }
                let _ = stream.set_nodelay(true);

                tracing::debug!(%peer, "connection accepted");
                tokio::spawn(handle(stream, peer));
            }
        }
    }
}

/// Serve sequential calls on one connection until the peer closes it.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    service: Arc<dyn FileService>,
    io_timeout: Option<Duration>,
) -> Result<()> {
    let mut calls = 0u64;

    loop {
        let (header, payload) = match protocol::read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(Error::Transport(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::debug!(%peer, calls, "connection closed");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(%peer, "rejected frame: {e}");
                let _ = protocol::write_error(&mut stream, &e).await;
                return Err(e);
            }
        };

        calls += 1;
        let call = Call {
            stream: &mut stream,
            peer,
            service: service.as_ref(),
            io_timeout,
        };

        match header.message_type {
            MessageType::UploadOpen => call.upload(&payload).await?,
            MessageType::DownloadRequest => call.download(&payload).await?,
            MessageType::ListRequest => call.list().await?,
            MessageType::DeleteRequest => call.delete(&payload).await?,
            other => {
                let e = Error::UnexpectedMessage {
                    expected: "a request".to_string(),
                    actual: format!("{other:?}"),
                };
                return call.fail(e).await;
            }
        }
    }
}

/// One call being answered on a connection.
struct Call<'a> {
    stream: &'a mut TcpStream,
    peer: SocketAddr,
    service: &'a dyn FileService,
    io_timeout: Option<Duration>,
}

impl Call<'_> {
    async fn reply(&mut self, message_type: MessageType, payload: &[u8]) -> Result<()> {
        protocol::write_frame_within(&mut *self.stream, message_type, payload, self.io_timeout)
            .await
    }

    /// Answer with an `Error` frame, keeping the connection only if `err`
    /// leaves it usable.
    async fn fail(mut self, err: Error) -> Result<()> {
        tracing::warn!(peer = %self.peer, code = err.code(), "request failed: {err}");
        let body = encode_payload(&ErrorPayload::from(&err))?;
        self.reply(MessageType::Error, &body).await?;
        if err.is_fatal_to_connection() {
            return Err(err);
        }
        Ok(())
    }

    async fn upload(mut self, payload: &[u8]) -> Result<()> {
        let manifest: TransferManifest = match decode_payload(payload) {
            Ok(manifest) => manifest,
            Err(e) => return self.fail(e).await,
        };
        let filename = manifest.filename.clone();

        let mut source = FramedSource::new(&mut *self.stream, Direction::Upload)
            .announced(manifest)
            .with_deadline(self.io_timeout);
        let outcome = self.service.upload(&mut source).await;

        match outcome {
            Ok(result) => {
                let disconnected = source.disconnected();
                if disconnected {
                    tracing::info!(peer = %self.peer, file = %filename, "upload stored, peer already gone");
                    return Err(Error::transport(ErrorKind::UnexpectedEof.into()));
                }
                tracing::info!(peer = %self.peer, file = %filename, "upload complete");
                let body = encode_payload(&result)?;
                self.reply(MessageType::UploadResult, &body).await
            }
            Err(e) if source.disconnected() => Err(e),
            Err(e) => {
                if !source.at_boundary() && !e.is_fatal_to_connection() {
                    source.drain().await?;
                }
                self.fail(e).await
            }
        }
    }

    async fn download(mut self, payload: &[u8]) -> Result<()> {
        let request: FileRequest = match decode_payload(payload) {
            Ok(request) => request,
            Err(e) => return self.fail(e).await,
        };

        let mut sink =
            FramedSink::new(&mut *self.stream, Direction::Download).with_deadline(self.io_timeout);
        let outcome = self.service.download(&request.filename, &mut sink).await;

        match outcome {
            Ok(summary) => {
                tracing::info!(
                    peer = %self.peer,
                    file = %request.filename,
                    bytes = summary.bytes,
                    "download complete"
                );
                Ok(())
            }
            Err(e @ Error::Transport(_)) => Err(e),
            Err(e) => self.fail(e).await,
        }
    }

    async fn list(mut self) -> Result<()> {
        match self.service.list().await {
            Ok(listing) => {
                tracing::info!(peer = %self.peer, files = listing.files.len(), "listing sent");
                let body = encode_payload(&listing)?;
                self.reply(MessageType::FileListing, &body).await
            }
            Err(e) => self.fail(e).await,
        }
    }

    async fn delete(mut self, payload: &[u8]) -> Result<()> {
        let request: FileRequest = match decode_payload(payload) {
            Ok(request) => request,
            Err(e) => return self.fail(e).await,
        };

        match self.service.delete(&request.filename).await {
            Ok(result) => {
                tracing::info!(
                    peer = %self.peer,
                    file = %request.filename,
                    success = result.success,
                    "delete handled"
                );
                let body = encode_payload(&result)?;
                self.reply(MessageType::OperationResult, &body).await
            }
            Err(e) => self.fail(e).await,
        }
    }
}
