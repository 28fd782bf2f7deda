//! Runtime control for [`Server`].

mod accept;
mod backoff;

use std::sync::Arc;

use accept::{AcceptOptions, NewConnection, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal, sync::mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, Listener, Server, ServerError};
use crate::{
    app::AppContext,
    buffer_pool::BufferPool,
    poller::Poller,
    sender::Sender,
    serializer::Serializer,
    session::{Session, SessionCore, driver},
    timer::HeartbeatWheel,
};

impl<S: Serializer> Server<S, Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use playwire::{app::App, server::Server};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), playwire::server::ServerError> {
    /// let server = Server::new(App::new()).bind(([127, 0, 0, 1], 3010).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use playwire::{app::App, server::Server};
    ///
    /// async fn try_run() {
    ///     Server::new(App::new())
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if the handshake response cannot be encoded.
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// On shutdown the listeners stop accepting, every open session is
    /// closed with [`CloseReason::ServerShutdown`] and the call returns once
    /// all server tasks have finished.
    ///
    /// # Examples
    ///
    /// ```
    /// use playwire::{app::App, server::Server};
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), playwire::server::ServerError> {
    /// let server = Server::new(App::new()).bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if the handshake response cannot be encoded.
    ///
    /// [`CloseReason::ServerShutdown`]: crate::session::CloseReason::ServerShutdown
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            app,
            ready_tx,
            state: Bound { listeners },
        } = self;
        let config = app.config.clone().normalized();
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let sender = Sender::spawn(
            config.sender_shards,
            config.outbound_queue_size,
            config.heartbeat_timeout(),
            &tracker,
            &shutdown_token,
        );
        let context = match AppContext::new(app, config.clone(), sender) {
            Ok(context) => Arc::new(context),
            Err(e) => {
                shutdown_token.cancel();
                tracker.close();
                tracker.wait().await;
                return Err(e.into());
            }
        };
        let pool = Arc::new(BufferPool::new(
            config.buffer_pool_size,
            config.read_buffer_size,
            config.buffer_max_capacity,
        ));
        let poller = Poller::spawn(&config, pool, &tracker, &shutdown_token);
        let wheel = HeartbeatWheel::new(config.heartbeat_interval, config.timer_resolution);
        tracker.spawn(wheel.clone().run(shutdown_token.clone()));

        let (connections, new_connections) = mpsc::channel(config.connection_queue_size);
        for Listener { listener, endpoint } in listeners {
            if let Ok(addr) = listener.local_addr() {
                info!("listening: addr={addr}, endpoint={endpoint:?}");
            }
            tracker.spawn(accept_loop(
                listener,
                AcceptOptions {
                    endpoint,
                    poller: poller.clone(),
                    connections: connections.clone(),
                    upgrade_timeout: config.upgrade_timeout,
                    shutdown: shutdown_token.clone(),
                    tracker: tracker.clone(),
                    backoff: config.backoff,
                },
            ));
        }
        drop(connections);
        tracker.spawn(session_loop(
            new_connections,
            context,
            wheel,
            shutdown_token.clone(),
            tracker.clone(),
        ));

        // Signal readiness after all acceptors have been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}

/// Turn accepted connections into sessions until shutdown.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn session_loop<S: Serializer>(
    mut connections: mpsc::Receiver<NewConnection>,
    context: Arc<AppContext<S>>,
    wheel: HeartbeatWheel,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let next = select! {
            biased;

            () = shutdown.cancelled() => None,
            next = connections.recv() => next,
        };
        let Some(new) = next else { break };
        start_session(new, &context, &wheel, &shutdown, &tracker);
    }
}

fn start_session<S: Serializer>(
    new: NewConnection,
    context: &Arc<AppContext<S>>,
    wheel: &HeartbeatWheel,
    shutdown: &CancellationToken,
    tracker: &TaskTracker,
) {
    let NewConnection {
        connection,
        inbound,
    } = new;
    let core = SessionCore::new(connection, shutdown.child_token());
    context.sessions.insert(&core);
    let session = Session::new(core, Arc::clone(context));
    info!(
        "session opened: id={}, peer={}, transport={}",
        session.id(),
        session.peer_addr(),
        session.transport()
    );
    context.on_session.invoke(&session);
    let ticks = wheel.register();
    tracker.spawn(driver::run(session, inbound, ticks));
}
