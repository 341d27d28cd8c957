//! Operator-facing status page for the permissions datastore.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::any,
    Router,
};
use schemagen::SourceGenerator;
use storage::Datastore;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub mod template;
pub mod view;

pub use template::render_page;
pub use view::{ResolveError, ViewModel, ViewResolver};

/// Values rendered into the example commands. Never validated.
#[derive(Debug, Clone, Default)]
pub struct DashboardArgs {
    /// Address of the gRPC endpoint.
    pub grpc_addr: String,
    /// True when the gRPC endpoint is served without TLS.
    pub grpc_no_tls: bool,
    pub datastore_engine: String,
}

pub struct Dashboard {
    args: DashboardArgs,
    resolver: ViewResolver,
}

struct DashboardState {
    args: DashboardArgs,
    resolver: ViewResolver,
    /// Cancelled when a shutdown outlives its grace period.
    abort: CancellationToken,
}

impl Dashboard {
    pub fn new(
        args: DashboardArgs,
        datastore: Arc<dyn Datastore>,
        generator: Arc<dyn SourceGenerator>,
    ) -> Self {
        Self {
            args,
            resolver: ViewResolver::new(datastore, generator),
        }
    }

    /// Every method on every path serves the page.
    pub fn router(&self) -> Router {
        self.router_with_abort(CancellationToken::new())
    }

    fn router_with_abort(&self, abort: CancellationToken) -> Router {
        let state = Arc::new(DashboardState {
            args: self.args.clone(),
            resolver: self.resolver.clone(),
            abort,
        });
        Router::new()
            .route("/", any(root))
            .fallback(root)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Binds `addr` and serves in a background task. The returned handle
    /// owns the server; dropping it shuts the server down.
    pub async fn start(&self, addr: &str) -> anyhow::Result<DashboardHandle> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind dashboard to '{addr}'"))?;
        let local_addr = listener.local_addr()?;
        let abort = CancellationToken::new();
        let app = self.router_with_abort(abort.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(%local_addr, "dashboard listening");
        Ok(DashboardHandle {
            local_addr,
            shutdown_tx,
            abort,
            task,
        })
    }
}

pub struct DashboardHandle {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    abort: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl DashboardHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves when the server stops on its own, e.g. after a fatal accept error.
    pub async fn closed(&mut self) -> anyhow::Result<()> {
        (&mut self.task)
            .await
            .context("dashboard task panicked")?
            .context("dashboard server failed")
    }

    /// Stops accepting connections and waits up to `grace` for in-flight
    /// requests. Past the deadline every in-flight request drops its pending
    /// datastore call and the server task is aborted.
    pub async fn stop(self, grace: Duration) -> anyhow::Result<()> {
        let Self {
            local_addr,
            shutdown_tx,
            abort,
            mut task,
        } = self;
        let _ = shutdown_tx.send(());

        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => {
                joined
                    .context("dashboard task panicked")?
                    .context("dashboard server failed")?;
                info!(%local_addr, "dashboard stopped");
                Ok(())
            }
            Err(_) => {
                abort.cancel();
                task.abort();
                bail!("dashboard at {local_addr} did not shut down within {grace:?}");
            }
        }
    }
}

async fn root(State(state): State<Arc<DashboardState>>) -> Response {
    let resolved = tokio::select! {
        resolved = state.resolver.resolve() => resolved,
        _ = state.abort.cancelled() => {
            warn!("dashboard shutting down; abandoning in-flight request");
            return (StatusCode::OK, "Internal Error").into_response();
        }
    };

    match resolved {
        Ok(view) => Html(render_page(&state.args, &view)).into_response(),
        Err(error) => {
            error!(error = ?error, "failed to resolve dashboard view");
            (StatusCode::OK, "Internal Error").into_response()
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
