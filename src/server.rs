use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    sync::mpsc,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, Uri, header},
    response::Response,
};
use tokio::{net::TcpListener, runtime::Runtime, sync::oneshot};
use tracing::{debug, info, warn};

/// Local static file server exposing the built library under `/dist/` and the
/// benchmark scenarios (with their harness pages) under `/bench/`.
///
/// Runs axum on a dedicated thread so the otherwise synchronous orchestration
/// can drive browsers while pages are being served. Process-wide singleton for
/// one invocation, exclusively owned by the harness driver.
pub struct StaticServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

struct ServerState {
    dist_root: PathBuf,
    bench_root: PathBuf,
}

impl StaticServer {
    /// Bind an ephemeral localhost port and start serving.
    pub fn start(dist_root: PathBuf, bench_root: PathBuf) -> Result<Self> {
        let (addr_tx, addr_rx) = mpsc::channel::<Result<SocketAddr, String>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ServerState {
            dist_root,
            bench_root,
        });

        let handle = thread::spawn(move || {
            let runtime = match Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = addr_tx.send(Err(format!("failed to start server runtime: {err}")));
                    return;
                }
            };
            runtime.block_on(async move {
                let listener = match TcpListener::bind(("127.0.0.1", 0)).await {
                    Ok(listener) => listener,
                    Err(err) => {
                        let _ = addr_tx.send(Err(format!("failed to bind static server: {err}")));
                        return;
                    }
                };
                let addr = match listener.local_addr() {
                    Ok(addr) => addr,
                    Err(err) => {
                        let _ = addr_tx.send(Err(format!("failed to read local address: {err}")));
                        return;
                    }
                };
                let _ = addr_tx.send(Ok(addr));

                let router = Router::new().fallback(serve_file).with_state(state);
                let serve = axum::serve(listener, router.into_make_service())
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    });
                if let Err(err) = serve.await {
                    warn!(error = %err, "static server terminated unexpectedly");
                }
            });
        });

        let local_addr = addr_rx
            .recv()
            .context("Static server thread exited before reporting its address")?
            .map_err(|message| anyhow!(message))?;

        info!(listener = %local_addr, "started static benchmark server");
        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Base URL (no trailing slash) other components build page URLs from.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop serving and wait for the server thread to finish.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("Static server thread panicked during shutdown"))?;
        }
        Ok(())
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        // Backstop for early-error paths where shutdown() was never reached.
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
    }
}

async fn serve_file(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let path = uri.path();
    let resolved = if let Some(rest) = path.strip_prefix("/dist/") {
        resolve_under(&state.dist_root, rest)
    } else if let Some(rest) = path.strip_prefix("/bench/") {
        resolve_under(&state.bench_root, rest)
    } else {
        None
    };

    let Some(file_path) = resolved else {
        debug!(path, "static request outside served roots");
        return status_response(StatusCode::NOT_FOUND);
    };

    match tokio::fs::read(&file_path).await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static(content_type_for(&file_path)),
            );
            response
        }
        Err(err) => {
            debug!(path = %file_path.display(), error = %err, "static file read failed");
            status_response(StatusCode::NOT_FOUND)
        }
    }
}

fn status_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Map a URL tail onto a file below `root`, rejecting traversal segments.
fn resolve_under(root: &Path, rest: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in rest.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        resolved.push(segment);
    }
    Some(resolved)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn serves_files_from_both_roots() {
        let dist = tempdir().expect("dist directory");
        let bench = tempdir().expect("bench directory");
        fs::write(dist.path().join("renderer.min.js"), "// lib").expect("library file");
        fs::create_dir_all(bench.path().join("cubes")).expect("scenario directory");
        fs::write(bench.path().join("cubes/candidate.html"), "<html></html>")
            .expect("harness page");

        let server = StaticServer::start(dist.path().to_path_buf(), bench.path().to_path_buf())
            .expect("server start");
        let base = server.base_url();

        let client = reqwest::blocking::Client::new();
        let library = client
            .get(format!("{base}/dist/renderer.min.js"))
            .send()
            .expect("library request");
        assert!(library.status().is_success());
        assert_eq!(library.text().expect("library body"), "// lib");

        let page = client
            .get(format!("{base}/bench/cubes/candidate.html"))
            .send()
            .expect("page request");
        assert!(page.status().is_success());
        assert_eq!(
            page.headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/html; charset=utf-8")
        );

        server.shutdown().expect("server shutdown");
    }

    #[test]
    fn rejects_paths_outside_served_roots() {
        let dist = tempdir().expect("dist directory");
        let bench = tempdir().expect("bench directory");
        let server = StaticServer::start(dist.path().to_path_buf(), bench.path().to_path_buf())
            .expect("server start");
        let base = server.base_url();

        let client = reqwest::blocking::Client::new();
        for path in ["/etc/passwd", "/dist/../secret", "/bench/../../x"] {
            let response = client
                .get(format!("{base}{path}"))
                .send()
                .expect("request");
            assert_eq!(response.status().as_u16(), 404, "path {path}");
        }

        server.shutdown().expect("server shutdown");
    }

    #[test]
    fn traversal_segments_are_rejected_before_hitting_disk() {
        let root = Path::new("/srv/bench");
        assert!(resolve_under(root, "cubes/candidate.html").is_some());
        assert!(resolve_under(root, "../secret").is_none());
        assert!(resolve_under(root, "cubes//x").is_none());
        assert!(resolve_under(root, "./cubes").is_none());
    }
}
