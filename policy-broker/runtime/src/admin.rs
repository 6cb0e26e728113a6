use anyhow::Result;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{http, server::conn::http1, service::service_fn, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tracing::{debug, info, warn};

type Body = Full<Bytes>;

/// Serves liveness, readiness and metrics.
#[derive(Clone)]
pub struct Admin {
    registry: Arc<Registry>,
    ready: watch::Receiver<bool>,
}

// === impl Admin ===

impl Admin {
    pub fn new(registry: Registry, ready: watch::Receiver<bool>) -> Self {
        Self {
            registry: Arc::new(registry),
            ready,
        }
    }

    /// Accepts connections until `drain` is signaled.
    pub async fn serve(self, addr: SocketAddr, drain: drain::Watch) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Admin server listening");

        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            let (io, peer) = tokio::select! {
                _ = &mut shutdown => {
                    debug!("Admin server stopped");
                    return Ok(());
                }
                res = listener.accept() => match res {
                    Ok(conn) => conn,
                    Err(error) => {
                        warn!(%error, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let admin = self.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let rsp = admin.handle(&req);
                    async move { Ok::<_, Infallible>(rsp) }
                });
                if let Err(error) = http1::Builder::new()
                    .serve_connection(TokioIo::new(io), svc)
                    .await
                {
                    debug!(%peer, %error, "Admin connection failed");
                }
            });
        }
    }

    pub(crate) fn handle<B>(&self, req: &Request<B>) -> Response<Body> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return rsp(StatusCode::METHOD_NOT_ALLOWED, "");
        }
        match req.uri().path() {
            "/live" => rsp(StatusCode::OK, "live\n"),
            "/ready" => {
                if *self.ready.borrow() {
                    rsp(StatusCode::OK, "ready\n")
                } else {
                    rsp(StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
                }
            }
            "/metrics" => {
                let mut buf = String::new();
                match encode(&mut buf, &self.registry) {
                    Ok(()) => Response::builder()
                        .status(StatusCode::OK)
                        .header(
                            http::header::CONTENT_TYPE,
                            "application/openmetrics-text; version=1.0.0; charset=utf-8",
                        )
                        .body(Body::from(buf))
                        .unwrap_or_else(|_| rsp(StatusCode::INTERNAL_SERVER_ERROR, "")),
                    Err(error) => {
                        warn!(%error, "Failed to encode metrics");
                        rsp(StatusCode::INTERNAL_SERVER_ERROR, "")
                    }
                }
            }
            _ => rsp(StatusCode::NOT_FOUND, ""),
        }
    }
}

fn rsp(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut rsp = Response::new(Body::from(body));
    *rsp.status_mut() = status;
    rsp
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use prometheus_client::metrics::counter::Counter;

    fn get(path: &str) -> Request<()> {
        Request::get(path).body(()).unwrap()
    }

    async fn body(rsp: Response<Body>) -> String {
        let bytes = rsp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn routes() {
        let mut registry = Registry::default();
        let cycles = Counter::<u64>::default();
        registry
            .sub_registry_with_prefix("reconcile")
            .register("cycles", "Reconciliation cycles", cycles.clone());
        cycles.inc();
        let (ready_tx, ready) = watch::channel(false);
        let admin = Admin::new(registry, ready);

        assert_eq!(admin.handle(&get("/live")).status(), StatusCode::OK);
        assert_eq!(
            admin.handle(&get("/ready")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        ready_tx.send_replace(true);
        assert_eq!(admin.handle(&get("/ready")).status(), StatusCode::OK);

        let metrics = admin.handle(&get("/metrics"));
        assert_eq!(metrics.status(), StatusCode::OK);
        let text = body(metrics).await;
        assert!(text.contains("reconcile_cycles_total 1"), "{text}");

        assert_eq!(admin.handle(&get("/nope")).status(), StatusCode::NOT_FOUND);
        let post = Request::post("/live").body(()).unwrap();
        assert_eq!(admin.handle(&post).status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn serves_until_drained() {
        let (_ready_tx, ready) = watch::channel(true);
        let admin = Admin::new(Registry::default(), ready);
        let (signal, watch) = drain::channel();
        let server = tokio::spawn(admin.serve(([127, 0, 0, 1], 0).into(), watch));

        signal.drain().await;
        server
            .await
            .expect("server must not panic")
            .expect("server must bind");
    }
}
