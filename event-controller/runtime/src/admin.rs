use futures::{future, prelude::*};
use hyper::{
    header::{self, HeaderValue},
    Body, Method, Request, Response, StatusCode,
};
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tracing::{info, warn};

const METRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Serves `/ready` and `/metrics`.
#[derive(Clone, Debug)]
pub(crate) struct Admin {
    ready: watch::Receiver<bool>,
    registry: Arc<Registry>,
}

// === impl Admin ===

impl Admin {
    pub(crate) fn new(ready: watch::Receiver<bool>, registry: Registry) -> Self {
        Self {
            ready,
            registry: Arc::new(registry),
        }
    }

    /// Binds the admin server, returning a future that serves requests until
    /// it fails.
    pub(crate) fn bind(
        self,
        addr: SocketAddr,
    ) -> hyper::Result<impl Future<Output = hyper::Result<()>>> {
        let server = hyper::server::Server::try_bind(&addr)?.serve(
            hyper::service::make_service_fn(move |_conn| {
                let admin = self.clone();
                future::ok::<_, Infallible>(hyper::service::service_fn(
                    move |req: Request<Body>| future::ok::<_, Infallible>(admin.handle(req)),
                ))
            }),
        );
        let addr = server.local_addr();
        info!(%addr, "HTTP admin server listening");
        Ok(server)
    }

    fn handle(&self, req: Request<Body>) -> Response<Body> {
        if !matches!(*req.method(), Method::GET | Method::HEAD) {
            let status = match req.uri().path() {
                "/ready" | "/metrics" => StatusCode::METHOD_NOT_ALLOWED,
                _ => StatusCode::NOT_FOUND,
            };
            return respond(status, Body::empty());
        }

        match req.uri().path() {
            "/ready" => self.handle_ready(),
            "/metrics" => self.handle_metrics(),
            _ => respond(StatusCode::NOT_FOUND, Body::empty()),
        }
    }

    fn handle_ready(&self) -> Response<Body> {
        let (status, body) = if *self.ready.borrow() {
            (StatusCode::OK, "ready\n")
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "not ready\n")
        };
        with_content_type(respond(status, body.into()), "text/plain")
    }

    fn handle_metrics(&self) -> Response<Body> {
        let mut buf = String::new();
        if let Err(error) = encode(&mut buf, &self.registry) {
            warn!(%error, "Failed to encode metrics");
            return respond(StatusCode::INTERNAL_SERVER_ERROR, Body::empty());
        }
        with_content_type(respond(StatusCode::OK, buf.into()), METRICS_CONTENT_TYPE)
    }
}

fn respond(status: StatusCode, body: Body) -> Response<Body> {
    let mut rsp = Response::new(body);
    *rsp.status_mut() = status;
    rsp
}

fn with_content_type(mut rsp: Response<Body>, content_type: &'static str) -> Response<Body> {
    rsp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    rsp
}
