//! `/metrics` Prometheus endpoint, served via `warp`.

use std::net::SocketAddr;

use warp::Filter;

pub fn spawn(addr: SocketAddr) -> tokio::task::JoinHandle<()> {
    let route = warp::path("metrics").map(|| {
        warp::reply::with_header(
            midonet_telemetry::render_prometheus(),
            "content-type",
            "text/plain; version=0.0.4; charset=utf-8",
        )
    });

    tokio::spawn(async move {
        tracing::info!(%addr, "serving /metrics");
        warp::serve(route).run(addr).await;
    })
}
