#![forbid(unsafe_code)]

//! Prometheus counters and histograms for the simulation coordinator's hot
//! path (§4.5 "additionally records Prometheus counters/histograms").
//!
//! OTLP export is dropped here: the reference workspace carries it for
//! distributed trace correlation across a mix network, which this system
//! has no analogue of. A single Prometheus text endpoint, served by
//! `midonet-daemon`, is all the coordinator's metrics need.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static SIMULATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("midonet_simulations_total", "simulations completed").expect("counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static DROPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("midonet_drops_total", "simulations ending in a drop, by reason"),
        &["reason"],
    )
    .expect("counter vec");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static FORKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("midonet_forks_total", "Fork actions interpreted").expect("counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static DEVICES_TRAVERSED: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(
        HistogramOpts::new(
            "midonet_devices_traversed",
            "devices traversed by a single simulation",
        )
        .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
    )
    .expect("histogram");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

/// A drop's reason, as surfaced to metrics. Distinct from
/// [`midonet_core::action::DropKind`]: this also covers the drops the
/// coordinator itself produces before any device runs (illegal start,
/// incompatible fork merge) which have no `DropKind` of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Temporary,
    Permanent,
    Error,
    IllegalStart,
    IncompatibleFork,
}

impl DropReason {
    fn label(self) -> &'static str {
        match self {
            DropReason::Temporary => "temporary",
            DropReason::Permanent => "permanent",
            DropReason::Error => "error",
            DropReason::IllegalStart => "illegal_start",
            DropReason::IncompatibleFork => "incompatible_fork",
        }
    }
}

/// Records one finished simulation. Called once per [`simulate`] invocation
/// regardless of outcome (`midonet-sim::coordinator`).
///
/// [`simulate`]: https://docs.rs/midonet-sim
pub fn record_simulation(devices_traversed: u32, forks: u32, drop_reason: Option<DropReason>) {
    SIMULATIONS_TOTAL.inc();
    DEVICES_TRAVERSED.observe(devices_traversed as f64);
    if forks > 0 {
        FORKS_TOTAL.inc_by(forks as u64);
    }
    if let Some(reason) = drop_reason {
        DROPS_TOTAL.with_label_values(&[reason.label()]).inc();
    }
}

/// Renders the registry in Prometheus text exposition format, served by
/// `midonet-daemon`'s `/metrics` endpoint.
pub fn render_prometheus() -> String {
    let mf = REGISTRY.gather();
    let enc = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = enc.encode(&mf, &mut buf) {
        tracing::warn!(%err, "failed to encode prometheus metrics");
    }
    String::from_utf8(buf).unwrap_or_default()
}
