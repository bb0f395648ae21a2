use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, TextEncoder};
use std::sync::OnceLock;

static RELAYED_STANDARD: OnceLock<IntCounter> = OnceLock::new();
static RELAYED_PRIVATE: OnceLock<IntCounter> = OnceLock::new();
static RELAY_REJECTED: OnceLock<IntCounter> = OnceLock::new();
static RELAY_FAILED: OnceLock<IntCounter> = OnceLock::new();

static RPC_REQUESTS: OnceLock<IntCounter> = OnceLock::new();
static RPC_ERRORS: OnceLock<IntCounter> = OnceLock::new();

static TX_MINED: OnceLock<IntCounter> = OnceLock::new();
static TX_FAILED: OnceLock<IntCounter> = OnceLock::new();
static TX_DROPPED: OnceLock<IntCounter> = OnceLock::new();

static EPOCHS_BUILT: OnceLock<IntCounter> = OnceLock::new();
static CLAIMS_WRITTEN: OnceLock<IntCounter> = OnceLock::new();

static STORE_UP: OnceLock<IntGauge> = OnceLock::new();

fn relayed_standard() -> &'static IntCounter {
    RELAYED_STANDARD.get_or_init(|| {
        IntCounter::new(
            "relay_submissions_total",
            "Transactions relayed via the public node",
        )
        .unwrap()
    })
}

fn relayed_private() -> &'static IntCounter {
    RELAYED_PRIVATE.get_or_init(|| {
        IntCounter::new(
            "relay_private_submissions_total",
            "Transactions relayed via the private relay fallback",
        )
        .unwrap()
    })
}

fn relay_rejected() -> &'static IntCounter {
    RELAY_REJECTED.get_or_init(|| {
        IntCounter::new(
            "relay_rejected_total",
            "Submissions rejected as invalid payloads",
        )
        .unwrap()
    })
}

fn relay_failed() -> &'static IntCounter {
    RELAY_FAILED.get_or_init(|| {
        IntCounter::new(
            "relay_failed_total",
            "Submissions that failed on every relay path",
        )
        .unwrap()
    })
}

fn rpc_requests() -> &'static IntCounter {
    RPC_REQUESTS
        .get_or_init(|| IntCounter::new("rpc_requests_total", "Total RPC requests to node").unwrap())
}

fn rpc_errors() -> &'static IntCounter {
    RPC_ERRORS.get_or_init(|| IntCounter::new("rpc_errors_total", "Total RPC errors").unwrap())
}

fn tx_mined() -> &'static IntCounter {
    TX_MINED.get_or_init(|| {
        IntCounter::new("reconciled_mined_total", "Transactions reconciled as mined").unwrap()
    })
}

fn tx_failed() -> &'static IntCounter {
    TX_FAILED.get_or_init(|| {
        IntCounter::new("reconciled_failed_total", "Transactions reconciled as failed").unwrap()
    })
}

fn tx_dropped() -> &'static IntCounter {
    TX_DROPPED.get_or_init(|| {
        IntCounter::new(
            "reconciled_dropped_total",
            "Transactions classified likely_dropped",
        )
        .unwrap()
    })
}

fn epochs_built() -> &'static IntCounter {
    EPOCHS_BUILT
        .get_or_init(|| IntCounter::new("reward_epochs_total", "Reward epochs created").unwrap())
}

fn claims_written() -> &'static IntCounter {
    CLAIMS_WRITTEN
        .get_or_init(|| IntCounter::new("reward_claims_total", "Claim rows written").unwrap())
}

fn store_up() -> &'static IntGauge {
    STORE_UP.get_or_init(|| IntGauge::new("store_up", "Ledger store reachable (1/0)").unwrap())
}

pub fn inc_relayed_standard() {
    relayed_standard().inc();
}

pub fn inc_relayed_private() {
    relayed_private().inc();
}

pub fn inc_relay_rejected() {
    relay_rejected().inc();
}

pub fn inc_relay_failed() {
    relay_failed().inc();
}

pub fn inc_rpc_requests() {
    rpc_requests().inc();
}

pub fn inc_rpc_errors() {
    rpc_errors().inc();
}

pub fn inc_tx_mined() {
    tx_mined().inc();
}

pub fn inc_tx_failed() {
    tx_failed().inc();
}

pub fn inc_tx_dropped() {
    tx_dropped().inc();
}

pub fn inc_epochs_built() {
    epochs_built().inc();
}

pub fn inc_claims_written_by(n: u64) {
    claims_written().inc_by(n);
}

pub fn set_store_up(up: bool) {
    store_up().set(if up { 1 } else { 0 });
}

pub fn render() -> String {
    let enc = TextEncoder::new();
    let mut mfs = Vec::new();

    mfs.extend(relayed_standard().collect());
    mfs.extend(relayed_private().collect());
    mfs.extend(relay_rejected().collect());
    mfs.extend(relay_failed().collect());
    mfs.extend(rpc_requests().collect());
    mfs.extend(rpc_errors().collect());
    mfs.extend(tx_mined().collect());
    mfs.extend(tx_failed().collect());
    mfs.extend(tx_dropped().collect());
    mfs.extend(epochs_built().collect());
    mfs.extend(claims_written().collect());
    mfs.extend(store_up().collect());

    let mut buf = Vec::new();
    if enc.encode(&mfs, &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        inc_relayed_standard();
        inc_epochs_built();
        let out = render();
        assert!(out.contains("relay_submissions_total"));
        assert!(out.contains("reward_epochs_total"));
    }
}
