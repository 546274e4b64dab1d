use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts, Registry};
use std::collections::HashSet;
use std::sync::Mutex;

/// Cap on distinct `errorCode` label values we'll track. Past this, further
/// codes are folded into a single `overflow` bucket so a caller can't blow up
/// cardinality by feeding us attacker-controlled codes.
const MAX_ERROR_CODES: usize = 40;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static ERROR_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("gateway_http_errors_total", "Count of HTTP error responses emitted, by errorCode"),
        &["error_code"],
    )
    .expect("valid error counter opts");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register gateway_http_errors_total");
    counter
});

static SEEN_CODES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

pub fn registry() -> &'static Registry {
    &REGISTRY
}

pub fn record_error_code(code: &str) {
    let label = {
        let mut seen = SEEN_CODES.lock().expect("error-code set poisoned");
        if seen.contains(code) {
            code.to_string()
        } else if seen.len() < MAX_ERROR_CODES {
            seen.insert(code.to_string());
            code.to_string()
        } else {
            "overflow".to_string()
        }
    };
    ERROR_COUNTER.with_label_values(&[&label]).inc();
}
