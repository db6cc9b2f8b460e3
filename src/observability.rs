use biometrics::{Collector, Counter};

pub(crate) static PROBES: Counter = Counter::new("palaver.gateway.probes");
pub(crate) static PROBE_FAILURES: Counter = Counter::new("palaver.gateway.probe_failures");
pub(crate) static GATEWAY_REQUESTS: Counter = Counter::new("palaver.gateway.requests");
pub(crate) static GATEWAY_REQUEST_ERRORS: Counter =
    Counter::new("palaver.gateway.request_errors");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("palaver.stream.events");
pub(crate) static STREAM_BYTES: Counter = Counter::new("palaver.stream.bytes");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("palaver.stream.errors");
pub(crate) static STREAM_PARSE_SKIPPED: Counter = Counter::new("palaver.stream.parse_skipped");
pub(crate) static STREAM_ABORTS: Counter = Counter::new("palaver.stream.aborts");

pub(crate) static SESSION_SUBMITS: Counter = Counter::new("palaver.session.submits");
pub(crate) static SESSION_FAILURES: Counter = Counter::new("palaver.session.failures");

pub(crate) static REVEALS_STARTED: Counter = Counter::new("palaver.reveal.started");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&PROBES);
    collector.register_counter(&PROBE_FAILURES);
    collector.register_counter(&GATEWAY_REQUESTS);
    collector.register_counter(&GATEWAY_REQUEST_ERRORS);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_PARSE_SKIPPED);
    collector.register_counter(&STREAM_ABORTS);

    collector.register_counter(&SESSION_SUBMITS);
    collector.register_counter(&SESSION_FAILURES);

    collector.register_counter(&REVEALS_STARTED);
}
