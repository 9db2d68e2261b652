//! Prometheus metrics for the crawl pipeline
//!
//! Counters and histograms for crawl outcomes, fetch phases, frontier
//! traffic, politeness subsystems, and index submissions. `render()`
//! produces the text exposition format for scraping or dumping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec,
    TextEncoder,
};

lazy_static! {
    // Crawl outcomes
    pub static ref PAGES_CRAWLED: CounterVec =
        register_counter_vec!(
            "trawler_pages_crawled_total",
            "Crawl handler outcomes",
            &["outcome"]
        ).unwrap();

    // Fetcher
    pub static ref FETCH_DURATION: HistogramVec =
        register_histogram_vec!(
            "trawler_fetch_duration_seconds",
            "Page fetch duration by phase",
            &["phase"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        ).unwrap();

    pub static ref FETCH_FALLBACKS: Counter =
        register_counter!(
            "trawler_fetch_rendered_fallbacks_total",
            "Fetches that fell back to the rendered phase"
        ).unwrap();

    // Frontier
    pub static ref FRONTIER_ENQUEUED: CounterVec =
        register_counter_vec!(
            "trawler_frontier_enqueued_total",
            "Frontier enqueue results",
            &["result"]
        ).unwrap();

    pub static ref FRONTIER_CLAIMED: Counter =
        register_counter!(
            "trawler_frontier_claimed_total",
            "URL records claimed from the frontier"
        ).unwrap();

    pub static ref FRONTIER_RESCHEDULED: Counter =
        register_counter!(
            "trawler_frontier_rescheduled_total",
            "Failed records moved back to pending"
        ).unwrap();

    // Politeness
    pub static ref ROBOTS_LOOKUPS: CounterVec =
        register_counter_vec!(
            "trawler_robots_lookups_total",
            "Robots policy lookups by resolution tier",
            &["tier"]
        ).unwrap();

    pub static ref RATE_LIMIT_WAIT: Histogram =
        register_histogram!(
            "trawler_rate_limit_wait_seconds",
            "Time slept to honor per-host spacing",
            vec![0.0, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
        ).unwrap();

    // Index sink
    pub static ref DOCUMENTS_INDEXED: Counter =
        register_counter!(
            "trawler_documents_indexed_total",
            "Documents submitted to the search index"
        ).unwrap();

    // Worker state
    pub static ref ACTIVE_HANDLERS: Gauge =
        register_gauge!(
            "trawler_active_handlers",
            "Crawl handlers currently processing a URL"
        ).unwrap();
}

/// Record a crawl handler outcome (indexed, skipped, failed)
pub fn record_page_outcome(outcome: &str) {
    PAGES_CRAWLED.with_label_values(&[outcome]).inc();
}

/// Observe a fetch duration for the given phase (http, rendered)
pub fn observe_fetch(phase: &str, seconds: f64) {
    FETCH_DURATION.with_label_values(&[phase]).observe(seconds);
}

/// Record an enqueue result (added, duplicate)
pub fn record_enqueue(result: &str) {
    FRONTIER_ENQUEUED.with_label_values(&[result]).inc();
}

/// Record a robots lookup resolution (memory, store, fetch, permissive)
pub fn record_robots_lookup(tier: &str) {
    ROBOTS_LOOKUPS.with_label_values(&[tier]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = PAGES_CRAWLED.with_label_values(&["indexed"]).get();
        record_page_outcome("indexed");
        let after = PAGES_CRAWLED.with_label_values(&["indexed"]).get();
        assert!((after - before - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        record_enqueue("added");
        observe_fetch("http", 0.2);
        let text = render();
        assert!(text.contains("trawler_frontier_enqueued_total"));
        assert!(text.contains("trawler_fetch_duration_seconds"));
    }
}
