use payment_guard::config::ApplicationSettings;
use payment_guard::observability::{
    init_metrics, mask_id, mask_sensitive, AggregatedHealth, DependencyHealth, EventSubject, HealthStatus,
    LatencyTimer, LogConfig, LogFormat, PipelineEvent,
};

#[test]
fn test_log_config_follows_application_settings() {
    let settings = ApplicationSettings {
        port: 8080,
        log_level: "debug".to_string(),
        log_format: "JSON".to_string(),
    };

    let config = LogConfig::from_settings(&settings);

    assert_eq!(config.level, "debug");
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.include_target);
}

#[test]
fn test_unknown_log_format_falls_back_to_pretty() {
    assert_eq!(LogFormat::from("compact"), LogFormat::Compact);
    assert_eq!(LogFormat::from("yaml"), LogFormat::Pretty);
}

#[test]
fn test_identifiers_are_masked_in_logs() {
    let masked = mask_id("5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYVCJjBRah");
    assert!(masked.starts_with("5VER"));
    assert!(masked.ends_with("BRah"));
    assert!(masked.contains("****"));
    assert_eq!(mask_sensitive("abc", 4), "***");
}

#[test]
fn test_pipeline_events_reach_prometheus() {
    let handle = tokio_test::assert_ok!(init_metrics());

    PipelineEvent::new("in_flight_registry", EventSubject::IdempotencyKey("idem_abc"), "miss").emit();
    PipelineEvent::new("retry_machine", EventSubject::IdempotencyKey("idem_abc"), "confirmed")
        .with_attempt(2)
        .with_elapsed(std::time::Duration::from_millis(40))
        .emit();

    let rendered = handle.render();
    assert!(rendered.contains("payment_guard_pipeline_events_total"));
    assert!(rendered.contains("component=\"retry_machine\""));

    let again = tokio_test::assert_ok!(init_metrics());
    assert!(again.render().contains("payment_guard_pipeline_events_total"));
}

#[test]
fn test_event_subject_kinds() {
    assert_eq!(EventSubject::Signature("sig").kind(), "signature");
    assert_eq!(EventSubject::ContentHash("abc").value(), "abc");
}

#[test]
fn test_health_aggregation_prefers_worst_status() {
    let health = AggregatedHealth::new(
        "0.1.0".to_string(),
        12,
        vec![
            DependencyHealth::healthy("postgres", 1.5),
            DependencyHealth::degraded("redis", "slow ping"),
        ],
    );
    assert_eq!(health.status, HealthStatus::Degraded);

    let down = AggregatedHealth::new(
        "0.1.0".to_string(),
        12,
        vec![
            DependencyHealth::degraded("postgres", "slow"),
            DependencyHealth::unhealthy("redis", "connection refused"),
        ],
    );
    assert!(down.status.is_unhealthy());
}

#[test]
fn test_latency_timer_is_monotonic() {
    let timer = LatencyTimer::new();
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(timer.elapsed_ms() >= 5.0);
}
