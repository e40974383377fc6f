//! Optional per-query diagnostics built from the server's tracing tables.

use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::session::CqlSession;

/// One event recorded by a node while serving a traced query.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub activity: Option<String>,
    pub source: Option<IpAddr>,
    pub source_elapsed_micros: Option<i32>,
    pub thread: Option<String>,
}

/// The collected trace of one statement execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTrace {
    pub coordinator: Option<IpAddr>,
    pub duration_micros: Option<i32>,
    pub request: Option<String>,
    pub events: Vec<TraceEvent>,
}

impl QueryTrace {
    /// Events ordered by source host, ascending. The sort is stable so each
    /// host's events keep their server-side ordering.
    pub fn sorted_events(&self) -> Vec<&TraceEvent> {
        let mut events: Vec<&TraceEvent> = self.events.iter().collect();
        events.sort_by(|a, b| a.source.cmp(&b.source));
        events
    }
}

/// Fetches and formats execution traces. Trace retrieval failures are never
/// fatal: the report degrades to a single explanatory line and the execution
/// result is unaffected.
pub struct QueryTracer {
    session: Arc<dyn CqlSession>,
}

impl QueryTracer {
    pub fn new(session: Arc<dyn CqlSession>) -> Self {
        Self { session }
    }

    pub async fn report(&self, query: &str, tracing_id: Uuid) -> String {
        match self.session.fetch_trace(tracing_id).await {
            Ok(trace) => format_report(query, tracing_id, &trace),
            Err(err) => format!(
                "Trace {} for [{}] could not be retrieved: {}",
                tracing_id, query, err
            ),
        }
    }

    pub async fn log_report(&self, query: &str, tracing_id: Uuid) {
        let report = self.report(query, tracing_id).await;
        debug!("{}", report);
    }
}

fn format_report(query: &str, tracing_id: Uuid, trace: &QueryTrace) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Trace {} for [{}] captured at {}",
        tracing_id,
        query,
        Utc::now().to_rfc3339()
    ));
    if let Some(coordinator) = trace.coordinator {
        lines.push(format!("  coordinator: {}", coordinator));
    }
    if let Some(duration) = trace.duration_micros {
        lines.push(format!("  duration: {} us", duration));
    }
    if let Some(request) = &trace.request {
        lines.push(format!("  request: {}", request));
    }
    for event in trace.sorted_events() {
        lines.push(format!(
            "  {} | {} | {} us | {}",
            event.activity.as_deref().unwrap_or("-"),
            event
                .source
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "-".to_string()),
            event
                .source_elapsed_micros
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string()),
            event.thread.as_deref().unwrap_or("-"),
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(activity: &str, source: Option<IpAddr>) -> TraceEvent {
        TraceEvent {
            activity: Some(activity.to_string()),
            source,
            source_elapsed_micros: Some(10),
            thread: None,
        }
    }

    #[test]
    fn test_events_sorted_by_source_ascending() {
        let high: IpAddr = "10.0.0.9".parse().unwrap();
        let low: IpAddr = "10.0.0.1".parse().unwrap();
        let trace = QueryTrace {
            coordinator: Some(low),
            duration_micros: Some(420),
            request: None,
            events: vec![
                event("merge", Some(high)),
                event("parse", Some(low)),
                event("execute", Some(low)),
            ],
        };
        let sorted = trace.sorted_events();
        assert_eq!(sorted[0].source, Some(low));
        assert_eq!(sorted[1].source, Some(low));
        // Stable: same-source events keep their original order.
        assert_eq!(sorted[0].activity.as_deref(), Some("parse"));
        assert_eq!(sorted[1].activity.as_deref(), Some("execute"));
        assert_eq!(sorted[2].source, Some(high));
    }

    #[test]
    fn test_report_lists_every_event() {
        let source: IpAddr = "10.0.0.1".parse().unwrap();
        let trace = QueryTrace {
            coordinator: Some(source),
            duration_micros: Some(99),
            request: Some("Execute CQL3 query".to_string()),
            events: vec![event("parse", Some(source)), event("execute", Some(source))],
        };
        let report = format_report("SELECT now() FROM system.local", Uuid::nil(), &trace);
        assert!(report.contains("coordinator: 10.0.0.1"));
        assert!(report.contains("duration: 99 us"));
        assert!(report.contains("parse"));
        assert!(report.contains("execute"));
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_one_line() {
        let session = crate::test_support::RecordingSession::failing_traces();
        let tracer = QueryTracer::new(session);
        let report = tracer.report("SELECT * FROM ks.t", Uuid::nil()).await;
        assert!(report.contains("could not be retrieved"));
        assert_eq!(report.lines().count(), 1);
    }
}
