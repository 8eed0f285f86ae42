//! Per-operation metrics recording.
//!
//! # Lifecycle
//! ```text
//! start_operation()          in-flight +1, start instant captured
//!     → add_operation()      name / type / hash on attributes and span
//!     → add_client_info()    client name / version
//!     → add_operation_context()
//!     → finish()             in-flight -1, count, size, latency,
//!                            response size, schema usage export
//! ```
//! Calls after `finish` do nothing. Dropping an unfinished recorder finishes
//! it with unknown status and size.

use std::sync::Arc;
use std::time::Instant;

use tracing::Span;

use crate::analytics::exporter::UsageSink;
use crate::analytics::schema_usage::{Attributes, SchemaUsageInfo, HTTP_STATUS_CODE_ATTRIBUTE};
use crate::gateway::context::ClientInfo;
use crate::gateway::operation::{OperationContext, OperationProtocol, ParsedOperation};
use crate::observability::metrics::{InFlightGuard, KeyValue, MetricsBackend};
use crate::observability::tracing::span_name;

pub const WG_OPERATION_NAME: &str = "wg.operation.name";
pub const WG_OPERATION_TYPE: &str = "wg.operation.type";
pub const WG_OPERATION_HASH: &str = "wg.operation.hash";
pub const WG_CLIENT_NAME: &str = "wg.client.name";
pub const WG_CLIENT_VERSION: &str = "wg.client.version";
pub const HTTP_STATUS_CODE: &str = "http.status_code";

/// Sentinel recorded when a status code or size is unknown.
pub const UNKNOWN: i64 = -1;

/// Accumulates telemetry for one client operation.
pub trait OperationRecorder: Send {
    fn add_operation(&mut self, operation: &ParsedOperation, protocol: OperationProtocol);

    fn add_operation_context(&mut self, operation: Arc<OperationContext>);

    fn add_client_info(&mut self, info: &ClientInfo);

    /// Emit measurements. `None` is recorded as `-1`.
    fn finish(&mut self, status: Option<u16>, response_size: Option<u64>);
}

/// Recorder used when telemetry is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl OperationRecorder for NoopRecorder {
    fn add_operation(&mut self, _: &ParsedOperation, _: OperationProtocol) {}
    fn add_operation_context(&mut self, _: Arc<OperationContext>) {}
    fn add_client_info(&mut self, _: &ClientInfo) {}
    fn finish(&mut self, _: Option<u16>, _: Option<u64>) {}
}

pub struct OperationMetrics {
    backend: Arc<dyn MetricsBackend>,
    exporter: Option<Arc<dyn UsageSink>>,
    router_config_version: String,
    request_content_length: i64,
    started: Instant,
    attributes: Vec<KeyValue>,
    operation: Option<Arc<OperationContext>>,
    span: Span,
    in_flight: Option<InFlightGuard>,
    finished: bool,
}

impl OperationMetrics {
    pub fn start(
        backend: Arc<dyn MetricsBackend>,
        exporter: Option<Arc<dyn UsageSink>>,
        router_config_version: impl Into<String>,
        request_content_length: i64,
        span: Span,
    ) -> Self {
        let in_flight = backend.measure_in_flight(&[]);
        Self {
            backend,
            exporter,
            router_config_version: router_config_version.into(),
            request_content_length,
            started: Instant::now(),
            attributes: Vec::new(),
            operation: None,
            span,
            in_flight: Some(in_flight),
            finished: false,
        }
    }

    /// Attributes attached to every measurement so far.
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn export_schema_usage(&self, operation: &OperationContext, status: i64) {
        let Some(exporter) = &self.exporter else {
            return;
        };
        let mut attributes = Attributes::new();
        attributes.insert(HTTP_STATUS_CODE_ATTRIBUTE.to_string(), status.to_string());

        exporter.record(SchemaUsageInfo::from_operation(
            operation,
            &self.router_config_version,
            attributes,
        ));
    }
}

impl OperationRecorder for OperationMetrics {
    fn add_operation(&mut self, operation: &ParsedOperation, protocol: OperationProtocol) {
        if self.finished {
            return;
        }
        if !operation.name.is_empty() {
            self.attributes
                .push(KeyValue::new(WG_OPERATION_NAME, operation.name.clone()));
        }
        self.attributes
            .push(KeyValue::new(WG_OPERATION_TYPE, operation.op_type.as_str()));

        let hash = operation.id.to_string();
        self.span
            .record("otel.name", span_name(protocol, &operation.name).as_str());
        self.span.record(WG_OPERATION_NAME, operation.name.as_str());
        self.span.record(WG_OPERATION_TYPE, operation.op_type.as_str());
        self.span.record("wg.operation.content", operation.query.as_str());
        self.span.record("wg.operation.protocol", protocol.as_str());
        self.span.record(WG_OPERATION_HASH, hash.as_str());

        self.attributes.push(KeyValue::new(WG_OPERATION_HASH, hash));
    }

    fn add_operation_context(&mut self, operation: Arc<OperationContext>) {
        if self.finished {
            return;
        }
        self.operation = Some(operation);
    }

    fn add_client_info(&mut self, info: &ClientInfo) {
        if self.finished {
            return;
        }
        self.span.record(WG_CLIENT_NAME, info.name.as_str());
        self.span.record(WG_CLIENT_VERSION, info.version.as_str());

        self.attributes.push(KeyValue::new(WG_CLIENT_NAME, info.name.clone()));
        self.attributes
            .push(KeyValue::new(WG_CLIENT_VERSION, info.version.clone()));
    }

    fn finish(&mut self, status: Option<u16>, response_size: Option<u64>) {
        if self.finished {
            return;
        }
        self.finished = true;
        drop(self.in_flight.take());

        let status = status.map(i64::from).unwrap_or(UNKNOWN);
        let response_size = response_size
            .map(|size| i64::try_from(size).unwrap_or(i64::MAX))
            .unwrap_or(UNKNOWN);

        self.span.record(HTTP_STATUS_CODE, status);
        self.attributes
            .push(KeyValue::new(HTTP_STATUS_CODE, status.to_string()));

        self.backend.measure_request_count(&self.attributes);
        self.backend
            .measure_request_size(self.request_content_length, &self.attributes);
        self.backend.measure_latency(self.started, &self.attributes);
        self.backend
            .measure_response_size(response_size, &self.attributes);

        if let Some(operation) = self.operation.clone() {
            self.export_schema_usage(&operation, status);
        }
    }
}

impl Drop for OperationMetrics {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Operation dropped before completion");
            self.finish(None, None);
        }
    }
}

/// Shared factory for operation recorders.
#[derive(Clone)]
pub struct RouterMetrics {
    backend: Arc<dyn MetricsBackend>,
    exporter: Option<Arc<dyn UsageSink>>,
}

impl RouterMetrics {
    pub fn new(backend: Arc<dyn MetricsBackend>, exporter: Option<Arc<dyn UsageSink>>) -> Self {
        Self { backend, exporter }
    }

    pub fn start_operation(
        &self,
        router_config_version: &str,
        request_content_length: i64,
        span: Span,
    ) -> OperationMetrics {
        OperationMetrics::start(
            self.backend.clone(),
            self.exporter.clone(),
            router_config_version,
            request_content_length,
            span,
        )
    }
}

/// Telemetry switch handed to the server.
#[derive(Clone, Default)]
pub enum Telemetry {
    Enabled(RouterMetrics),
    #[default]
    Disabled,
}

impl Telemetry {
    pub fn start_operation(
        &self,
        router_config_version: &str,
        request_content_length: i64,
        span: Span,
    ) -> Box<dyn OperationRecorder> {
        match self {
            Telemetry::Enabled(metrics) => Box::new(metrics.start_operation(
                router_config_version,
                request_content_length,
                span,
            )),
            Telemetry::Disabled => Box::new(NoopRecorder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::operation::{OperationType, PreparedPlan, TypeFieldUsage};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        InFlightStart,
        InFlightEnd,
        Count(Vec<KeyValue>),
        RequestSize(i64),
        Latency,
        ResponseSize(i64),
    }

    #[derive(Default)]
    struct RecordingBackend {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingBackend {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl MetricsBackend for RecordingBackend {
        fn measure_in_flight(&self, _: &[KeyValue]) -> InFlightGuard {
            self.events.lock().unwrap().push(Event::InFlightStart);
            let events = self.events.clone();
            InFlightGuard::new(move || events.lock().unwrap().push(Event::InFlightEnd))
        }

        fn measure_request_count(&self, attributes: &[KeyValue]) {
            self.events.lock().unwrap().push(Event::Count(attributes.to_vec()));
        }

        fn measure_request_size(&self, content_length: i64, _: &[KeyValue]) {
            self.events.lock().unwrap().push(Event::RequestSize(content_length));
        }

        fn measure_latency(&self, _: Instant, _: &[KeyValue]) {
            self.events.lock().unwrap().push(Event::Latency);
        }

        fn measure_response_size(&self, size: i64, _: &[KeyValue]) {
            self.events.lock().unwrap().push(Event::ResponseSize(size));
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<SchemaUsageInfo>>,
    }

    impl UsageSink for RecordingSink {
        fn record(&self, info: SchemaUsageInfo) {
            self.records.lock().unwrap().push(info);
        }
    }

    fn parsed() -> ParsedOperation {
        ParsedOperation {
            id: 42,
            name: "GetUser".into(),
            op_type: OperationType::Query,
            query: "query GetUser { user { id } }".into(),
        }
    }

    fn context() -> Arc<OperationContext> {
        Arc::new(OperationContext {
            operation: parsed(),
            client_info: ClientInfo::default(),
            plan: PreparedPlan {
                fetches: vec![],
                type_fields: vec![
                    TypeFieldUsage {
                        path: vec!["user".into()],
                        type_names: vec!["Query".into()],
                        subgraph_ids: vec!["1".into()],
                    },
                    TypeFieldUsage {
                        path: vec!["user".into(), "id".into()],
                        type_names: vec!["User".into()],
                        subgraph_ids: vec!["1".into()],
                    },
                ],
            },
        })
    }

    #[test]
    fn test_finish_without_status_records_sentinels() {
        let backend = Arc::new(RecordingBackend::default());
        let mut recorder = OperationMetrics::start(backend.clone(), None, "v1", 128, Span::none());

        recorder.finish(None, None);

        let events = backend.events();
        assert_eq!(events[0], Event::InFlightStart);
        assert_eq!(events[1], Event::InFlightEnd);
        assert!(matches!(&events[2], Event::Count(attrs)
            if attrs.contains(&KeyValue::new(HTTP_STATUS_CODE, "-1"))));
        assert_eq!(events[3], Event::RequestSize(128));
        assert_eq!(events[4], Event::Latency);
        assert_eq!(events[5], Event::ResponseSize(-1));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let backend = Arc::new(RecordingBackend::default());
        let mut recorder = OperationMetrics::start(backend.clone(), None, "v1", 0, Span::none());

        recorder.finish(Some(200), Some(10));
        recorder.finish(Some(500), Some(20));
        recorder.add_client_info(&ClientInfo::default());
        drop(recorder);

        let events = backend.events();
        assert_eq!(events.iter().filter(|e| **e == Event::InFlightEnd).count(), 1);
        assert_eq!(events.iter().filter(|e| matches!(e, Event::Count(_))).count(), 1);
        assert!(events.contains(&Event::ResponseSize(10)));
    }

    #[test]
    fn test_attributes_accumulate_in_order() {
        let backend = Arc::new(RecordingBackend::default());
        let mut recorder = OperationMetrics::start(backend.clone(), None, "v1", 0, Span::none());

        recorder.add_operation(&parsed(), OperationProtocol::Http);
        recorder.add_client_info(&ClientInfo {
            name: "web".into(),
            version: "2.0".into(),
        });
        recorder.finish(Some(200), Some(512));

        let keys: Vec<_> = recorder.attributes().iter().map(|kv| kv.key).collect();
        assert_eq!(
            keys,
            vec![
                WG_OPERATION_NAME,
                WG_OPERATION_TYPE,
                WG_OPERATION_HASH,
                WG_CLIENT_NAME,
                WG_CLIENT_VERSION,
                HTTP_STATUS_CODE,
            ]
        );
        assert_eq!(recorder.attributes()[2].value, "42");
    }

    #[test]
    fn test_anonymous_operation_has_no_name_attribute() {
        let backend = Arc::new(RecordingBackend::default());
        let mut recorder = OperationMetrics::start(backend, None, "v1", 0, Span::none());
        let mut operation = parsed();
        operation.name.clear();

        recorder.add_operation(&operation, OperationProtocol::Http);

        assert!(recorder.attributes().iter().all(|kv| kv.key != WG_OPERATION_NAME));
    }

    #[test]
    fn test_finish_exports_schema_usage() {
        let backend = Arc::new(RecordingBackend::default());
        let sink = Arc::new(RecordingSink::default());
        let mut recorder =
            OperationMetrics::start(backend, Some(sink.clone() as Arc<dyn UsageSink>), "config-7", 0, Span::none());

        recorder.add_operation_context(context());
        recorder.finish(Some(200), Some(64));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].schema_info.version, "config-7");
        assert_eq!(records[0].type_field_metrics.len(), 2);
        assert!(records[0].type_field_metrics.iter().all(|f| f.count == 1));
        assert_eq!(records[0].attributes[HTTP_STATUS_CODE_ATTRIBUTE], "200");
    }

    #[test]
    fn test_missing_context_skips_export() {
        let backend = Arc::new(RecordingBackend::default());
        let sink = Arc::new(RecordingSink::default());
        let mut recorder =
            OperationMetrics::start(backend.clone(), Some(sink.clone() as Arc<dyn UsageSink>), "v1", 0, Span::none());

        recorder.finish(Some(400), None);

        assert!(sink.records.lock().unwrap().is_empty());
        assert_eq!(backend.events().len(), 6);
    }

    #[test]
    fn test_drop_finishes_unfinished_recorder() {
        let backend = Arc::new(RecordingBackend::default());
        let sink = Arc::new(RecordingSink::default());
        {
            let mut recorder =
                OperationMetrics::start(backend.clone(), Some(sink.clone() as Arc<dyn UsageSink>), "v1", 0, Span::none());
            recorder.add_operation_context(context());
        }

        let events = backend.events();
        assert!(events.contains(&Event::InFlightEnd));
        assert!(events.contains(&Event::ResponseSize(-1)));
        assert_eq!(sink.records.lock().unwrap()[0].attributes[HTTP_STATUS_CODE_ATTRIBUTE], "-1");
    }

    #[test]
    fn test_noop_recorder() {
        let mut recorder = Telemetry::Disabled.start_operation("v1", 0, Span::none());
        recorder.add_operation(&parsed(), OperationProtocol::GraphQLWs);
        recorder.add_operation_context(context());
        recorder.add_client_info(&ClientInfo::default());
        recorder.finish(None, None);
        recorder.finish(Some(200), Some(1));
    }

    #[test]
    fn test_enabled_telemetry_records() {
        let backend = Arc::new(RecordingBackend::default());
        let telemetry = Telemetry::Enabled(RouterMetrics::new(backend.clone(), None));

        let mut recorder = telemetry.start_operation("v1", 10, Span::none());
        recorder.finish(Some(200), Some(5));

        assert!(backend.events().contains(&Event::RequestSize(10)));
    }
}
