use std::sync::{Arc, Mutex};

use keiba_common::config::DbConfig;
use keiba_connectors::QueryParams;
use keiba_error::ErrorCode;
use keiba_runtime::{PostgresExecutor, QueryExecutor};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Records the level and formatted message of every event.
#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

#[test]
fn test_failed_query_logs_error_then_query() {
    let capture = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let executor = PostgresExecutor::new(DbConfig::new("127.0.0.1", "nope", "d", "u", "p"));

    let result = tracing::subscriber::with_default(subscriber, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(executor.execute("SELECT 1", &QueryParams::new()))
    });
    assert_eq!(result.unwrap_err().code, ErrorCode::InvalidPort);

    let events = capture.events.lock().unwrap();
    let errors: Vec<&String> = events
        .iter()
        .filter(|(level, _)| *level == Level::ERROR)
        .map(|(_, message)| message)
        .collect();

    assert_eq!(errors.len(), 2, "error events: {:?}", errors);
    assert!(errors[0].starts_with("Database error: "));
    assert!(errors[0].contains("KEIBA-3001"));
    assert!(errors[0].contains("Invalid database port"));
    assert_eq!(errors[1], "Query: SELECT 1");
}
