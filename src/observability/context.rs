//! Ambient log context.
//!
//! Every event emitted inside the host span carries the host instance id,
//! the hosting environment and the application name.

use tracing::field::Empty;
use tracing::Span;
use uuid::Uuid;

/// Root span for one host run. `environment` is recorded once known.
pub fn host_span(host_id: Uuid, application: &str) -> Span {
    tracing::info_span!(
        "host",
        host_id = %host_id,
        application = %application,
        environment = Empty,
    )
}

/// Record the resolved environment name on the current host span.
pub fn record_environment(span: &Span, environment: &str) {
    span.record("environment", tracing::field::display(environment));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_events_inside_host_span_carry_context() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();

        let host_id = Uuid::new_v4();
        tracing::subscriber::with_default(subscriber, || {
            let span = host_span(host_id, "silo-host");
            let _entered = span.enter();
            record_environment(&span, "Staging");
            tracing::info!("Application started");
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Application started"));
        assert!(output.contains(&host_id.to_string()));
        assert!(output.contains("environment=Staging"));
        assert!(output.contains("application=silo-host"));
    }
}
