//! `tracing` integration
//!
//! [`PublishLayer`] turns `tracing` events into [`LogRecord`]s and hands
//! them to a [`Distributor`] without waiting. Events emitted by logcast
//! itself are skipped, otherwise every dropped subscriber would produce a
//! warning that is published in turn.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use lc_core::{LogRecord, Severity};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::distributor::Distributor;

/// Target prefix of logcast's own crates
const INTERNAL_TARGET_PREFIX: &str = "lc_";

/// Layer publishing every event through a distributor
pub struct PublishLayer {
    distributor: Arc<Distributor>,
    facility: Option<String>,
}

impl PublishLayer {
    /// Publish through `distributor`
    pub fn new(distributor: Arc<Distributor>) -> Self {
        Self {
            distributor,
            facility: None,
        }
    }

    /// Stamp records with `facility` instead of the program name
    pub fn with_facility(mut self, facility: impl Into<String>) -> Self {
        self.facility = Some(facility.into());
        self
    }

    fn record(&self, event: &Event<'_>) -> LogRecord {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord::new(Severity::from(metadata.level()), visitor.finish()).with_source(
            metadata.file().unwrap_or_default(),
            metadata.module_path().unwrap_or_else(|| metadata.target()),
            metadata.line().unwrap_or_default(),
        );

        match &self.facility {
            Some(facility) => record.with_facility(facility.as_str()),
            None => record,
        }
    }
}

impl<S: Subscriber> Layer<S> for PublishLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target().starts_with(INTERNAL_TARGET_PREFIX) {
            return;
        }

        // Not ready or saturated: the record is dropped, as with any
        // unsubscribed producer
        let _ = self.distributor.try_publish(&self.record(event));
    }
}

/// Collects the `message` field followed by `key=value` pairs
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&self.fields);
        }
        self.message
    }

    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field, format_args!("{:?}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field, format_args!("{:?}", value));
        }
    }
}
