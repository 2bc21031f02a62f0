use crate::generators::generator::{ExtractionError, Feature, Generator, GeneratorParams};
use crate::generators::loader::{string_arg, LoaderError};
use crate::models::{Event, ExtractionMode, FeatureValue};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Seconds between the first start event and the last end event
pub struct Timespan {
    params: GeneratorParams,
    start_event: String,
    end_event: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl Timespan {
    pub fn new(mut params: GeneratorParams, args: &Map<String, Value>) -> Result<Self, LoaderError> {
        if let Some(index) = params.count_index.filter(|i| *i != 0) {
            log::warn!(
                "⚠️  Timespan {} got non-zero count index {}",
                params.instance_name,
                index
            );
        }
        if params.count_index.is_some() {
            params.count_index = Some(0);
        }
        Ok(Self {
            start_event: string_arg("Timespan", args, "start_event", &[])?,
            end_event: string_arg("Timespan", args, "end_event", &[])?,
            params,
            start_time: None,
            end_time: None,
        })
    }
}

impl Generator for Timespan {
    fn params(&self) -> &GeneratorParams {
        &self.params
    }

    fn event_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
        vec![self.start_event.clone(), self.end_event.clone()]
    }

    fn update_from_event(&mut self, event: &Event) -> Result<(), ExtractionError> {
        if event.event_name == self.start_event {
            match self.start_time {
                Some(start) => log::warn!(
                    "⚠️  {} received a second {} event, {}s after the first",
                    self.params.instance_name,
                    self.start_event,
                    (event.timestamp - start).num_seconds()
                ),
                None => self.start_time = Some(event.timestamp),
            }
        } else if event.event_name == self.end_event {
            if self.start_time.is_none() {
                log::warn!(
                    "⚠️  {} received {} before any {} event",
                    self.params.instance_name,
                    self.end_event,
                    self.start_event
                );
                return Ok(());
            }
            if let Some(end) = self.end_time {
                log::warn!(
                    "⚠️  {} received a second {} event, {}s after the first; using the later one",
                    self.params.instance_name,
                    self.end_event,
                    (event.timestamp - end).num_seconds()
                );
            }
            self.end_time = Some(event.timestamp);
        }
        Ok(())
    }
}

impl Feature for Timespan {
    fn values(&self) -> Vec<FeatureValue> {
        let seconds = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };
        vec![FeatureValue::Float(seconds)]
    }
}
