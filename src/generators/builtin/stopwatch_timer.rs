use crate::generators::generator::{ExtractionError, Feature, Generator, GeneratorParams, ALL_EVENTS};
use crate::generators::loader::{string_arg, string_list_arg, LoaderError};
use crate::models::{Event, EventSource, ExtractionMode, FeatureValue};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

/// Virtual stopwatch running between start and end events
///
/// Time accumulates between consecutive GAME events while running. Ignore
/// events break the chain without stopping; reset events also stop it.
pub struct StopwatchTimer {
    params: GeneratorParams,
    start_event: String,
    end_event: String,
    ignore_events: Vec<String>,
    reset_events: Vec<String>,
    previous_time: Option<DateTime<Utc>>,
    total_time: Duration,
    counting: bool,
}

impl StopwatchTimer {
    pub fn new(params: GeneratorParams, args: &Map<String, Value>) -> Result<Self, LoaderError> {
        Ok(Self {
            params,
            start_event: string_arg("StopwatchTimer", args, "start_event", &[])?,
            end_event: string_arg("StopwatchTimer", args, "end_event", &[])?,
            ignore_events: string_list_arg("StopwatchTimer", args, "ignore_events")?,
            reset_events: string_list_arg("StopwatchTimer", args, "reset_events")?,
            previous_time: None,
            total_time: Duration::zero(),
            counting: false,
        })
    }
}

/// `H:MM:SS` with a microsecond fraction when non-zero
fn format_duration(duration: Duration) -> String {
    let micros = duration.num_microseconds().unwrap_or(i64::MAX);
    let sign = if micros < 0 { "-" } else { "" };
    let micros = micros.unsigned_abs();
    let secs = micros / 1_000_000;
    let frac = micros % 1_000_000;
    let base = format!("{}{}:{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60, secs % 60);
    if frac == 0 {
        base
    } else {
        format!("{}.{:06}", base, frac)
    }
}

impl Generator for StopwatchTimer {
    fn params(&self) -> &GeneratorParams {
        &self.params
    }

    fn event_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
        vec![ALL_EVENTS.to_string()]
    }

    fn min_version(&self) -> Option<&str> {
        Some("1")
    }

    fn update_from_event(&mut self, event: &Event) -> Result<(), ExtractionError> {
        if event.event_source == EventSource::Game {
            if self.reset_events.contains(&event.event_name) {
                self.previous_time = None;
                self.counting = false;
            } else if self.ignore_events.contains(&event.event_name) {
                self.previous_time = None;
            }

            if let (true, Some(previous)) = (self.counting, self.previous_time) {
                self.total_time = self.total_time + (event.timestamp - previous);
            }
            self.previous_time = Some(event.timestamp);
        }

        if event.event_name == self.start_event {
            self.counting = true;
        } else if event.event_name == self.end_event {
            self.counting = false;
        }
        Ok(())
    }
}

impl Feature for StopwatchTimer {
    fn values(&self) -> Vec<FeatureValue> {
        vec![
            FeatureValue::Text(format_duration(self.total_time)),
            FeatureValue::Float(self.total_time.num_milliseconds() as f64 / 1000.0),
        ]
    }

    fn subfeatures(&self) -> Vec<String> {
        vec!["Seconds".to_string()]
    }
}
