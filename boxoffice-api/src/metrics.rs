use boxoffice_core::{Booking, ReservationError};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

pub struct Metrics {
    registry: Registry,
    outcomes: IntCounterVec,
    duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let outcomes = IntCounterVec::new(
            Opts::new("boxoffice_reservation_outcomes_total", "Reservation attempts by outcome"),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "boxoffice_reservation_duration_seconds",
                "Time from request to outcome, lock wait included",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]),
        )?;

        registry.register(Box::new(outcomes.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            outcomes,
            duration,
        })
    }

    pub fn observe(&self, outcome: &Result<Booking, ReservationError>, elapsed: Duration) {
        let label = match outcome {
            Ok(_) => "succeeded",
            Err(e) => e.kind(),
        };
        self.outcomes.with_label_values(&[label]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
