use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

/// Wall-clock timer for one named phase of the model or request lifecycle.
pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Timer {
    /// Create a timer and start it right away
    pub fn start(name: &str) -> Self {
        info!("{}: starting", name);

        Timer {
            name: name.to_owned(),
            tstamp: Some(Utc::now()),
            duration: None,
        }
    }

    /// Stop the timer, log the phase duration and return it in milliseconds
    pub fn stop(&mut self) -> i64 {
        match self.tstamp.take() {
            None => debug!("{}: not running!", self.name),
            Some(tstamp) => {
                let d = Utc::now() - tstamp;

                self.duration = Some(d);
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
            }
        }

        self.millis()
    }

    /// Duration of the last completed run in milliseconds
    pub fn millis(&self) -> i64 {
        self.duration.map_or(0, |d| d.num_milliseconds())
    }
}
