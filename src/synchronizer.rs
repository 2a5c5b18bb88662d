//! Fixed-tick row builder.
//!
//! The synchronizer runs on its own schedule, independent of the workers. Each tick it
//! takes at most one record from every channel queue without waiting and fills the gaps
//! with placeholders, so one stalled instrument never holds up the others. The finished
//! [`SyncRow`] goes to every sink; sink failures are logged and acquisition carries on.

use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::data::RowSink;
use crate::error::DaqError;
use crate::queue::RecordReceiver;
use crate::record::{Record, Schema, SyncRow};
use crate::scheduler::Scheduler;
use crate::stop::StopToken;

struct Lane {
    schema: Arc<Schema>,
    queue: RecordReceiver,
}

/// Builds one [`SyncRow`] per tick from every channel queue and hands it to the sinks.
pub struct Synchronizer {
    interval: Duration,
    lanes: Vec<Lane>,
    sinks: Vec<Box<dyn RowSink>>,
    tick: u64,
    day: Option<NaiveDate>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("interval", &self.interval)
            .field("channels", &self.lanes.len())
            .field("sinks", &self.sinks.len())
            .field("tick", &self.tick)
            .finish()
    }
}

impl Synchronizer {
    /// A synchronizer ticking every `interval`, with no channels or sinks yet.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            lanes: Vec::new(),
            sinks: Vec::new(),
            tick: 0,
            day: None,
        }
    }

    /// Register the next channel. Row order follows registration order.
    pub fn add_channel(&mut self, schema: Arc<Schema>, queue: RecordReceiver) {
        self.lanes.push(Lane { schema, queue });
    }

    /// Deliver every row to `sink` as well.
    pub fn add_sink(&mut self, sink: Box<dyn RowSink>) {
        self.sinks.push(sink);
    }

    /// Number of registered channels.
    pub fn channels(&self) -> usize {
        self.lanes.len()
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Build the row for one tick at `at`, draining one record per channel.
    pub fn build_row(&mut self, at: DateTime<Local>) -> SyncRow {
        let records: Vec<Record> = self
            .lanes
            .iter()
            .map(|lane| {
                lane.queue
                    .try_next()
                    .unwrap_or_else(|| Record::placeholder(&lane.schema, at))
            })
            .collect();
        let row = SyncRow::new(self.tick, at, records);
        self.tick += 1;
        row
    }

    /// Run one tick at `at`: build the row, announce a new day if needed, deliver it.
    pub fn tick_at(&mut self, at: DateTime<Local>) -> SyncRow {
        let row = self.build_row(at);
        for channel in row.missing_channels() {
            debug!(channel = %channel, tick = row.tick(), "No record this tick");
        }

        let today = at.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            for sink in &mut self.sinks {
                if let Err(e) = sink.on_day(today) {
                    warn!(sink = sink.name(), "Sink {} failed on new day: {}", sink.name(), e);
                }
            }
        }

        for sink in &mut self.sinks {
            if let Err(e) = sink.on_row(&row) {
                warn!(sink = sink.name(), tick = row.tick(), "Sink {} failed: {}", sink.name(), e);
            }
        }
        row
    }

    /// Run one tick now.
    pub fn tick(&mut self) -> SyncRow {
        self.tick_at(Local::now())
    }

    /// Tick on schedule until `stop` fires, then close every sink.
    ///
    /// Returns the number of rows produced.
    pub fn run(&mut self, stop: &StopToken) -> Result<u64, DaqError> {
        let mut scheduler = Scheduler::new("synchronizer", self.interval, Instant::now())?;
        info!(channels = self.lanes.len(), "Synchronizer running every {:?}", self.interval);
        loop {
            let plan = scheduler.advance(Instant::now());
            if stop.sleep(plan.sleep) || stop.is_stopped() {
                break;
            }
            self.tick();
        }
        self.close();
        Ok(self.tick)
    }

    fn close(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.close() {
                warn!(sink = sink.name(), "Sink {} failed to close: {}", sink.name(), e);
            }
        }
        info!(rows = self.tick, "Synchronizer stopped");
    }

    /// Run on a dedicated thread named `cpc-sync`.
    pub fn spawn(mut self, stop: StopToken) -> Result<JoinHandle<Result<u64, DaqError>>, DaqError> {
        std::thread::Builder::new()
            .name("cpc-sync".into())
            .spawn(move || self.run(&stop))
            .map_err(DaqError::Spawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::error::SinkError;
    use crate::queue::record_queue;
    use crate::stop::StopSource;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        days: Arc<Mutex<Vec<NaiveDate>>>,
        rows: Arc<Mutex<Vec<SyncRow>>>,
        fail: bool,
        closed: Arc<Mutex<bool>>,
    }

    impl RowSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }
        fn on_day(&mut self, day: NaiveDate) -> Result<(), SinkError> {
            self.days.lock().unwrap().push(day);
            Ok(())
        }
        fn on_row(&mut self, row: &SyncRow) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Disconnected);
            }
            self.rows.lock().unwrap().push(row.clone());
            Ok(())
        }
        fn close(&mut self) -> Result<(), SinkError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn schema(name: &str) -> Arc<Schema> {
        Schema::from_config(&ChannelConfig::new(
            name,
            "MOCK",
            vec!["name".into(), "time".into(), "value".into()],
        ))
    }

    #[test]
    fn test_placeholders_fill_empty_queues() {
        let mut sync = Synchronizer::new(Duration::from_secs(1));
        let (tx_a, rx_a) = record_queue(None);
        let (_tx_b, rx_b) = record_queue(None);
        let a = schema("a");
        sync.add_channel(a.clone(), rx_a);
        sync.add_channel(schema("b"), rx_b);

        tx_a.push(Record::from_tokens(&a, Local::now(), &["5".into()]));
        let row = sync.tick();
        assert_eq!(row.len(), 2);
        assert!(!row.records()[0].is_placeholder());
        assert!(row.records()[1].is_placeholder());
        assert_eq!(row.missing_channels().collect::<Vec<_>>(), vec!["b"]);

        let row = sync.tick();
        assert_eq!(row.missing_channels().count(), 2);
        assert_eq!(row.tick(), 1);
    }

    #[test]
    fn test_one_record_per_channel_per_tick() {
        let mut sync = Synchronizer::new(Duration::from_secs(1));
        let (tx, rx) = record_queue(None);
        let a = schema("a");
        sync.add_channel(a.clone(), rx);
        for v in ["1", "2"] {
            tx.push(Record::from_tokens(&a, Local::now(), &[v.to_string()]));
        }
        assert_eq!(sync.tick().records()[0].get("value").unwrap().to_string(), "1");
        assert_eq!(sync.tick().records()[0].get("value").unwrap().to_string(), "2");
        assert!(sync.tick().records()[0].is_placeholder());
    }

    #[test]
    fn test_day_announced_once_per_date() {
        use chrono::TimeZone;
        let mut sync = Synchronizer::new(Duration::from_secs(1));
        let (_tx, rx) = record_queue(None);
        sync.add_channel(schema("a"), rx);
        let sink = Collect::default();
        let days = sink.days.clone();
        sync.add_sink(Box::new(sink));

        let d1 = Local.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).single().unwrap();
        let d2 = Local.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).single().unwrap();
        sync.tick_at(d1);
        sync.tick_at(d1);
        sync.tick_at(d2);
        assert_eq!(*days.lock().unwrap(), vec![d1.date_naive(), d2.date_naive()]);
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let mut sync = Synchronizer::new(Duration::from_secs(1));
        let (_tx, rx) = record_queue(None);
        sync.add_channel(schema("a"), rx);
        sync.add_sink(Box::new(Collect {
            fail: true,
            ..Collect::default()
        }));
        let good = Collect::default();
        let rows = good.rows.clone();
        sync.add_sink(Box::new(good));

        sync.tick();
        sync.tick();
        assert_eq!(rows.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_run_stops_and_closes_sinks() {
        let mut sync = Synchronizer::new(Duration::from_millis(10));
        let (_tx, rx) = record_queue(None);
        sync.add_channel(schema("a"), rx);
        let sink = Collect::default();
        let closed = sink.closed.clone();
        let rows = sink.rows.clone();
        sync.add_sink(Box::new(sink));

        let source = StopSource::new();
        let handle = sync.spawn(source.token()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        source.stop();
        let ticks = handle.join().unwrap().unwrap();

        assert!(ticks > 0);
        assert_eq!(rows.lock().unwrap().len() as u64, ticks);
        assert!(*closed.lock().unwrap());
    }
}
