//! Records and synchronized rows.
//!
//! A channel's [`Schema`] is built once from its configuration; records address their
//! values by slot index and only expose `(field, value)` pairs at the sink boundary.

use chrono::{DateTime, Local};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::config::ChannelConfig;

/// Default text for a value a channel did not deliver.
pub const MISSING_MARKER: &str = "nan";

/// Rendering used for capture timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Slot holding the channel name.
pub const NAME_SLOT: usize = 0;
/// Slot holding the capture timestamp.
pub const TIME_SLOT: usize = 1;
/// First slot filled from response tokens.
pub const FIRST_TOKEN_SLOT: usize = 2;

/// Ordered field layout of one channel, validated at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    channel: String,
    fields: Vec<String>,
    normalization: Option<Normalization>,
}

/// Where the raw count is read from and where the derived concentration goes.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Normalization {
    count: usize,
    concentration: usize,
    flow_rate: f64,
}

impl Schema {
    /// Build the schema for a validated channel.
    pub fn from_config(config: &ChannelConfig) -> Arc<Self> {
        let position = |name: &str| config.fields.iter().position(|f| f == name);
        let normalization = if config.normalizes() {
            match (position(&config.count_field), position(&config.concentration_field)) {
                (Some(count), Some(concentration)) => Some(Normalization {
                    count,
                    concentration,
                    flow_rate: config.flow_rate,
                }),
                _ => None,
            }
        } else {
            None
        };
        Arc::new(Self {
            channel: config.name.clone(),
            fields: config.fields.clone(),
            normalization,
        })
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Field names in column order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Slot of `field`, if present.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// How many response tokens fit into this schema.
    pub fn token_capacity(&self) -> usize {
        self.fields.len().saturating_sub(FIRST_TOKEN_SLOT)
    }
}

/// One value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Token as received, or a derived value
    Text(String),
    /// Capture time
    Timestamp(DateTime<Local>),
    /// No data this tick
    Missing,
}

impl Value {
    /// Whether this is [`Value::Missing`].
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Text content, `None` for timestamps and missing values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Numeric view of a text value, if it parses.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_str().and_then(|s| s.trim().parse::<f64>().ok())
    }

    /// Render for output, using `marker` for missing values.
    pub fn render<'a>(&'a self, marker: &'a str) -> Cow<'a, str> {
        match self {
            Value::Text(text) => Cow::Borrowed(text),
            Value::Timestamp(at) => Cow::Owned(at.format(TIMESTAMP_FORMAT).to_string()),
            Value::Missing => Cow::Borrowed(marker),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(MISSING_MARKER))
    }
}

/// One channel's reading for one tick. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    captured_at: DateTime<Local>,
    values: Vec<Value>,
    partial: bool,
    placeholder: bool,
}

impl Record {
    /// Map response tokens positionally onto the schema.
    ///
    /// Slots without a token become [`Value::Missing`] and mark the record partial.
    /// Surplus tokens are ignored. When the channel normalizes, the concentration slot
    /// holds `count / flow_rate` with two decimals, or a missing value if the count
    /// does not parse.
    pub fn from_tokens(schema: &Arc<Schema>, captured_at: DateTime<Local>, tokens: &[String]) -> Self {
        let mut values = Vec::with_capacity(schema.len());
        let mut partial = false;
        let mut tokens = tokens.iter();
        for slot in 0..schema.len() {
            let value = match slot {
                NAME_SLOT => Value::Text(schema.channel.clone()),
                TIME_SLOT => Value::Timestamp(captured_at),
                _ => match tokens.next() {
                    Some(token) => Value::Text(token.clone()),
                    None => {
                        partial = true;
                        Value::Missing
                    }
                },
            };
            values.push(value);
        }

        if let Some(norm) = schema.normalization {
            let concentration = match values.get(norm.count).and_then(Value::as_f64) {
                Some(count) => Value::Text(format!("{:.2}", count / norm.flow_rate)),
                None => {
                    partial = true;
                    Value::Missing
                }
            };
            values[norm.concentration] = concentration;
        }

        Self {
            schema: Arc::clone(schema),
            captured_at,
            values,
            partial,
            placeholder: false,
        }
    }

    /// A record with every field missing, standing in for a channel that had nothing.
    pub fn placeholder(schema: &Arc<Schema>, at: DateTime<Local>) -> Self {
        Self {
            schema: Arc::clone(schema),
            captured_at: at,
            values: vec![Value::Missing; schema.len()],
            partial: true,
            placeholder: true,
        }
    }

    /// Channel this record belongs to.
    pub fn channel(&self) -> &str {
        self.schema.channel()
    }

    /// Shared schema of the channel.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// When the response was read, or the tick time for placeholders.
    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of values, always the schema length.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Some slot could not be filled from the device response.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Synthesized by the synchronizer, not produced by the device.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Value of `field`, if the schema has it.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema.index_of(field).map(|i| &self.values[i])
    }

    /// `(field, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// One aligned row: exactly one record per configured channel, in channel order.
#[derive(Debug, Clone)]
pub struct SyncRow {
    tick: u64,
    at: DateTime<Local>,
    records: Vec<Record>,
}

impl SyncRow {
    /// Row for `tick` built at `at`, one record per channel in channel order.
    pub fn new(tick: u64, at: DateTime<Local>, records: Vec<Record>) -> Self {
        Self { tick, at, records }
    }

    /// Logical tick number, starting at zero.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Wall-clock time the row was assembled.
    pub fn at(&self) -> DateTime<Local> {
        self.at
    }

    /// One record per channel, in channel order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the row has no channels.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record of `channel`.
    pub fn get(&self, channel: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.channel() == channel)
    }

    /// Channels that contributed a placeholder this tick.
    pub fn missing_channels(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| r.is_placeholder())
            .map(Record::channel)
    }

    /// Every value of the row, channel after channel.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.records.iter().flat_map(|r| r.values().iter())
    }
}
