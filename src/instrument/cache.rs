//! Attribute cache: a dense (channel × attribute) table of last-known values
//! with a validity flag per cell.
//!
//! A cell's value is served to a reader only while its flag is set. Writes
//! store the written value verbatim and set the flag. Attributes whose write
//! can change coupled state on other channels clear the whole column before
//! the written cell is re-validated.

use crate::error::{IviError, IviResult};
use std::fmt;
use std::marker::PhantomData;

/// A fixed attribute set for one instrument family.
pub trait AttributeKey: Copy + Eq + fmt::Debug + 'static {
    /// Every key, in column order. `ALL[k.column()] == k`.
    const ALL: &'static [Self];

    /// Position of this key in [`AttributeKey::ALL`] and in every cache row.
    fn column(self) -> usize;

    /// Stable snake_case name.
    fn name(self) -> &'static str;

    /// Value reported before the first read or write (and in simulate mode).
    fn default_value(self) -> AttributeValue;

    /// Whether writing this attribute may alter the same attribute on
    /// sibling channels.
    fn cascades(self) -> bool {
        false
    }
}

/// Type-erased attribute value as held by the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Analog quantities: volts, amps, hertz, ohms.
    Float(f64),
    /// Counts.
    Integer(i64),
    /// Switches.
    Bool(bool),
    /// Symbolic values in their lowercase names, and waveform handles.
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => f.write_str(v),
        }
    }
}

impl AttributeValue {
    /// Convert to a typed value, failing with `UnsupportedValue` when the
    /// variant does not fit `attribute`.
    pub fn to<V: CachedValue>(&self, attribute: &str) -> IviResult<V> {
        V::from_value(self).ok_or_else(|| {
            IviError::UnsupportedValue(format!("{} is not a valid value for {}", self, attribute))
        })
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// Conversion between a typed attribute value and its cached form.
pub trait CachedValue: Sized + Clone {
    /// Wrap for storage.
    fn into_value(self) -> AttributeValue;
    /// Unwrap a stored value, `None` when the variant does not fit.
    fn from_value(value: &AttributeValue) -> Option<Self>;
}

impl CachedValue for f64 {
    fn into_value(self) -> AttributeValue {
        AttributeValue::Float(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl CachedValue for i64 {
    fn into_value(self) -> AttributeValue {
        AttributeValue::Integer(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl CachedValue for bool {
    fn into_value(self) -> AttributeValue {
        AttributeValue::Bool(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl CachedValue for String {
    fn into_value(self) -> AttributeValue {
        AttributeValue::Text(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Cell {
    value: AttributeValue,
    valid: bool,
}

/// Dense per-channel cache for attribute set `K`.
#[derive(Debug, Clone)]
pub struct AttributeCache<K: AttributeKey> {
    cells: Vec<Cell>,
    channels: usize,
    _keys: PhantomData<K>,
}

impl<K: AttributeKey> AttributeCache<K> {
    /// A cache for `channels` channels (at least one row is always kept for
    /// instrument-scoped attributes).
    pub fn new(channels: usize) -> Self {
        let channels = channels.max(1);
        let cells = (0..channels)
            .flat_map(|_| K::ALL.iter())
            .map(|key| Cell {
                value: key.default_value(),
                valid: false,
            })
            .collect();
        Self {
            cells,
            channels,
            _keys: PhantomData,
        }
    }

    /// Number of rows.
    pub fn channels(&self) -> usize {
        self.channels
    }

    fn slot(&self, channel: usize, key: K) -> usize {
        debug_assert!(channel < self.channels, "channel {} out of range", channel);
        channel * K::ALL.len() + key.column()
    }

    /// Whether a read of this cell can skip the instrument.
    pub fn is_valid(&self, channel: usize, key: K) -> bool {
        self.cells
            .get(self.slot(channel, key))
            .map(|c| c.valid)
            .unwrap_or(false)
    }

    /// The cached value if its flag is set.
    pub fn get(&self, channel: usize, key: K) -> Option<&AttributeValue> {
        self.cells
            .get(self.slot(channel, key))
            .filter(|c| c.valid)
            .map(|c| &c.value)
    }

    /// The last known value, whether or not it is still trusted.
    pub fn last_known(&self, channel: usize, key: K) -> Option<&AttributeValue> {
        self.cells.get(self.slot(channel, key)).map(|c| &c.value)
    }

    /// Store `value` and mark it valid.
    pub fn store(&mut self, channel: usize, key: K, value: AttributeValue) {
        let slot = self.slot(channel, key);
        if let Some(cell) = self.cells.get_mut(slot) {
            cell.value = value;
            cell.valid = true;
        }
    }

    /// Clear one cell's flag. The value stays available via
    /// [`AttributeCache::last_known`].
    pub fn invalidate(&mut self, channel: usize, key: K) {
        let slot = self.slot(channel, key);
        if let Some(cell) = self.cells.get_mut(slot) {
            cell.valid = false;
        }
    }

    /// Clear the flag for `key` on every channel.
    pub fn invalidate_column(&mut self, key: K) {
        for channel in 0..self.channels {
            self.invalidate(channel, key);
        }
    }

    /// Clear every flag, as after a reset or a recall from memory.
    pub fn invalidate_all(&mut self) {
        for cell in &mut self.cells {
            cell.valid = false;
        }
    }
}
