//! The read/write engine shared by every driver.
//!
//! A [`Session`] owns the transport, the channel table, and the attribute
//! cache for one instrument. Each physical access is `select → act` with no
//! other access in between, which `&mut self` guarantees.
//!
//! Reads:
//! 1. cached and valid (or simulating) → return the cached value, no I/O
//! 2. otherwise select the channel, query, parse, store, mark valid
//!
//! Writes (after the caller has validated the value):
//! 1. select the channel, send the command(s)
//! 2. cascading keys: clear the flag on every channel
//! 3. store the written value, mark this cell valid

use super::cache::{AttributeCache, AttributeKey, CachedValue};
use super::channel::{ChannelRef, Channels};
use super::identity::Identity;
use super::range::RangeSpec;
use crate::adapters::Transport;
use crate::error::{IviError, IviResult};
use tracing::{debug, trace};

/// One open instrument: its transport, channel table and attribute cache.
///
/// Drivers own a session and express each attribute as a short call into it
/// (a query string and a parser for reads, command strings for writes). The
/// session decides whether the wire is touched at all. In simulate mode
/// nothing is ever sent, reads are answered from the cache or the
/// attribute's default, and writes only update the cache.
pub struct Session<K: AttributeKey> {
    transport: Box<dyn Transport>,
    channels: Channels,
    cache: AttributeCache<K>,
    simulate: bool,
    identity: Option<Identity>,
}

impl<K: AttributeKey> Session<K> {
    /// A session with an all-invalid cache.
    pub fn new(transport: Box<dyn Transport>, channels: Channels, simulate: bool) -> Self {
        let cache = AttributeCache::new(channels.len());
        Self {
            transport,
            channels,
            cache,
            simulate,
            identity: None,
        }
    }

    /// Whether I/O is suppressed.
    pub fn is_simulated(&self) -> bool {
        self.simulate
    }

    /// The channel table.
    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Read-only view of the cache, for inspection in tests and tools.
    pub fn cache(&self) -> &AttributeCache<K> {
        &self.cache
    }

    /// 0-based index of a channel, or [`IviError::UnknownChannel`].
    pub fn resolve(&self, channel: impl Into<ChannelRef>) -> IviResult<usize> {
        self.channels.resolve_index(&channel.into())
    }

    /// Range limits of the channel at `index`.
    pub fn spec(&self, index: usize) -> IviResult<&RangeSpec> {
        self.channels.spec(index)
    }

    /// Address the instrument to `index`. Sent before every physical
    /// channel access; the device keeps a single selection register.
    fn select(&mut self, index: usize) -> IviResult<()> {
        if let Some(command) = self.channels.select_command(index) {
            self.transport.write(&command)?;
        }
        Ok(())
    }

    /// Last stored value of a driver-side attribute that has no instrument
    /// query.
    pub fn stored<V: CachedValue>(&self, index: usize, key: K) -> IviResult<V> {
        self.cache
            .last_known(index, key)
            .and_then(V::from_value)
            .ok_or_else(|| {
                IviError::UnsupportedValue(format!(
                    "cached {} has an unexpected type",
                    key.name()
                ))
            })
    }

    /// Cached read of a channel-scoped attribute.
    pub fn get<V: CachedValue>(
        &mut self,
        index: usize,
        key: K,
        query: &str,
        parse: impl FnOnce(&str, &str) -> IviResult<V>,
    ) -> IviResult<V> {
        if self.simulate || self.cache.is_valid(index, key) {
            trace!(channel = index, attribute = key.name(), "cache hit");
            return self.stored(index, key);
        }
        trace!(channel = index, attribute = key.name(), "cache miss");

        self.select(index)?;
        let reply = self.transport.ask(query)?;
        let value = parse(query, &reply)?;
        self.cache.store(index, key, value.clone().into_value());
        Ok(value)
    }

    /// Write of a channel-scoped attribute using plain commands.
    pub fn set<V: CachedValue>(
        &mut self,
        index: usize,
        key: K,
        value: V,
        commands: &[String],
    ) -> IviResult<()> {
        self.set_with(index, key, value, |transport| {
            for command in commands {
                transport.write(command)?;
            }
            Ok(())
        })
    }

    /// Write of a channel-scoped attribute where the command sequence needs
    /// more than a list of writes (delays, conditional commands).
    pub fn set_with<V: CachedValue>(
        &mut self,
        index: usize,
        key: K,
        value: V,
        send: impl FnOnce(&mut dyn Transport) -> IviResult<()>,
    ) -> IviResult<()> {
        if !self.simulate {
            self.select(index)?;
            send(&mut *self.transport)?;
        }
        self.record(index, key, value);
        Ok(())
    }

    /// Update the cache as if `value` had been written to `index`.
    pub fn record<V: CachedValue>(&mut self, index: usize, key: K, value: V) {
        if key.cascades() {
            debug!(attribute = key.name(), "invalidating attribute on all channels");
            self.cache.invalidate_column(key);
        }
        self.cache.store(index, key, value.into_value());
    }

    /// Cached read of an instrument-scoped attribute (no channel selection).
    pub fn get_global<V: CachedValue>(
        &mut self,
        key: K,
        query: &str,
        parse: impl FnOnce(&str, &str) -> IviResult<V>,
    ) -> IviResult<V> {
        if self.simulate || self.cache.is_valid(0, key) {
            return self.stored(0, key);
        }
        let reply = self.transport.ask(query)?;
        let value = parse(query, &reply)?;
        self.cache.store(0, key, value.clone().into_value());
        Ok(value)
    }

    /// Write of an instrument-scoped attribute (no channel selection).
    pub fn set_global<V: CachedValue>(&mut self, key: K, value: V, command: &str) -> IviResult<()> {
        if !self.simulate {
            self.transport.write(command)?;
        }
        self.record(0, key, value);
        Ok(())
    }

    /// Uncached query on a channel. `None` when simulating.
    pub fn query_channel(&mut self, index: usize, query: &str) -> IviResult<Option<String>> {
        if self.simulate {
            return Ok(None);
        }
        self.select(index)?;
        self.transport.ask(query).map(Some)
    }

    /// Uncached query with no channel selection. `None` when simulating.
    pub fn query(&mut self, query: &str) -> IviResult<Option<String>> {
        if self.simulate {
            return Ok(None);
        }
        self.transport.ask(query).map(Some)
    }

    /// Write with no channel selection. Skipped when simulating.
    pub fn write(&mut self, command: &str) -> IviResult<()> {
        if self.simulate {
            return Ok(());
        }
        self.transport.write(command)
    }

    /// Write to a channel after selecting it. Skipped when simulating.
    pub fn write_channel(&mut self, index: usize, command: &str) -> IviResult<()> {
        if self.simulate {
            return Ok(());
        }
        self.select(index)?;
        self.transport.write(command)
    }

    /// Read one reply without sending anything. `None` when simulating.
    pub fn read(&mut self) -> IviResult<Option<String>> {
        if self.simulate {
            return Ok(None);
        }
        self.transport.read().map(Some)
    }

    /// Binary block write. Skipped when simulating.
    pub fn write_block(&mut self, data: &[u8], prefix: &str) -> IviResult<()> {
        if self.simulate {
            return Ok(());
        }
        self.transport.write_block(data, prefix)
    }

    /// Device clear on the transport. Skipped when simulating.
    pub fn clear(&mut self) -> IviResult<()> {
        if self.simulate {
            return Ok(());
        }
        self.transport.clear()
    }

    /// Force the next read of one cell to go to the instrument.
    pub fn invalidate(&mut self, index: usize, key: K) {
        self.cache.invalidate(index, key);
    }

    /// Forget everything cached, the identity included.
    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
        self.identity = None;
    }

    /// `*IDN?`, fetched once per session.
    pub fn identity(&mut self) -> IviResult<&Identity> {
        let identity = match self.identity.take() {
            Some(identity) => identity,
            None if self.simulate => Identity::simulated(),
            None => Identity::parse(&self.transport.ask("*IDN?")?)?,
        };
        Ok(&*self.identity.insert(identity))
    }

    /// Description of the underlying link.
    pub fn transport_info(&self) -> String {
        self.transport.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockTransport;
    use crate::instrument::cache::AttributeValue;
    use crate::instrument::channel::Addressing;
    use crate::instrument::codec::{fixed2, parse_f64};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Key {
        Level,
        Clock,
    }

    impl AttributeKey for Key {
        const ALL: &'static [Self] = &[Key::Level, Key::Clock];

        fn column(self) -> usize {
            self as usize
        }

        fn name(self) -> &'static str {
            match self {
                Key::Level => "level",
                Key::Clock => "clock",
            }
        }

        fn default_value(self) -> AttributeValue {
            AttributeValue::Float(0.0)
        }

        fn cascades(self) -> bool {
            matches!(self, Key::Clock)
        }
    }

    fn session(mock: &MockTransport, count: usize, simulate: bool) -> Session<Key> {
        let channels = Channels::uniform(
            "out",
            count,
            RangeSpec::new(30.0, 5.0, 30.0),
            Addressing::Select("SEL {}"),
        );
        Session::new(Box::new(mock.clone()), channels, simulate)
    }

    #[test]
    fn test_miss_then_hit() {
        let mock = MockTransport::new();
        mock.reply("LEV?", "2.5");
        let mut session = session(&mock, 2, false);

        assert_eq!(session.get(1, Key::Level, "LEV?", parse_f64).unwrap(), 2.5);
        assert_eq!(session.get(1, Key::Level, "LEV?", parse_f64).unwrap(), 2.5);
        assert_eq!(mock.commands(), vec!["SEL 2", "LEV?"]);
        assert_eq!(mock.read_count(), 1);
    }

    #[test]
    fn test_write_stores_verbatim_value() {
        let mock = MockTransport::new();
        let mut session = session(&mock, 2, false);

        session
            .set(0, Key::Level, 1.234, &[format!("LEV {}", fixed2(1.234))])
            .unwrap();
        assert_eq!(mock.commands(), vec!["SEL 1", "LEV 1.23"]);
        // Verbatim, not the rounded wire form
        assert_eq!(session.get(0, Key::Level, "LEV?", parse_f64).unwrap(), 1.234);
        assert_eq!(mock.read_count(), 0);
    }

    #[test]
    fn test_cascading_write_invalidates_siblings() {
        let mock = MockTransport::new();
        mock.reply("CLK?", "10");
        let mut session = session(&mock, 3, false);

        for index in 0..3 {
            session.get(index, Key::Clock, "CLK?", parse_f64).unwrap();
        }
        session.set(1, Key::Clock, 20.0, &["CLK 20".to_string()]).unwrap();

        assert!(session.cache().is_valid(1, Key::Clock));
        assert!(!session.cache().is_valid(0, Key::Clock));
        assert!(!session.cache().is_valid(2, Key::Clock));
    }

    #[test]
    fn test_single_channel_sends_no_select() {
        let mock = MockTransport::new();
        let mut session = session(&mock, 1, false);
        session.set(0, Key::Level, 3.0, &["LEV 3.00".to_string()]).unwrap();
        assert_eq!(mock.commands(), vec!["LEV 3.00"]);
    }

    #[test]
    fn test_simulate_skips_io() {
        let mock = MockTransport::new();
        let mut session = session(&mock, 2, true);

        assert_eq!(session.get(0, Key::Level, "LEV?", parse_f64).unwrap(), 0.0);
        session.set(0, Key::Level, 7.0, &["LEV 7.00".to_string()]).unwrap();
        assert_eq!(session.get(0, Key::Level, "LEV?", parse_f64).unwrap(), 7.0);
        assert_eq!(session.query("*OPC?").unwrap(), None);
        assert!(mock.sent().is_empty());
        assert_eq!(session.identity().unwrap().model, "Not available while simulating");
    }

    #[test]
    fn test_transport_failure_leaves_cache_untouched() {
        let mock = MockTransport::new();
        mock.fail_on("LEV 4.00");
        let mut session = session(&mock, 2, false);

        let err = session
            .set(0, Key::Level, 4.0, &["LEV 4.00".to_string()])
            .unwrap_err();
        assert!(err.is_transport_failure());
        assert!(!session.cache().is_valid(0, Key::Level));
    }

    #[test]
    fn test_unparseable_reply() {
        let mock = MockTransport::new();
        mock.reply("LEV?", "OVER");
        let mut session = session(&mock, 2, false);
        let err = session.get(0, Key::Level, "LEV?", parse_f64).unwrap_err();
        assert!(matches!(err, IviError::InvalidResponse { .. }));
        assert!(!session.cache().is_valid(0, Key::Level));
    }

    #[test]
    fn test_identity_fetched_once() {
        let mock = MockTransport::new();
        mock.reply("*IDN?", "Rohde&Schwarz,HMP2020,1,2.51");
        let mut session = session(&mock, 2, false);
        assert_eq!(session.identity().unwrap().model, "HMP2020");
        assert_eq!(session.identity().unwrap().model, "HMP2020");
        assert_eq!(mock.read_count(), 1);
    }
}
