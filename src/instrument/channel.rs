//! Channel naming, index resolution, and on-wire channel addressing.

use super::range::RangeSpec;
use crate::config::ChannelConfig;
use crate::error::{IviError, IviResult};
use std::fmt;

/// A channel named either by its 0-based position or by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// 0-based position in the channel table.
    Index(usize),
    /// Configured name such as `output1`. Matching is exact.
    Name(String),
}

impl From<usize> for ChannelRef {
    fn from(index: usize) -> Self {
        ChannelRef::Index(index)
    }
}

impl From<&str> for ChannelRef {
    fn from(name: &str) -> Self {
        ChannelRef::Name(name.to_string())
    }
}

impl From<String> for ChannelRef {
    fn from(name: String) -> Self {
        ChannelRef::Name(name)
    }
}

impl From<&String> for ChannelRef {
    fn from(name: &String) -> Self {
        ChannelRef::Name(name.clone())
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Index(index) => write!(f, "#{}", index),
            ChannelRef::Name(name) => f.write_str(name),
        }
    }
}

/// How the instrument is told which channel a command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// A select command carrying the 1-based channel number is sent before
    /// every channel-scoped access. `{}` in the template is replaced by the
    /// wire number.
    Select(&'static str),
    /// The channel number is embedded in each command (e.g. `SOUR2:FREQ`).
    Inline,
}

/// One entry of the channel table.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Name callers use to address the channel.
    pub name: String,
    /// 0-based position, also the cache row.
    pub index: usize,
    /// Limits checked before every write to this channel.
    pub spec: RangeSpec,
}

impl Channel {
    /// 1-based channel number used on the wire.
    pub fn wire(&self) -> usize {
        self.index + 1
    }
}

/// Fixed, insertion-ordered set of channels for one instrument.
#[derive(Debug, Clone)]
pub struct Channels {
    channels: Vec<Channel>,
    addressing: Addressing,
}

impl Channels {
    /// `count` channels named `{prefix}1..={prefix}count`, all sharing `spec`.
    pub fn uniform(prefix: &str, count: usize, spec: RangeSpec, addressing: Addressing) -> Self {
        let channels = (0..count)
            .map(|index| Channel {
                name: format!("{}{}", prefix, index + 1),
                index,
                spec,
            })
            .collect();
        Self {
            channels,
            addressing,
        }
    }

    /// Channels in the order the configuration lists them.
    pub fn from_config(configs: &[ChannelConfig], addressing: Addressing) -> Self {
        let channels = configs
            .iter()
            .enumerate()
            .map(|(index, config)| Channel {
                name: config.name.clone(),
                index,
                spec: config.range_spec(),
            })
            .collect();
        Self {
            channels,
            addressing,
        }
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// `true` for a table with no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel names in index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    /// Channel at a 0-based index.
    pub fn get(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// How commands name a channel on this instrument.
    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// Map a channel reference to its 0-based index.
    pub fn resolve_index(&self, channel: &ChannelRef) -> IviResult<usize> {
        match channel {
            ChannelRef::Index(index) if *index < self.channels.len() => Ok(*index),
            ChannelRef::Name(name) => self
                .channels
                .iter()
                .position(|c| &c.name == name)
                .ok_or_else(|| IviError::UnknownChannel(name.clone())),
            other => Err(IviError::UnknownChannel(other.to_string())),
        }
    }

    /// Range limits of a channel.
    ///
    /// # Errors
    ///
    /// [`IviError::UnknownChannel`] when `index` is past the table.
    pub fn spec(&self, index: usize) -> IviResult<&RangeSpec> {
        self.channels
            .get(index)
            .map(|c| &c.spec)
            .ok_or_else(|| IviError::UnknownChannel(format!("#{}", index)))
    }

    /// The select command to send before touching `index`, if any.
    ///
    /// Single-channel instruments and inline-addressed instruments never
    /// need one.
    pub fn select_command(&self, index: usize) -> Option<String> {
        match self.addressing {
            Addressing::Select(template) if self.channels.len() > 1 => {
                Some(template.replace("{}", &(index + 1).to_string()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> RangeSpec {
        RangeSpec::new(30.0, 5.0, 30.0)
    }

    #[test]
    fn test_resolve_by_name_and_index() {
        let channels = Channels::uniform("output", 2, spec(), Addressing::Inline);
        assert_eq!(channels.resolve_index(&"output2".into()).unwrap(), 1);
        assert_eq!(channels.resolve_index(&ChannelRef::Index(0)).unwrap(), 0);
        assert!(matches!(
            channels.resolve_index(&"output3".into()),
            Err(IviError::UnknownChannel(_))
        ));
        assert!(matches!(
            channels.resolve_index(&ChannelRef::Index(2)),
            Err(IviError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_select_command_uses_one_based_index() {
        let channels = Channels::uniform(
            "output",
            2,
            spec(),
            Addressing::Select("instrument:nselect {}"),
        );
        assert_eq!(
            channels.select_command(1).as_deref(),
            Some("instrument:nselect 2")
        );
    }

    #[test]
    fn test_single_channel_never_selects() {
        let channels = Channels::uniform(
            "output",
            1,
            spec(),
            Addressing::Select("instrument:nselect {}"),
        );
        assert_eq!(channels.select_command(0), None);
    }

    #[test]
    fn test_from_config_keeps_order() {
        let configs = vec![
            ChannelConfig {
                name: "pos".into(),
                voltage_max: 25.0,
                current_max: 1.0,
                ovp_max: None,
            },
            ChannelConfig {
                name: "neg".into(),
                voltage_max: -25.0,
                current_max: 1.0,
                ovp_max: None,
            },
        ];
        let channels = Channels::from_config(&configs, Addressing::Inline);
        assert_eq!(channels.names().collect::<Vec<_>>(), vec!["pos", "neg"]);
        assert_eq!(channels.spec(1).unwrap().voltage_max, -25.0);
    }
}
