//! Instrument core: channel addressing, range checks, the attribute cache and
//! the session that drives them, plus the capability traits of each
//! instrument class.

pub mod cache;
pub mod capabilities;
pub mod channel;
pub mod codec;
pub mod dcpwr;
pub mod fgen;
pub mod identity;
pub mod range;
pub mod session;
pub mod shared;

pub use cache::{AttributeCache, AttributeKey, AttributeValue, CachedValue};
pub use capabilities::{ErrorReport, Outcome, SelfTestResult, SoftwareTrigger, Utility};
pub use channel::{Addressing, Channel, ChannelRef, Channels};
pub use identity::Identity;
pub use range::RangeSpec;
pub use session::Session;
pub use shared::Shared;
