pub mod break_queue;
pub mod cache;
pub mod character;
pub mod city;
pub mod event_log;
pub mod host;
pub mod market;
pub mod news;
pub mod settings;
pub mod weather;

pub use break_queue::{BreakMeta, BreakQueueEntry, BreakStatus, BreakType};
pub use cache::CacheRead;
pub use character::Character;
pub use city::City;
pub use event_log::EventLogEntry;
pub use host::{Host, HostRotation};
pub use market::{CorporateSection, EtfSection, GovernmentSection, MarketSnapshot, PriceSection};
pub use news::{CachedHeadline, FeedHealth, FeedStatus, NewsSource, SelectedHeadline};
pub use settings::Settings;
pub use weather::WeatherReading;
