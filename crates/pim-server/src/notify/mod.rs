pub mod aggregated;
pub mod capability;
pub mod collector;
pub mod manager;
pub mod subscriber;

pub use aggregated::{AggregatedCollectionScope, AggregatedItemScope, AggregatedTagScope};
pub use capability::CapabilityAggregator;
pub use collector::NotificationCollector;
pub use manager::{NotificationManager, ReferencedCollections};
pub use subscriber::{ChannelTransport, Subscriber, SubscriberFilter, SubscriberTransport, TransportError};
