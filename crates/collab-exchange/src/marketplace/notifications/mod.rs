//! Event fan-out from the lifecycle and ledger to interested members.

mod dispatcher;
mod events;
mod inbox;

pub use dispatcher::{
    DeliveryError, DispatchReport, EventSink, NotificationDispatcher, Subscriber,
    SubscriberProfile, SubscriptionId,
};
pub use events::{Audience, DomainEvent, Notification, NotificationLevel};
pub use inbox::Inbox;
