pub mod composer;
pub mod notifier;
pub mod outbox;

pub use composer::AlertComposer;
pub use notifier::{DeliveryReport, HttpNotifier, LogNotifier, Notifier};
pub use outbox::{AlertOutbox, DeliveryOutcome, DeliveryStatus, OutboundAlert};
