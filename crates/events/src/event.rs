use chrono::{DateTime, Utc};

/// A recorded approval fact, such as a level being validated on one invoice.
///
/// Once published it is never amended; a reversal is its own event. The type
/// name and version travel with it into the audit envelope.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name written to the audit trail, e.g. `invoicing.approval.level1_validated`.
    fn event_type(&self) -> &'static str;

    /// Payload layout version, bumped when fields change.
    fn version(&self) -> u32;

    /// When the approval command was issued, not when the bus delivered it.
    fn occurred_at(&self) -> DateTime<Utc>;
}
