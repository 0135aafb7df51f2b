//! Capability Mapper (C9) and Notification Sender (C10).
//!
//! The mapper resolves which endpoint of a notification target (or its
//! owning organization) is the right place to deliver a Twiin/BgZ
//! Notified-Pull Task, and the URA to address it to. The sender builds and
//! delivers that Task, with an audit trail keyed by a hashed patient BSN.

mod audit;
mod capability;
mod error;
mod notification;
mod resolver;

pub use audit::{AuditRecord, AuditSink, AuditStage, NoopAuditSink, hash_bsn};
pub use capability::{CapabilityMapper, CapabilityRequest, ResolvedCapability, SelectionSource, is_safe_notification_url};
pub use error::RoutingError;
pub use notification::{NotificationOutcome, NotificationRequest, NotificationSender, NotificationTarget, SenderIdentity};
pub use resolver::{ClientResourceFetcher, ResourceFetcher};
