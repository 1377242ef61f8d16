mod call;
mod call_participant;
mod channel;
mod notification;
mod user;

pub use call::{Call, CallStatus, CallType, IceServer, QualityMetrics};
pub use call_participant::{CallParticipant, ParticipantStatus};
pub use channel::{Channel, ChannelMember};
pub use notification::{Notification, NotificationType};
pub use user::User;
