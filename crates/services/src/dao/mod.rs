pub mod base;
pub mod call;
pub mod channel;
pub mod notification;
pub mod user;

pub use base::BaseDao;
