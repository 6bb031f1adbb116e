pub mod error;
pub mod normalize;
pub mod notifier;
pub mod service;
pub mod subscription;

pub use error::MessagingError;
pub use service::Messaging;
pub use subscription::Subscription;
