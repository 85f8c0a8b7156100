pub mod channel;
pub mod dispatcher;
pub mod format;
pub mod telegram;

pub use channel::{DeliveryOutcome, NotificationChannel, NotifyError};
pub use dispatcher::{Alert, AlertDispatcher, DispatchReport};
pub use telegram::TelegramChannel;
