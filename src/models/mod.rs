mod contact;
mod contact_detail;
mod email_activity;
mod interaction;
mod stage;
mod tag;
mod task;

pub use contact::*;
pub use contact_detail::*;
pub use email_activity::*;
pub use interaction::*;
pub use stage::*;
pub use tag::*;
pub use task::*;
