pub mod extract;
pub mod handlers;
pub mod store;

pub use extract::CurrentUser;
pub use store::{AuthState, AuthStore, AuthSubscription};
