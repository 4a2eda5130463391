pub mod handlers;
pub mod service;

pub use service::{CommentListener, CommentService, CommentSubscription};
