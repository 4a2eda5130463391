pub mod comment;
pub mod pdf;
pub mod user;

pub use comment::{Comment, NewComment};
pub use pdf::{NewPdf, PdfRecord};
pub use user::{AuthUser, Session};
