//! Review page: renderer seam, zoom stepping, pin overlay and the session controller.

pub mod handlers;
pub mod pins;
pub mod render;
pub mod session;
pub mod zoom;

pub use pins::{pins_for_page, Pin};
pub use render::{PdfDocument, PdfPage, PdfRenderer, RenderError, Viewport};
pub use session::{PinDraft, ReviewMode, ReviewSession};
pub use zoom::{InvalidZoomBounds, Zoom, ZoomBounds};
