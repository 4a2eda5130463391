use serde::Serialize;
use uuid::Uuid;

use crate::models::Comment;

/// A marker drawn over the rendered page at a comment's stored coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub comment_id: Uuid,
    /// 1-based position of the comment in the document's full chronological list,
    /// so pins and sidebar entries share numbering across pages.
    pub number: usize,
    pub x: f64,
    pub y: f64,
    pub active: bool,
}

/// Pins for one page. `comments` must be in chronological order.
pub fn pins_for_page(comments: &[Comment], page: u32, active: Option<Uuid>) -> Vec<Pin> {
    comments
        .iter()
        .enumerate()
        .filter(|(_, c)| i64::from(c.page_number) == i64::from(page))
        .map(|(index, c)| Pin {
            comment_id: c.id,
            number: index + 1,
            x: c.x,
            y: c.y,
            active: active == Some(c.id),
        })
        .collect()
}
