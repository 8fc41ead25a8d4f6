//! Cache key construction.
//!
//! Every cache entry key is built here so that writers and invalidators agree on it.

pub const FIELD_READ_COUNT: &str = "read_cnt";
pub const FIELD_LIKE_COUNT: &str = "like_cnt";
pub const FIELD_COLLECT_COUNT: &str = "collect_cnt";

/// First page of an author's listing.
pub fn first_page(author_id: i64) -> String {
    format!("article:first_page:{author_id}")
}

/// Single draft detail.
pub fn detail(id: i64) -> String {
    format!("article:detail:{id}")
}

/// Published detail, author name included.
pub fn published_detail(id: i64) -> String {
    format!("article:pub:detail:{id}")
}

/// Counter hash of one business item.
pub fn interactive(biz: &str, biz_id: i64) -> String {
    format!("interactive:{biz}:{biz_id}")
}
