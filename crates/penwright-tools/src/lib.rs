pub mod documents;
pub mod export;
pub mod organize;
pub mod search;

pub use export::{write_md_to_docx, write_md_to_pdf, write_text_to_md, write_to_json};
pub use organize::{slugify, Organizer};
pub use search::{create_searcher, format_hits, TavilySearcher};
