pub mod final_write;
pub mod paper;
pub mod pdf;
pub mod status;

pub use final_write::{FinalWriteParams, review_final_markdown_write};
pub use paper::{paper_search, question_prompt, read_paper};
pub use pdf::{pdf_annotate, pdf_jump, pdf_read_lines, pdf_search};
pub use status::status_update;
