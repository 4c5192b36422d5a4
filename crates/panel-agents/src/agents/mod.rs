pub mod heuristic;
pub mod judge;
pub mod reviewer;

pub use heuristic::{default_panel, KeywordReviewer, KeywordRule};
pub use judge::LlmJudge;
pub use reviewer::{load_llm_panel, LlmReviewer};
