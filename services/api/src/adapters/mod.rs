pub mod completion_llm;
pub mod db;

pub use completion_llm::OpenRouterCompletionAdapter;
pub use db::{DbAdapter, UserSessionStore};
