pub mod jwt;
pub mod token_cache;

pub use token_cache::{ArcTokenCache, AuthError, TokenCache};
