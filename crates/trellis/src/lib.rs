mod actions;
mod backends;
mod cache;
mod concurrency;
mod context;
mod executor;
pub mod expression;
mod path_filter;
mod plugins;
mod reporter;
mod runner;
mod scheduler;
mod shared_state;
mod signal;
mod stream;
mod trellis;
mod types;
mod user_config;
mod workflow;

pub use crate::trellis::*;
pub use actions::*;
pub use backends::*;
pub use cache::*;
pub use concurrency::*;
pub use context::*;
pub use executor::*;
pub use expression::{Condition, StatusContext, Template};
pub use path_filter::PathFilter;
pub use plugins::*;
pub use reporter::*;
pub use runner::*;
pub use scheduler::*;
pub use shared_state::*;
pub use signal::*;
pub use stream::*;
pub use types::*;
pub use user_config::*;
pub use workflow::*;

pub use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Error>;
