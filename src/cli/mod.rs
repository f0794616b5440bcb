pub mod ask;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod filter;
pub mod index;
pub mod info;
pub mod output;
pub mod runtime;
pub mod sync;
