//! CLI commands over a [`ContentHub`](crate::ContentHub)

pub mod list;
pub mod new;
pub mod query;
pub mod remove;
pub mod show;
