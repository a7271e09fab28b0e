//! The components module contains the console's pages and the state machines behind them.

mod app;
mod app_view;
pub mod audio_manager;
mod notices;
pub mod ordered_collection;
mod views;

pub use app::*;
pub use app_view::*;
pub use notices::*;
// Views are accessed via views::ViewName
