mod resources;
mod settings;

pub use resources::ResourcesView;
pub use settings::SettingsView;
