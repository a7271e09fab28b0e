//! Routes of the console.

use dioxus::prelude::*;

use crate::components::views::{ResourcesView, SettingsView};
use crate::components::AppShell;

#[derive(Clone, Debug, PartialEq, Routable)]
#[rustfmt::skip]
pub enum AppView {
    #[layout(AppShell)]
        #[route("/")]
        ResourcesView {},
        #[route("/settings")]
        SettingsView {},
}

pub fn view_label(view: &AppView) -> &'static str {
    match view {
        AppView::ResourcesView {} => "Resources",
        AppView::SettingsView {} => "Settings",
    }
}
