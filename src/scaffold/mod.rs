//! # Scaffolding
//!
//! Generic CRUD actions over a [`Store`]. A controller opts in with
//! `ControllerBuilder::scaffold(&["list", "view", "add", "edit", "delete"])`
//! (prefixed names such as `admin_edit` work too) and a model:
//!
//! ```rust
//! use std::sync::Arc;
//! use waypost::controller::ControllerDescriptor;
//! use waypost::scaffold::{string_template, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new("Widget", string_template(&["name", "colour"])));
//! let widgets = ControllerDescriptor::builder("Widgets")
//!     .model(store)
//!     .scaffold(&["list", "view", "add", "edit", "delete"])
//!     .build()
//!     .unwrap();
//! assert!(widgets.is_scaffolded());
//! ```
//!
//! `add` and `edit` parse the request with the controller's parser against
//! [`Store::template`], fire `scaffold_before_save` / `scaffold_after_save`
//! around the write and redirect to the list afterwards. `delete` fires
//! `scaffold_before_delete` / `scaffold_after_delete`. A listener returning
//! `EventError::Rejected` vetoes the write with a 400.

mod actions;
mod store;

pub use actions::{scaffold_action, NO_REDIRECT_PARAM};
pub use store::{string_template, MemoryStore, Page, Store};

/// Per-controller scaffold behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldOptions {
    /// Redirect to the list after add, edit and delete.
    pub redirect: bool,
    /// Flash a confirmation when the `FlashMessages` component is present.
    pub flash_messages: bool,
    /// Fields shown by the scaffold views; empty uses the store's fields.
    pub display_properties: Vec<String>,
    pub title: Option<String>,
}

impl Default for ScaffoldOptions {
    fn default() -> Self {
        Self {
            redirect: true,
            flash_messages: true,
            display_properties: Vec::new(),
            title: None,
        }
    }
}
