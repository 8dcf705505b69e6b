//! # Components
//!
//! Per-request plugins declared on a controller. The dispatcher builds every
//! declared component in declaration order right after the request context is
//! created. While being built a component may register listeners on the
//! request's event bus; once construction finishes the bus is frozen.
//!
//! Components are looked up by type ([`Components::get`]) or by name
//! ([`Components::contains`]). The name is the component's declared name or
//! the snake_case of its type name (`FlashMessages` -> `flash_messages`).
//!
//! Stock components:
//!
//! - [`Json`]: switches to the JSON view on `alt=json` or a JSON `Accept` header
//! - [`Pagination`]: fills list views from the controller's store
//! - [`FlashMessages`]: one-shot messages carried across a redirect
//! - [`Scaffolding`]: view metadata for generated CRUD pages

mod flash;
mod json;
mod pagination;
mod scaffolding;

pub use flash::{flash, FlashMessages, FLASH_SESSION_KEY};
pub use json::Json;
pub use pagination::Pagination;
pub use scaffolding::Scaffolding;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::controller::RequestContext;
use crate::error::DispatchError;
use crate::events::EventBus;
use crate::inflector;

/// A per-request plugin.
pub trait Component: Any + Send + Sized {
    /// Lookup name; `None` uses the snake_case type name.
    fn declared_name() -> Option<&'static str> {
        None
    }

    /// Build the component for one request. Listeners registered on `events`
    /// stay active for the rest of the request.
    fn build(
        ctx: &mut RequestContext,
        events: &mut EventBus<RequestContext>,
    ) -> Result<Self, DispatchError>;
}

type BuildFn = Arc<
    dyn Fn(&mut RequestContext, &mut EventBus<RequestContext>) -> Result<Box<dyn Any + Send>, DispatchError>
        + Send
        + Sync,
>;

/// Type-erased constructor stored on a controller descriptor.
#[derive(Clone)]
pub struct ComponentFactory {
    name: String,
    type_id: TypeId,
    build: BuildFn,
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("name", &self.name)
            .finish()
    }
}

impl ComponentFactory {
    pub fn of<T: Component>() -> Self {
        let name = T::declared_name()
            .map(str::to_string)
            .unwrap_or_else(|| {
                inflector::underscore(inflector::short_type_name(std::any::type_name::<T>()))
            });
        Self {
            name,
            type_id: TypeId::of::<T>(),
            build: Arc::new(
                |ctx: &mut RequestContext, events: &mut EventBus<RequestContext>| {
                    T::build(ctx, events).map(|c| Box::new(c) as Box<dyn Any + Send>)
                },
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Build the component and add it to `ctx.components`.
    pub fn build(
        &self,
        ctx: &mut RequestContext,
        events: &mut EventBus<RequestContext>,
    ) -> Result<(), DispatchError> {
        let component = (self.build)(ctx, events)?;
        ctx.components
            .insert(self.name.clone(), self.type_id, component);
        Ok(())
    }
}

/// Components built for one request, in declaration order.
#[derive(Default)]
pub struct Components {
    entries: Vec<(String, TypeId, Box<dyn Any + Send>)>,
}

impl fmt::Debug for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Components {
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.entries
            .iter()
            .find_map(|(_, _, c)| c.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find_map(|(_, _, c)| c.downcast_mut::<T>())
    }

    pub fn contains_type<T: Any>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.entries.iter().any(|(_, t, _)| *t == id)
    }

    /// Look up by name, downcasting to `T`.
    pub fn by_name<T: Any>(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .and_then(|(_, _, c)| c.downcast_ref::<T>())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _, _)| n == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _, _)| n.as_str()).collect()
    }

    pub fn insert(&mut self, name: String, type_id: TypeId, component: Box<dyn Any + Send>) {
        self.entries.push((name, type_id, component));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AuditTrail;

    impl Component for AuditTrail {
        fn build(
            _ctx: &mut RequestContext,
            _events: &mut EventBus<RequestContext>,
        ) -> Result<Self, DispatchError> {
            Ok(AuditTrail)
        }
    }

    struct Named;

    impl Component for Named {
        fn declared_name() -> Option<&'static str> {
            Some("tracker")
        }

        fn build(
            _ctx: &mut RequestContext,
            _events: &mut EventBus<RequestContext>,
        ) -> Result<Self, DispatchError> {
            Ok(Named)
        }
    }

    #[test]
    fn test_factory_names() {
        assert_eq!(ComponentFactory::of::<AuditTrail>().name(), "audit_trail");
        assert_eq!(ComponentFactory::of::<Named>().name(), "tracker");
        assert_eq!(ComponentFactory::of::<FlashMessages>().name(), "flash_messages");
        assert_eq!(ComponentFactory::of::<Json>().name(), "json");
    }

    #[test]
    fn test_lookup_by_type_and_name() {
        let mut components = Components::default();
        components.insert(
            "audit_trail".into(),
            TypeId::of::<AuditTrail>(),
            Box::new(AuditTrail),
        );
        components.insert("count".into(), TypeId::of::<u32>(), Box::new(3u32));
        assert!(components.get::<AuditTrail>().is_some());
        assert!(components.contains_type::<u32>());
        assert!(components.contains("audit_trail"));
        assert_eq!(components.by_name::<u32>("count"), Some(&3));
        assert_eq!(components.by_name::<u32>("audit_trail"), None);
        *components.get_mut::<u32>().unwrap() += 1;
        assert_eq!(components.get::<u32>(), Some(&4));
        assert_eq!(components.names(), vec!["audit_trail", "count"]);
    }
}
