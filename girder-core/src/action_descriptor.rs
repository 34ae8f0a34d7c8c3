//! Action descriptors and the versioned collection they are published in
//!
//! Descriptors are built once while the application is assembled and never
//! change afterwards. Changing the set of actions publishes a whole new
//! [`ActionDescriptorCollection`] with a higher version; every cache keyed by
//! the collection version is then rebuilt from scratch.

use crate::constraints::ActionConstraintMetadataRef;
use crate::controller::ControllerFactory;
use crate::error::Error;
use crate::filters::{FilterDescriptor, FilterRef, FilterScope};
use crate::method_executor::{ActionMethod, ControllerInstance};
use crate::route::RouteValues;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Attribute route of an action. Attribute-routed actions are never picked
/// by conventional selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRouteInfo {
    pub template: String,
    pub order: i32,
    pub name: Option<String>,
}

impl AttributeRouteInfo {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            order: 0,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

/// A parameter the binder fills in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub parameter_type: String,
    /// Name to look up in value providers when it differs from `name`
    pub binder_name: Option<String>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, parameter_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_type: parameter_type.into(),
            binder_name: None,
        }
    }

    pub fn with_binder_name(mut self, binder_name: impl Into<String>) -> Self {
        self.binder_name = Some(binder_name.into());
        self
    }

    /// Key used when reading from value providers
    pub fn model_name(&self) -> &str {
        self.binder_name.as_deref().unwrap_or(&self.name)
    }
}

type PropertySetter = dyn Fn(&ControllerInstance, Value) -> Result<(), Error> + Send + Sync;

/// A controller property bound from the request before the action runs.
#[derive(Clone)]
pub struct BoundProperty {
    pub name: String,
    setter: Arc<PropertySetter>,
}

impl BoundProperty {
    pub fn new<F>(name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&ControllerInstance, Value) -> Result<(), Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            setter: Arc::new(setter),
        }
    }

    pub fn set(&self, controller: &ControllerInstance, value: Value) -> Result<(), Error> {
        (self.setter)(controller, value)
    }
}

impl fmt::Debug for BoundProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundProperty")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One selectable controller action.
pub struct ActionDescriptor {
    /// Unique within a collection
    pub id: String,
    pub display_name: String,
    pub controller_name: String,
    pub action_name: String,
    /// Required route values; conventional selection matches on these
    pub route_values: RouteValues,
    pub attribute_route_info: Option<AttributeRouteInfo>,
    pub parameters: Vec<ParameterDescriptor>,
    pub bound_properties: Vec<BoundProperty>,
    pub filter_descriptors: Vec<FilterDescriptor>,
    pub action_constraints: Vec<ActionConstraintMetadataRef>,
    pub method: Arc<ActionMethod>,
    pub controller_factory: Option<Arc<dyn ControllerFactory>>,
}

impl ActionDescriptor {
    /// Start describing `method` as action `action` of controller `controller`.
    pub fn builder(
        controller: impl Into<String>,
        action: impl Into<String>,
        method: ActionMethod,
    ) -> ActionDescriptorBuilder {
        ActionDescriptorBuilder::new(controller.into(), action.into(), Arc::new(method))
    }

    pub fn is_attribute_routed(&self) -> bool {
        self.attribute_route_info.is_some()
    }

    /// Whether the binder has anything to do for this action
    pub fn has_bindable_members(&self) -> bool {
        !self.parameters.is_empty() || !self.bound_properties.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn test_descriptor(controller: &str, action: &str) -> Self {
        ActionDescriptor::builder(controller, action, ActionMethod::new(action, |_: &(), _| ()))
            .build()
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("route_values", &self.route_values)
            .field("attribute_route_info", &self.attribute_route_info)
            .field("parameters", &self.parameters)
            .field("filters", &self.filter_descriptors.len())
            .field("constraints", &self.action_constraints.len())
            .finish()
    }
}

pub struct ActionDescriptorBuilder {
    descriptor: ActionDescriptor,
}

impl ActionDescriptorBuilder {
    fn new(controller: String, action: String, method: Arc<ActionMethod>) -> Self {
        let display_name = format!("{}::{}", method.controller_type(), method.name());
        let route_values = RouteValues::new()
            .with("controller", controller.clone())
            .with("action", action.clone());

        Self {
            descriptor: ActionDescriptor {
                id: uuid::Uuid::new_v4().to_string(),
                display_name,
                controller_name: controller,
                action_name: action,
                route_values,
                attribute_route_info: None,
                parameters: Vec::new(),
                bound_properties: Vec::new(),
                filter_descriptors: Vec::new(),
                action_constraints: Vec::new(),
                method,
                controller_factory: None,
            },
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.descriptor.id = id.into();
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.display_name = name.into();
        self
    }

    pub fn route_value(mut self, key: &str, value: impl Into<String>) -> Self {
        self.descriptor.route_values.insert(key, Some(value.into()));
        self
    }

    pub fn attribute_route(mut self, info: AttributeRouteInfo) -> Self {
        self.descriptor.attribute_route_info = Some(info);
        self
    }

    /// Add a bound parameter. Parameters declared on the method are added
    /// automatically by [`build`](Self::build) when none are given here.
    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.descriptor.parameters.push(parameter);
        self
    }

    pub fn bound_property(mut self, property: BoundProperty) -> Self {
        self.descriptor.bound_properties.push(property);
        self
    }

    /// Register a filter on the action, with the filter's own order.
    pub fn filter(mut self, filter: FilterRef) -> Self {
        self.descriptor
            .filter_descriptors
            .push(FilterDescriptor::new(filter, FilterScope::Action));
        self
    }

    pub fn filter_descriptor(mut self, descriptor: FilterDescriptor) -> Self {
        self.descriptor.filter_descriptors.push(descriptor);
        self
    }

    pub fn constraint(mut self, constraint: ActionConstraintMetadataRef) -> Self {
        self.descriptor.action_constraints.push(constraint);
        self
    }

    pub fn controller_factory(mut self, factory: Arc<dyn ControllerFactory>) -> Self {
        self.descriptor.controller_factory = Some(factory);
        self
    }

    pub fn build(mut self) -> ActionDescriptor {
        if self.descriptor.parameters.is_empty() {
            self.descriptor.parameters = self
                .descriptor
                .method
                .parameters()
                .iter()
                .map(|p| ParameterDescriptor::new(p.name.clone(), p.parameter_type))
                .collect();
        }
        self.descriptor
    }
}

// ============================================================================
// Collection
// ============================================================================

/// An immutable snapshot of every action, stamped with a version.
#[derive(Debug, Default)]
pub struct ActionDescriptorCollection {
    pub items: Vec<Arc<ActionDescriptor>>,
    pub version: u64,
}

impl ActionDescriptorCollection {
    pub fn new(items: Vec<Arc<ActionDescriptor>>, version: u64) -> Self {
        Self { items, version }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Arc<ActionDescriptor>> {
        self.items.iter().find(|action| action.id == id)
    }
}

/// Publishes the current [`ActionDescriptorCollection`].
///
/// Readers load the current snapshot without locking. Updates are
/// serialized, validated as a whole, and bump the version by one.
pub struct ActionDescriptorCollectionProvider {
    current: ArcSwap<ActionDescriptorCollection>,
    update_lock: Mutex<()>,
    changes: watch::Sender<u64>,
}

impl ActionDescriptorCollectionProvider {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(ActionDescriptorCollection::default()),
            update_lock: Mutex::new(()),
            changes,
        }
    }

    /// Provider whose first collection holds `actions` (version 1).
    pub fn with_actions(actions: Vec<ActionDescriptor>) -> Result<Self, Error> {
        let provider = Self::new();
        provider.update(actions)?;
        Ok(provider)
    }

    pub fn collection(&self) -> Arc<ActionDescriptorCollection> {
        self.current.load_full()
    }

    /// Validate and publish a new set of actions; returns the new version.
    ///
    /// Nothing is published when validation fails.
    pub fn update(&self, actions: Vec<ActionDescriptor>) -> Result<u64, Error> {
        validate_actions(&actions)?;

        let _guard = self.update_lock.lock();
        let version = self.current.load().version + 1;
        let items = actions.into_iter().map(Arc::new).collect();
        self.current
            .store(Arc::new(ActionDescriptorCollection::new(items, version)));
        self.changes.send_replace(version);

        tracing::debug!(version, "Published action descriptor collection");
        Ok(version)
    }

    /// Watch for new versions
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

impl Default for ActionDescriptorCollectionProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_actions(actions: &[ActionDescriptor]) -> Result<(), Error> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();
    let mut route_names: HashMap<&str, (&str, &str)> = HashMap::new();

    for action in actions {
        if !ids.insert(action.id.as_str()) {
            errors.push(format!(
                "Action '{}' uses the id '{}' which is already in use.",
                action.display_name, action.id
            ));
        }

        match &action.attribute_route_info {
            Some(info) => {
                if info.template.trim().is_empty() {
                    errors.push(format!(
                        "Action '{}' has an empty attribute route template.",
                        action.display_name
                    ));
                }
                if let Some(name) = info.name.as_deref() {
                    match route_names.get(name) {
                        Some((template, other)) if *template != info.template => {
                            errors.push(format!(
                                "Attribute routes with the same name '{}' must have the same template: \
                                 action '{}' uses '{}' and action '{}' uses '{}'.",
                                name, other, template, action.display_name, info.template
                            ));
                        }
                        Some(_) => {}
                        None => {
                            route_names.insert(name, (info.template.as_str(), action.display_name.as_str()));
                        }
                    }
                }
            }
            None => {
                for key in ["controller", "action"] {
                    if action.route_values.get(key).is_none_or(str::is_empty) {
                        errors.push(format!(
                            "Conventionally routed action '{}' has no '{}' route value.",
                            action.display_name, key
                        ));
                    }
                }
            }
        }
    }

    Error::from_configuration_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::FnControllerFactory;

    struct Orders;

    fn factory() -> Arc<dyn ControllerFactory> {
        Arc::new(FnControllerFactory::new(|_| Ok(Arc::new(Orders) as ControllerInstance)))
    }

    fn action(name: &str) -> ActionDescriptorBuilder {
        ActionDescriptor::builder(
            "Orders",
            name,
            ActionMethod::new(name, |_: &Orders, _| ()).parameter::<u32>("id"),
        )
        .controller_factory(factory())
    }

    #[test]
    fn test_builder_defaults() {
        let descriptor = action("Details").build();

        assert_eq!(descriptor.route_values.get("controller"), Some("Orders"));
        assert_eq!(descriptor.route_values.get("action"), Some("Details"));
        assert!(descriptor.display_name.ends_with("Orders::Details"));
        assert_eq!(descriptor.parameters.len(), 1);
        assert_eq!(descriptor.parameters[0].name, "id");
        assert!(descriptor.has_bindable_members());
        assert!(!descriptor.is_attribute_routed());
        assert!(!descriptor.id.is_empty());
    }

    #[test]
    fn test_update_bumps_version_and_notifies() {
        let provider = ActionDescriptorCollectionProvider::new();
        let mut changes = provider.subscribe();
        assert_eq!(provider.collection().version, 0);

        assert_eq!(provider.update(vec![action("List").build()]).unwrap(), 1);
        assert_eq!(provider.update(vec![action("List").build()]).unwrap(), 2);

        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 2);
        assert_eq!(provider.collection().len(), 1);
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let provider = ActionDescriptorCollectionProvider::new();
        let actions = vec![
            action("A").id("same").build(),
            action("B").id("same").build(),
            action("C")
                .attribute_route(AttributeRouteInfo::new("  "))
                .build(),
        ];

        match provider.update(actions) {
            Err(Error::Configuration(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("'same'"));
                assert!(errors[1].contains("empty attribute route template"));
            }
            other => panic!("expected configuration errors, got {:?}", other.map(|_| ())),
        }
        assert_eq!(provider.collection().version, 0);
    }

    #[test]
    fn test_named_routes_must_agree() {
        let provider = ActionDescriptorCollectionProvider::new();
        let actions = vec![
            action("A")
                .attribute_route(AttributeRouteInfo::new("orders/a").with_name("orders"))
                .build(),
            action("B")
                .attribute_route(AttributeRouteInfo::new("orders/b").with_name("orders"))
                .build(),
            action("C")
                .attribute_route(AttributeRouteInfo::new("orders/a").with_name("orders"))
                .build(),
        ];

        let err = provider.update(actions).unwrap_err();
        assert!(err.to_string().contains("same name 'orders'"));
    }

    #[test]
    fn test_conventional_actions_need_route_values() {
        let mut descriptor = action("List").build();
        descriptor.route_values.remove("action");

        let err = ActionDescriptorCollectionProvider::with_actions(vec![descriptor]).err();
        assert!(matches!(err, Some(Error::Configuration(ref e)) if e.len() == 1));
    }
}
