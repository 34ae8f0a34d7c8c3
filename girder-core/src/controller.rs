// Controller activation and the binder delegate for an action

use crate::action_context::ControllerContext;
use crate::action_descriptor::ActionDescriptor;
use crate::binding::{ArgumentBinder, DefaultArgumentBinder};
use crate::error::Error;
use crate::method_executor::ControllerInstance;
use std::sync::Arc;

/// Creates and releases controller instances.
pub trait ControllerFactory: Send + Sync {
    fn create_controller(&self, context: &ControllerContext) -> Result<ControllerInstance, Error>;

    /// Called once for every controller this factory created
    fn release_controller(&self, _context: &ControllerContext, _controller: ControllerInstance) {}
}

type CreateFn = dyn Fn(&ControllerContext) -> Result<ControllerInstance, Error> + Send + Sync;

/// Factory backed by a closure; releasing just drops the instance.
pub struct FnControllerFactory {
    create: Box<CreateFn>,
}

impl FnControllerFactory {
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(&ControllerContext) -> Result<ControllerInstance, Error> + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
        }
    }

    /// Factory creating a fresh `C::default()` per request
    pub fn of_default<C: Default + Send + Sync + 'static>() -> Self {
        Self::new(|_| Ok(Arc::new(C::default()) as ControllerInstance))
    }
}

impl ControllerFactory for FnControllerFactory {
    fn create_controller(&self, context: &ControllerContext) -> Result<ControllerInstance, Error> {
        (self.create)(context)
    }
}

/// Picks the binder an action needs, if any.
#[derive(Clone)]
pub struct ControllerBinderDelegateProvider {
    binder: Arc<dyn ArgumentBinder>,
}

impl ControllerBinderDelegateProvider {
    pub fn new(binder: Arc<dyn ArgumentBinder>) -> Self {
        Self { binder }
    }

    /// `None` when the action has nothing to bind.
    pub fn create_binder_delegate(
        &self,
        action: &ActionDescriptor,
    ) -> Option<Arc<dyn ArgumentBinder>> {
        action
            .has_bindable_members()
            .then(|| Arc::clone(&self.binder))
    }
}

impl Default for ControllerBinderDelegateProvider {
    fn default() -> Self {
        Self::new(Arc::new(DefaultArgumentBinder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_context::ActionContext;
    use crate::binding::ValueProviderFactories;
    use crate::http::{HttpContext, HttpRequest};
    use crate::method_executor::ActionMethod;
    use crate::route::RouteData;

    #[derive(Default)]
    struct Home {
        greeting: &'static str,
    }

    #[test]
    fn test_default_factory_creates_fresh_instances() {
        let factory = FnControllerFactory::of_default::<Home>();
        let context = ControllerContext::new(
            ActionContext::new(
                Arc::new(HttpContext::new(HttpRequest::new("GET", "/"))),
                RouteData::default(),
                Arc::new(ActionDescriptor::test_descriptor("Home", "Index")),
            ),
            ValueProviderFactories::default(),
        );

        let first = factory.create_controller(&context).unwrap();
        let second = factory.create_controller(&context).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.downcast_ref::<Home>().map(|h| h.greeting), Some(""));
        factory.release_controller(&context, first);
    }

    #[test]
    fn test_binder_only_for_bindable_actions() {
        let provider = ControllerBinderDelegateProvider::default();

        let plain = ActionDescriptor::test_descriptor("Home", "Index");
        assert!(provider.create_binder_delegate(&plain).is_none());

        let with_parameter = ActionDescriptor::builder(
            "Home",
            "Show",
            ActionMethod::new("show", |_: &Home, _| ()).parameter::<u32>("id"),
        )
        .build();
        assert!(provider.create_binder_delegate(&with_parameter).is_some());
    }
}
