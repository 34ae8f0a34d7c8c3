// Walks the per-request filter list once per phase

use super::{
    ActionFilter, AsyncActionFilter, AsyncAuthorizationFilter, AsyncExceptionFilter,
    AsyncResourceFilter, AsyncResultFilter, AuthorizationFilter, ExceptionFilter, FilterMetadata,
    FilterRef, ResourceFilter, ResultFilter,
};

/// One pipeline phase: the sync and async filter shapes it accepts.
pub trait FilterPhase<'f> {
    type Sync: ?Sized + 'f;
    type Async: ?Sized + 'f;

    /// Kind reported in logs
    const KIND: &'static str;

    fn sync_filter(filter: &'f dyn FilterMetadata) -> Option<&'f Self::Sync>;

    fn async_filter(filter: &'f dyn FilterMetadata) -> Option<&'f Self::Async>;
}

/// The next filter of a phase, in whichever shape it implements.
pub enum CursorItem<'f, S: ?Sized, A: ?Sized> {
    Sync(&'f S),
    Async(&'f A),
}

impl<S: ?Sized, A: ?Sized> Clone for CursorItem<'_, S, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized, A: ?Sized> Copy for CursorItem<'_, S, A> {}

/// Position in the filter list; reset at the start of every phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterCursor {
    index: usize,
}

impl FilterCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Advance to the next filter taking part in phase `P`.
    ///
    /// A filter implementing both shapes is used through its async one.
    pub fn next_filter<'f, P: FilterPhase<'f>>(
        &mut self,
        filters: &'f [FilterRef],
    ) -> Option<CursorItem<'f, P::Sync, P::Async>> {
        while let Some(filter) = filters.get(self.index) {
            self.index += 1;
            let filter: &'f dyn FilterMetadata = &**filter;
            if let Some(filter) = P::async_filter(filter) {
                return Some(CursorItem::Async(filter));
            }
            if let Some(filter) = P::sync_filter(filter) {
                return Some(CursorItem::Sync(filter));
            }
        }
        None
    }
}

/// Filters of phase `P` in execution order
pub fn filters_of_phase<'f, P: FilterPhase<'f>>(filters: &'f [FilterRef]) -> Vec<&'f dyn FilterMetadata> {
    filters
        .iter()
        .map(|f| -> &'f dyn FilterMetadata { &**f })
        .filter(|f| P::async_filter(*f).is_some() || P::sync_filter(*f).is_some())
        .collect()
}

macro_rules! filter_phase {
    ($(#[$doc:meta])* $phase:ident, $kind:literal, $sync:ident => $as_sync:ident, $async:ident => $as_async:ident) => {
        $(#[$doc])*
        pub struct $phase;

        impl<'f> FilterPhase<'f> for $phase {
            type Sync = dyn $sync;
            type Async = dyn $async;

            const KIND: &'static str = $kind;

            fn sync_filter(filter: &'f dyn FilterMetadata) -> Option<&'f Self::Sync> {
                filter.$as_sync()
            }

            fn async_filter(filter: &'f dyn FilterMetadata) -> Option<&'f Self::Async> {
                filter.$as_async()
            }
        }
    };
}

filter_phase!(AuthorizationPhase, "Authorization Filter",
    AuthorizationFilter => as_authorization_filter,
    AsyncAuthorizationFilter => as_async_authorization_filter);

filter_phase!(ResourcePhase, "Resource Filter",
    ResourceFilter => as_resource_filter,
    AsyncResourceFilter => as_async_resource_filter);

filter_phase!(ExceptionPhase, "Exception Filter",
    ExceptionFilter => as_exception_filter,
    AsyncExceptionFilter => as_async_exception_filter);

filter_phase!(ActionPhase, "Action Filter",
    ActionFilter => as_action_filter,
    AsyncActionFilter => as_async_action_filter);

filter_phase!(ResultPhase, "Result Filter",
    ResultFilter => as_result_filter,
    AsyncResultFilter => as_async_result_filter);

filter_phase!(
    /// Only filters that asked to run even on short-circuits
    AlwaysRunResultPhase, "Always Run Result Filter",
    ResultFilter => as_always_run_result_filter,
    AsyncResultFilter => as_async_always_run_result_filter);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::filters::{
        ActionExecutedContext, ActionExecutingContext, ActionExecutionDelegate,
        ResultExecutedContext, ResultExecutingContext,
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Plain(&'static str);

    impl FilterMetadata for Plain {
        fn name(&self) -> &str {
            self.0
        }

        fn as_action_filter(&self) -> Option<&dyn ActionFilter> {
            Some(self)
        }
    }

    impl ActionFilter for Plain {
        fn on_action_executing(&self, _: &mut ActionExecutingContext) -> Result<(), Error> {
            Ok(())
        }

        fn on_action_executed(&self, _: &mut ActionExecutedContext) -> Result<(), Error> {
            Ok(())
        }
    }

    struct Both;

    impl FilterMetadata for Both {
        fn as_action_filter(&self) -> Option<&dyn ActionFilter> {
            Some(self)
        }

        fn as_async_action_filter(&self) -> Option<&dyn AsyncActionFilter> {
            Some(self)
        }
    }

    impl ActionFilter for Both {
        fn on_action_executing(&self, _: &mut ActionExecutingContext) -> Result<(), Error> {
            Ok(())
        }

        fn on_action_executed(&self, _: &mut ActionExecutedContext) -> Result<(), Error> {
            Ok(())
        }
    }

    #[async_trait]
    impl AsyncActionFilter for Both {
        async fn on_action_execution(
            &self,
            context: &mut ActionExecutingContext,
            next: ActionExecutionDelegate<'_>,
        ) -> Result<(), Error> {
            next.invoke(context).await.map(|_| ())
        }
    }

    struct AlwaysRun;

    impl FilterMetadata for AlwaysRun {
        fn as_always_run_result_filter(&self) -> Option<&dyn ResultFilter> {
            Some(self)
        }
    }

    impl ResultFilter for AlwaysRun {
        fn on_result_executing(&self, _: &mut ResultExecutingContext) -> Result<(), Error> {
            Ok(())
        }

        fn on_result_executed(&self, _: &mut ResultExecutedContext) -> Result<(), Error> {
            Ok(())
        }
    }

    struct Inert;

    impl FilterMetadata for Inert {}

    fn filters() -> Vec<FilterRef> {
        vec![
            Arc::new(Inert) as FilterRef,
            Arc::new(Plain("first")),
            Arc::new(Both),
            Arc::new(AlwaysRun),
            Arc::new(Plain("last")),
        ]
    }

    #[test]
    fn test_cursor_skips_other_phases() {
        let filters = filters();
        let mut cursor = FilterCursor::new();

        let mut seen = Vec::new();
        while let Some(item) = cursor.next_filter::<ActionPhase>(&filters) {
            seen.push(match item {
                CursorItem::Sync(f) => format!("sync:{}", f.name()),
                CursorItem::Async(_) => "async".to_string(),
            });
        }

        assert_eq!(seen, vec!["sync:first", "async", "sync:last"]);
        assert!(cursor.next_filter::<ActionPhase>(&filters).is_none());
    }

    #[test]
    fn test_reset_restarts_the_walk() {
        let filters = filters();
        let mut cursor = FilterCursor::new();

        assert!(cursor.next_filter::<ActionPhase>(&filters).is_some());
        assert!(cursor.next_filter::<AuthorizationPhase>(&filters).is_none());

        cursor.reset();
        assert!(matches!(
            cursor.next_filter::<ResultPhase>(&filters),
            Some(CursorItem::Sync(_))
        ));
    }

    #[test]
    fn test_always_run_filters_are_result_filters() {
        let filters = filters();
        assert_eq!(filters_of_phase::<ResultPhase>(&filters).len(), 1);
        assert_eq!(filters_of_phase::<AlwaysRunResultPhase>(&filters).len(), 1);
        assert_eq!(filters_of_phase::<ActionPhase>(&filters).len(), 3);
        assert_eq!(AlwaysRunResultPhase::KIND, "Always Run Result Filter");
    }
}
