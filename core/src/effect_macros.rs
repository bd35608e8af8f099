//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use todosync_core::async_effect;
///
/// async_effect! {
///     match gateway.list_todos(user_id).await {
///         Ok(todos) => Some(Action::TodosLoaded { user_id, todos }),
///         Err(error) => Some(Action::LoadTodosFailed { user_id, reason: error.to_string() }),
///     }
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use todosync_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(3),
///     action: Action::ErrorExpired { generation }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Create an `Effect::Cancellable` that replaces any live effect with the same id
///
/// # Example
///
/// ```rust,ignore
/// use todosync_core::{cancellable, delay};
///
/// cancellable! {
///     id: ERROR_TIMER,
///     effect: delay! { duration: Duration::from_secs(3), action: Action::ErrorExpired { generation } }
/// }
/// ```
#[macro_export]
macro_rules! cancellable {
    (
        id: $id:expr,
        effect: $effect:expr
    ) => {
        $crate::effect::Effect::Cancellable {
            id: $id,
            effect: ::std::boxed::Box::new($effect),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::{Effect, EffectId};
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        Loaded { count: usize },
        Expired,
    }

    #[test]
    fn async_effect_builds_future() {
        let effect = async_effect! {
            Some(TestAction::Loaded { count: 2 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[tokio::test]
    async fn async_effect_future_yields_action() {
        let effect: Effect<TestAction> = async_effect! {
            Some(TestAction::Loaded { count: 7 })
        };

        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! always builds a future");
        };
        assert!(matches!(fut.await, Some(TestAction::Loaded { count: 7 })));
    }

    #[test]
    fn delay_macro_builds_delay() {
        let effect = delay! {
            duration: Duration::from_secs(3),
            action: TestAction::Expired
        };

        assert!(matches!(effect, Effect::Delay { duration, .. } if duration == Duration::from_secs(3)));
    }

    #[test]
    fn cancellable_macro_wraps_effect() {
        let effect = cancellable! {
            id: EffectId::new("banner"),
            effect: delay! { duration: Duration::from_millis(10), action: TestAction::Expired }
        };

        assert!(matches!(effect, Effect::Cancellable { ref id, .. } if id.as_str() == "banner"));
    }
}
