//! Reducer composition utilities
//!
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`scope_reducer`**: Focus a reducer on a subset of state
//!
//! A feature reducer usually owns one slice of the application state. Scope it
//! onto that slice, then combine the scoped reducers so every one of them sees
//! every action:
//!
//! ```
//! use todosync_core::composition::{combine_reducers, scope_reducer};
//! use todosync_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Default)]
//! struct Session { user: Option<String> }
//!
//! #[derive(Clone, Default)]
//! struct App { session: Session, visits: u32 }
//!
//! #[derive(Clone)]
//! enum Action { Login(String) }
//!
//! struct SessionReducer;
//!
//! impl Reducer for SessionReducer {
//!     type State = Session;
//!     type Action = Action;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut Session, action: Action, _env: &()) -> SmallVec<[Effect<Action>; 4]> {
//!         let Action::Login(name) = action;
//!         state.user = Some(name);
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let app = combine_reducers(vec![Box::new(scope_reducer(
//!     SessionReducer,
//!     |app: &App| &app.session,
//!     |app: &mut App, session| app.session = session,
//! ))]);
//!
//! let mut state = App::default();
//! let _ = app.reduce(&mut state, Action::Login("ada".into()), &());
//! assert_eq!(state.session.user.as_deref(), Some("ada"));
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use smallvec::SmallVec;

/// Boxed reducer that can live inside a shared store
pub type BoxedReducer<S, A, E> = Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence, and all effects are collected and concatenated.
#[must_use]
pub fn combine_reducers<S, A, E>(reducers: Vec<BoxedReducer<S, A, E>>) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<BoxedReducer<S, A, E>>,
}

impl<S, A, E> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    /// Number of reducers in the combination
    #[must_use]
    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    /// Returns true if no reducers were combined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut all_effects = SmallVec::new();

        for reducer in &self.reducers {
            let effects = reducer.reduce(state, action.clone(), env);
            all_effects.extend(effects.into_iter().filter(|effect| !effect.is_none()));
        }

        all_effects
    }
}

/// Scopes a reducer to operate on a subset of a larger state.
///
/// `get_state` borrows the slice, `set_state` writes the updated slice back.
pub fn scope_reducer<S, SubS, A, E, R>(
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
) -> ScopedReducer<S, SubS, A, E, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    E: 'static,
    R: Reducer<State = SubS, Action = A, Environment = E>,
{
    ScopedReducer {
        reducer,
        get_state,
        set_state,
        _phantom: std::marker::PhantomData,
    }
}

/// A scoped reducer that operates on a subset of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, A, E, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    E: 'static,
    R: Reducer<State = SubS, Action = A, Environment = E>,
{
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
    _phantom: std::marker::PhantomData<fn() -> (A, E)>,
}

impl<S, SubS, A, E, R> Reducer for ScopedReducer<S, SubS, A, E, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    E: 'static,
    R: Reducer<State = SubS, Action = A, Environment = E>,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut sub_state = (self.get_state)(state).clone();
        let effects = self.reducer.reduce(&mut sub_state, action, env);
        (self.set_state)(state, sub_state);
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smallvec;

    #[derive(Clone, Default)]
    struct Counter {
        value: i32,
    }

    #[derive(Clone, Default)]
    struct Parent {
        left: Counter,
        right: Counter,
        label: String,
    }

    #[derive(Clone)]
    enum TestAction {
        Bump(i32),
        Label(String),
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = Counter;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            if let TestAction::Bump(n) = action {
                state.value += n;
            }
            smallvec![Effect::None]
        }
    }

    struct LabelReducer;

    impl Reducer for LabelReducer {
        type State = Parent;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Label(label) => {
                    state.label = label;
                    smallvec![Effect::Delay {
                        duration: std::time::Duration::from_millis(1),
                        action: Box::new(TestAction::Bump(0)),
                    }]
                },
                TestAction::Bump(_) => smallvec![Effect::None],
            }
        }
    }

    #[test]
    fn scoped_reducer_only_touches_its_slice() {
        let scoped = scope_reducer(
            CounterReducer,
            |parent: &Parent| &parent.left,
            |parent: &mut Parent, left| parent.left = left,
        );

        let mut state = Parent::default();
        let _ = scoped.reduce(&mut state, TestAction::Bump(3), &());

        assert_eq!(state.left.value, 3);
        assert_eq!(state.right.value, 0);
    }

    #[test]
    fn combined_reducers_all_see_every_action() {
        let combined = combine_reducers(vec![
            Box::new(scope_reducer(
                CounterReducer,
                |parent: &Parent| &parent.left,
                |parent: &mut Parent, left| parent.left = left,
            )),
            Box::new(scope_reducer(
                CounterReducer,
                |parent: &Parent| &parent.right,
                |parent: &mut Parent, right| parent.right = right,
            )),
            Box::new(LabelReducer),
        ]);
        assert_eq!(combined.len(), 3);

        let mut state = Parent::default();
        let effects = combined.reduce(&mut state, TestAction::Bump(2), &());
        assert_eq!(state.left.value, 2);
        assert_eq!(state.right.value, 2);
        assert!(effects.is_empty(), "no-op effects are dropped");

        let effects = combined.reduce(&mut state, TestAction::Label("x".into()), &());
        assert_eq!(state.label, "x");
        assert_eq!(effects.len(), 1);
    }
}
