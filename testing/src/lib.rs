//! # Todosync Testing
//!
//! Testing utilities and helpers for todosync reducers and stores.
//!
//! This crate provides:
//! - [`ReducerTest`]: Given-When-Then harness for pure reducer tests
//! - [`assertions`]: Helpers for inspecting returned effects
//! - [`init_test_tracing`]: Opt-in log output for failing tests
//!
//! ## Example
//!
//! ```ignore
//! use todosync_testing::{assertions, ReducerTest};
//!
//! ReducerTest::new(TodosReducer::default())
//!     .with_env(test_environment())
//!     .given_state(TodosState::default())
//!     .when_action(AppAction::DeleteTodo { id: 1 })
//!     .then_state(|state| assert!(state.pending.contains(&1)))
//!     .then_effects(assertions::assert_has_future_effect)
//!     .run();
//! ```

pub mod reducer_test;

pub use reducer_test::{assertions, ReducerTest};

/// Install a test subscriber honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs anything.
/// Output goes through the test writer so it is captured unless the test
/// fails or `--nocapture` is passed.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
