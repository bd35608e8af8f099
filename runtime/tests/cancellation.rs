//! Integration tests for cancel-and-replace of `Effect::Cancellable`
//!
//! A banner-style timer: every `Show` replaces the pending `Hide` so only the
//! most recent one ever fires.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::time::Duration;
use todosync_core::effect::{Effect, EffectId};
use todosync_core::{smallvec, SmallVec};
use todosync_core::reducer::Reducer;
use todosync_runtime::Store;

const BANNER: EffectId = EffectId::new("banner");

#[derive(Debug, Clone, PartialEq)]
enum BannerAction {
    Show(&'static str),
    Hide(&'static str),
    Dismiss,
    ShowUncancellable,
}

#[derive(Debug, Clone, Default)]
struct BannerState {
    message: Option<&'static str>,
    hidden: Vec<&'static str>,
}

#[derive(Clone)]
struct BannerReducer;

impl Reducer for BannerReducer {
    type State = BannerState;
    type Action = BannerAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BannerAction::Show(message) => {
                state.message = Some(message);
                smallvec![Effect::Delay {
                    duration: Duration::from_secs(3),
                    action: Box::new(BannerAction::Hide(message)),
                }
                .cancellable(BANNER)]
            },
            BannerAction::Hide(message) => {
                state.hidden.push(message);
                state.message = None;
                smallvec![Effect::None]
            },
            BannerAction::Dismiss => {
                state.message = None;
                smallvec![Effect::Cancel(BANNER)]
            },
            BannerAction::ShowUncancellable => {
                state.message = Some("sequence");
                smallvec![Effect::Sequential(vec![Effect::None]).cancellable(BANNER)]
            },
        }
    }
}

#[tokio::test(start_paused = true)]
async fn newer_timer_replaces_older_one() {
    let store = Store::new(BannerState::default(), BannerReducer, ());

    let mut first = store.send(BannerAction::Show("a")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let mut second = store.send(BannerAction::Show("b")).await.unwrap();

    // The first timer was aborted; its handle settles without firing.
    first.wait().await;
    assert_eq!(store.state(|s| s.message).await, Some("b"));

    // Past the first timer's original deadline, b is still shown.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.state(|s| s.message).await, Some("b"));

    second.wait().await;
    let state = store.state(Clone::clone).await;
    assert_eq!(state.message, None);
    assert_eq!(state.hidden, vec!["b"]);
    assert!(!store.is_effect_live(&BANNER));
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_live_timer() {
    let store = Store::new(BannerState::default(), BannerReducer, ());

    let mut shown = store.send(BannerAction::Show("a")).await.unwrap();
    assert!(store.is_effect_live(&BANNER));

    store.send(BannerAction::Dismiss).await.unwrap();
    shown.wait().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    let state = store.state(Clone::clone).await;
    assert_eq!(state.message, None);
    assert!(state.hidden.is_empty());
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test(start_paused = true)]
async fn timer_fires_when_not_replaced() {
    let store = Store::new(BannerState::default(), BannerReducer, ());

    let mut handle = store.send(BannerAction::Show("only")).await.unwrap();
    handle.wait().await;

    assert_eq!(store.state(|s| s.hidden.clone()).await, vec!["only"]);
}

#[tokio::test]
async fn non_timer_effects_run_uncancelled() {
    let store = Store::new(BannerState::default(), BannerReducer, ());

    let mut handle = store.send(BannerAction::ShowUncancellable).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

    assert!(!store.is_effect_live(&BANNER));
    assert_eq!(store.state(|s| s.message).await, Some("sequence"));
}
