//! Mount / notify / unmount lifecycle of bound components.
//!
//! Checks the integration contract end to end:
//! - each hook subscribes exactly once per mount, however often it renders
//! - every notification reaches the host as a re-render request
//! - unmount releases exactly once and silences the host

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;
use statebox_bind::{BindError, ComponentScope};
use statebox_core::StateBox;

#[derive(Debug, Clone, PartialEq)]
struct Counter {
    count: i32,
}

/// Host that queues render requests instead of rendering synchronously.
#[derive(Clone, Default)]
struct QueueHost {
    pending: Rc<Cell<u32>>,
}

impl QueueHost {
    fn scope(&self) -> ComponentScope {
        let pending = Rc::clone(&self.pending);
        ComponentScope::new(move || pending.set(pending.get() + 1))
    }

    fn take(&self) -> u32 {
        self.pending.replace(0)
    }
}

// ============================================================================
// useBox
// ============================================================================

#[test]
fn use_box_renders_initial_then_notified_values() {
    let host = QueueHost::default();
    let scope = host.scope();
    let counter = StateBox::new(Counter { count: 0 });
    let render = |scope: &ComponentScope| scope.render(|cx| cx.use_box(&counter));

    assert_eq!(render(&scope).unwrap(), Counter { count: 0 });

    counter.set(|c| Counter { count: c.count + 1 });
    counter.set(|c| Counter { count: c.count + 1 });
    assert_eq!(host.take(), 2);
    assert_eq!(render(&scope).unwrap(), Counter { count: 2 });
    assert_eq!(counter.subscriber_count(), 1);
}

#[test]
fn two_components_share_one_box() {
    let host = QueueHost::default();
    let first = host.scope();
    let second = host.scope();
    let shared = StateBox::new(10);

    first.render(|cx| cx.use_box(&shared)).unwrap();
    second.render(|cx| cx.use_box(&shared)).unwrap();
    assert_eq!(shared.subscriber_count(), 2);

    shared.update(|n| *n += 5);
    assert_eq!(host.take(), 2);
    assert_eq!(first.render(|cx| cx.use_box(&shared)).unwrap(), 15);
    assert_eq!(second.render(|cx| cx.use_box(&shared)).unwrap(), 15);

    drop(first);
    assert_eq!(shared.subscriber_count(), 1);
    shared.replace(0);
    assert_eq!(host.take(), 1);
}

#[test]
fn local_state_is_not_aliased_with_box() {
    let host = QueueHost::default();
    let scope = host.scope();
    let list = StateBox::new(vec![1, 2, 3]);

    let mut shown = scope.render(|cx| cx.use_box(&list)).unwrap();
    shown.push(99);
    assert_eq!(list.get(), vec![1, 2, 3]);
    assert_eq!(scope.render(|cx| cx.use_box(&list)).unwrap(), vec![1, 2, 3]);
}

// ============================================================================
// useDerivedBox / useDerived
// ============================================================================

#[test]
fn use_derived_box_tracks_projection() {
    let host = QueueHost::default();
    let scope = host.scope();
    let counter = StateBox::new(Counter { count: 0 });
    let render = |scope: &ComponentScope| {
        scope.render(|cx| cx.use_derived_box(&counter, |c: &Counter| c.count % 2 == 0))
    };

    assert!(render(&scope).unwrap());
    counter.replace(Counter { count: 5 });
    assert_eq!(host.take(), 1);
    assert!(!render(&scope).unwrap());

    // No dedupe: an unchanged projection still requests a render.
    counter.replace(Counter { count: 7 });
    assert_eq!(host.take(), 1);

    scope.unmount();
    assert_eq!(counter.subscriber_count(), 0);
}

#[test]
fn use_derived_shares_an_existing_derivation() {
    let host = QueueHost::default();
    let scope = host.scope();
    let counter = StateBox::new(Counter { count: 4 });
    let count = counter.derive(|c| c.count);

    assert_eq!(scope.render(|cx| cx.use_derived(&count)).unwrap(), 4);
    assert_eq!(count.subscriber_count(), 1);

    counter.update(|c| c.count = 8);
    assert_eq!(scope.render(|cx| cx.use_derived(&count)).unwrap(), 8);

    scope.unmount();
    assert_eq!(count.subscriber_count(), 0);
    // The derivation itself still forwards from its source.
    assert_eq!(counter.subscriber_count(), 1);
}

// ============================================================================
// Form binding
// ============================================================================

#[test]
fn form_register_round_trip() {
    let host = QueueHost::default();
    let scope = host.scope();
    let login = StateBox::new(BTreeMap::from([
        ("email".to_string(), String::new()),
        ("password".to_string(), String::new()),
    ]));

    let email = scope
        .render(|cx| Ok(cx.use_form(&login)?.register("email")))
        .unwrap();
    assert_eq!(email.value().map(String::as_str), Some(""));

    email.on_change("me@example.com".to_string()).unwrap();
    assert_eq!(host.take(), 1);

    let (email, password) = scope
        .render(|cx| {
            let form = cx.use_form(&login)?;
            Ok((form.register("email"), form.register("password")))
        })
        .unwrap();
    assert_eq!(email.value().map(String::as_str), Some("me@example.com"));
    assert_eq!(password.value().map(String::as_str), Some(""));
    assert_eq!(login.subscriber_count(), 1);
}

#[test]
fn form_change_inside_render_propagates_errors() {
    let host = QueueHost::default();
    let scope = host.scope();
    let settings = StateBox::new(BTreeMap::from([("theme".to_string(), 0u8)]));

    scope
        .render(|cx| {
            let form = cx.use_form(&settings)?;
            form.register("theme").on_change(2)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(settings.get()["theme"], 2);
    assert_eq!(host.take(), 1);
}

// ============================================================================
// Release accounting
// ============================================================================

#[test]
fn release_happens_exactly_once() {
    let host = QueueHost::default();
    let scope = host.scope();
    let source = StateBox::new(0);
    let extra_calls = Rc::new(RefCell::new(0));
    let extra_clone = Rc::clone(&extra_calls);
    let _other = source.subscribe(move |_| *extra_clone.borrow_mut() += 1);

    scope.render(|cx| cx.use_box(&source)).unwrap();
    assert_eq!(source.subscriber_count(), 2);

    scope.unmount();
    scope.unmount();
    drop(scope);

    // Only the unrelated listener remains and keeps working.
    assert_eq!(source.subscriber_count(), 1);
    source.replace(1);
    assert_eq!(*extra_calls.borrow(), 1);
    assert_eq!(host.take(), 0);
}

#[test]
fn render_after_unmount_fails() {
    let host = QueueHost::default();
    let scope = host.scope();
    let source = StateBox::new(0);
    scope.render(|cx| cx.use_box(&source)).unwrap();
    scope.unmount();
    assert_eq!(
        scope.render(|cx| cx.use_box(&source)),
        Err(BindError::Unmounted)
    );
    assert_eq!(source.subscriber_count(), 0);
}

// ============================================================================
// Property: subscriber accounting over random lifecycles
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Mount,
    Render(usize),
    Mutate(i32),
    Unmount(usize),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Mount),
        (0usize..8).prop_map(Step::Render),
        any::<i16>().prop_map(|n| Step::Mutate(i32::from(n))),
        (0usize..8).prop_map(Step::Unmount),
    ]
}

proptest! {
    #[test]
    fn subscriber_count_matches_mounted_scopes(steps in proptest::collection::vec(step_strategy(), 0..40)) {
        let host = QueueHost::default();
        let source = StateBox::new(0);
        let mut scopes: Vec<ComponentScope> = Vec::new();

        for step in steps {
            match step {
                Step::Mount => {
                    let scope = host.scope();
                    scope.render(|cx| cx.use_box(&source)).unwrap();
                    scopes.push(scope);
                }
                Step::Render(i) => {
                    if let Some(scope) = scopes.get(i) {
                        let shown = scope.render(|cx| cx.use_box(&source)).unwrap();
                        prop_assert_eq!(shown, source.get());
                        prop_assert!(!scope.needs_render());
                    }
                }
                Step::Mutate(n) => {
                    host.take();
                    source.replace(n);
                    prop_assert_eq!(host.take() as usize, scopes.len());
                }
                Step::Unmount(i) => {
                    if i < scopes.len() {
                        scopes.remove(i).unmount();
                    }
                }
            }
            prop_assert_eq!(source.subscriber_count(), scopes.len());
        }
    }
}
