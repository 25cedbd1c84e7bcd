//! Combinator semantics: verdict joins, short-circuiting and fragments

use authz_shield::constructors::{allow, and, chain, deny, not, not_with_message, or, race, rule};
use authz_shield::{
    Payload, Reason, RequestCache, RuleOptions, RuleRef, RuleResult, ShieldOptions, Verdict,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Leaf that records its invocations and settles with `result`
fn recorded(result: RuleResult, calls: &Arc<AtomicUsize>) -> RuleRef {
    let calls = Arc::clone(calls);
    rule(None, RuleOptions::new(), move |_| {
        let calls = Arc::clone(&calls);
        let result = result.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(result)
        }
    })
}

/// Leaf that settles with `result` after `delay_ms`
fn delayed(result: RuleResult, delay_ms: u64) -> RuleRef {
    rule(None, RuleOptions::new(), move |_| {
        let result = result.clone();
        async move {
            sleep(Duration::from_millis(delay_ms)).await;
            Ok(result)
        }
    })
}

async fn resolve(rule: &RuleRef) -> Verdict {
    rule.resolve(
        &Arc::new(Payload::default()),
        &RequestCache::new(),
        &ShieldOptions::default(),
    )
    .await
    .unwrap()
}

// ============================================================================
// PARALLEL COMBINATORS
// ============================================================================

#[tokio::test]
async fn test_and_denies_on_any_false() {
    assert_eq!(resolve(&and(vec![allow(), allow(), deny()])).await, Verdict::Denied);
    assert_eq!(resolve(&and(vec![allow(), allow()])).await, Verdict::Authorized);
}

#[tokio::test]
async fn test_or_authorizes_on_any_true() {
    assert_eq!(resolve(&or(vec![deny(), deny(), allow()])).await, Verdict::Authorized);
    assert_eq!(resolve(&or(vec![deny(), deny()])).await, Verdict::Denied);
}

#[tokio::test]
async fn test_and_evaluates_every_child() {
    let calls = Arc::new(AtomicUsize::new(0));
    let tree = and(vec![
        recorded(RuleResult::from(false), &calls),
        recorded(RuleResult::from(true), &calls),
        recorded(RuleResult::from(true), &calls),
    ]);

    assert_eq!(resolve(&tree).await, Verdict::Denied);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_and_reason_follows_declaration_order_not_completion_order() {
    // The second child settles first; the first child's reason still wins
    let tree = and(vec![
        delayed(RuleResult::from("slow reason"), 40),
        delayed(RuleResult::from("fast reason"), 1),
    ]);

    let verdict = resolve(&tree).await;
    assert_eq!(verdict.reason().unwrap().message(), "slow reason");
}

#[tokio::test]
async fn test_or_reason_follows_declaration_order() {
    let tree = or(vec![
        deny(),
        delayed(RuleResult::from("first"), 30),
        delayed(RuleResult::from("second"), 1),
    ]);

    let verdict = resolve(&tree).await;
    assert_eq!(verdict.reason().unwrap().message(), "first");
}

#[tokio::test]
async fn test_and_children_overlap() {
    let started = std::time::Instant::now();
    let tree = and(vec![
        delayed(RuleResult::from(true), 50),
        delayed(RuleResult::from(true), 50),
        delayed(RuleResult::from(true), 50),
    ]);

    assert_eq!(resolve(&tree).await, Verdict::Authorized);
    assert!(started.elapsed() < Duration::from_millis(140));
}

// ============================================================================
// SEQUENTIAL COMBINATORS
// ============================================================================

#[tokio::test]
async fn test_chain_never_evaluates_after_denial() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let tree = chain(vec![
        recorded(RuleResult::from(false), &first),
        recorded(RuleResult::from(true), &second),
    ]);

    assert_eq!(resolve(&tree).await, Verdict::Denied);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chain_stops_at_middle_denial() {
    let third = Arc::new(AtomicUsize::new(0));
    let tree = chain(vec![
        allow(),
        deny(),
        recorded(RuleResult::from(true), &third),
    ]);

    assert_eq!(resolve(&tree).await, Verdict::Denied);
    assert_eq!(third.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chain_keeps_denial_reason() {
    let tree = chain(vec![allow(), not_with_message(allow(), "Not editable")]);

    let verdict = resolve(&tree).await;
    assert_eq!(verdict.reason().unwrap().message(), "Not editable");
}

#[tokio::test]
async fn test_race_evaluates_until_authorized() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let tree = race(vec![
        recorded(RuleResult::from(false), &first),
        recorded(RuleResult::from(true), &second),
    ]);

    assert_eq!(resolve(&tree).await, Verdict::Authorized);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_race_never_evaluates_after_authorization() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let tree = race(vec![
        recorded(RuleResult::from(true), &first),
        recorded(RuleResult::from(false), &second),
    ]);

    assert_eq!(resolve(&tree).await, Verdict::Authorized);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_race_reports_last_reason_when_all_deny() {
    let tree = race(vec![
        deny(),
        recorded(RuleResult::from("No token"), &Arc::new(AtomicUsize::new(0))),
        recorded(RuleResult::from("Expired"), &Arc::new(AtomicUsize::new(0))),
    ]);

    let verdict = resolve(&tree).await;
    assert_eq!(verdict.reason().unwrap().message(), "Expired");
}

#[tokio::test]
async fn test_sequential_children_never_overlap() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));

    let tracked = || {
        let in_flight = Arc::clone(&in_flight);
        let overlapped = Arc::clone(&overlapped);
        rule(None, RuleOptions::new(), move |_| {
            let in_flight = Arc::clone(&in_flight);
            let overlapped = Arc::clone(&overlapped);
            async move {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.fetch_add(1, Ordering::SeqCst);
                }
                sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(RuleResult::from(true))
            }
        })
    };

    let tree = chain(vec![tracked(), tracked(), tracked()]);
    assert_eq!(resolve(&tree).await, Verdict::Authorized);
    assert_eq!(overlapped.load(Ordering::SeqCst), 0);
}

// ============================================================================
// NEGATION
// ============================================================================

#[tokio::test]
async fn test_not() {
    assert_eq!(resolve(&not(deny(), None)).await, Verdict::Authorized);
    assert_eq!(resolve(&not(allow(), None)).await, Verdict::Denied);

    let reasoned = rule(None, RuleOptions::new(), |_| async {
        Ok(RuleResult::from(Reason::msg("Suspended")))
    });
    assert_eq!(resolve(&not(reasoned, None)).await, Verdict::Authorized);
}

#[tokio::test]
async fn test_not_with_custom_error() {
    let error = Reason::msg("Only non-admins may vote");
    let verdict = resolve(&not(allow(), Some(error.clone()))).await;

    assert!(verdict.reason().unwrap().ptr_eq(&error));
}

#[tokio::test]
async fn test_not_of_raised_error_authorizes() {
    let raising = rule(None, RuleOptions::new(), |_| async {
        Err(anyhow::anyhow!("service unavailable"))
    });

    assert_eq!(resolve(&not(raising, None)).await, Verdict::Authorized);
}

// ============================================================================
// ERROR PROPAGATION
// ============================================================================

#[tokio::test]
async fn test_debug_failure_aborts_whole_tree() {
    let raising = rule(Some("raising"), RuleOptions::new(), |_| async {
        Err(anyhow::anyhow!("boom"))
    });
    let tree = or(vec![allow(), chain(vec![allow(), raising])]);
    let options = ShieldOptions::builder().debug(true).build();

    let result = tree
        .resolve(&Arc::new(Payload::default()), &RequestCache::new(), &options)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_failure_is_a_verdict_without_debug() {
    let raising = rule(Some("raising"), RuleOptions::new(), |_| async {
        Err(anyhow::anyhow!("boom"))
    });
    let tree = and(vec![allow(), raising]);

    assert_eq!(resolve(&tree).await.reason().unwrap().message(), "boom");
}

// ============================================================================
// FRAGMENTS
// ============================================================================

#[test]
fn test_fragments_aggregate_in_child_order_with_duplicates() {
    let fragment = |text: &str| {
        rule(None, RuleOptions::new().with_fragment(text), |_| async {
            Ok(RuleResult::from(true))
        })
    };

    let tree = and(vec![
        fragment("fragment A on Post { author }"),
        or(vec![allow(), fragment("fragment B on Post { status }")]),
        chain(vec![fragment("fragment A on Post { author }")]),
        race(vec![deny(), fragment("")]),
        not(fragment("fragment C on Post { id }"), None),
    ]);

    assert_eq!(
        tree.extract_fragments(),
        vec![
            "fragment A on Post { author }",
            "fragment B on Post { status }",
            "fragment A on Post { author }",
            "fragment C on Post { id }",
        ]
    );
}
