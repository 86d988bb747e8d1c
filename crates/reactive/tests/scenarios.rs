//! End-to-end publish scenarios for realm-reactive.

use realm_reactive::{
    debounce_time, filter, map, with_latest_from, Connection, Distinct, Node, PubBatch, Realm,
    VirtualScheduler,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn collect<T: Clone + 'static>(realm: &Realm, node: Node<T>) -> Rc<RefCell<Vec<T>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    realm.subscribe(node, move |v: &T| seen_clone.borrow_mut().push(v.clone()));
    seen
}

/// Counts projection invocations into `sink`.
fn counting_link(realm: &Realm, source: Node<i32>, sink: Node<i32>, runs: &Rc<RefCell<usize>>) {
    let runs = runs.clone();
    realm.connect(
        Connection::new(sink, move |args, emit| {
            *runs.borrow_mut() += 1;
            if let Some(v) = args.get::<i32>(0) {
                emit.emit(*v);
            }
        })
        .source(source),
    );
}

#[test]
fn test_combine_scenario() {
    let realm = Realm::new();
    let a = realm.cell(1i32);
    let b = realm.cell(2i32);
    let ab = realm.combine(a, b);
    let seen = collect(&realm, ab);

    realm.publish(a, 5);
    assert_eq!(*seen.borrow(), vec![(5, 2)]);
}

#[test]
fn test_with_latest_from_scenario() {
    let realm = Realm::new();
    let src = realm.node::<i32>();
    let latest = realm.cell(10i32);
    let out = realm.pipe(src, with_latest_from(latest));
    let seen = collect(&realm, out);

    realm.publish(latest, 99);
    assert!(seen.borrow().is_empty());

    realm.publish(src, 1);
    assert_eq!(*seen.borrow(), vec![(1, 99)]);
}

#[test]
fn test_conditional_chain_scenario() {
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let b = realm.pipe(a, filter(|v: &i32| v % 2 == 0));
    let c = realm.pipe(b, map(|v: &i32| v * 2));
    let d = realm.pipe(c, map(|v: &i32| v + 1));
    let seen_b = collect(&realm, b);
    let seen_c = collect(&realm, c);
    let seen_d = collect(&realm, d);

    realm.publish(a, 1);
    assert!(seen_b.borrow().is_empty());
    assert!(seen_c.borrow().is_empty());
    assert!(seen_d.borrow().is_empty());

    realm.publish(a, 2);
    assert_eq!(*seen_b.borrow(), vec![2]);
    assert_eq!(*seen_c.borrow(), vec![4]);
    assert_eq!(*seen_d.borrow(), vec![5]);
}

#[test]
fn test_diamond_evaluates_join_once() {
    // a -> b, a -> c, (b, c) -> d
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let b = realm.pipe(a, map(|v: &i32| v + 1));
    let c = realm.pipe(a, map(|v: &i32| v * 10));
    let d = realm.node::<i32>();
    let runs = Rc::new(RefCell::new(0));
    let runs_clone = runs.clone();
    realm.connect(
        Connection::new(d, move |args, emit| {
            *runs_clone.borrow_mut() += 1;
            if let (Some(b), Some(c)) = (args.get::<i32>(0), args.get::<i32>(1)) {
                emit.emit(b + c);
            }
        })
        .source(b)
        .source(c),
    );
    let seen = collect(&realm, d);

    realm.publish(a, 2);
    assert_eq!(*runs.borrow(), 1);
    assert_eq!(*seen.borrow(), vec![23]);
}

#[test]
fn test_pull_sees_value_computed_in_same_pass() {
    // total = a * 2 is a cell; report is triggered by a and pulls total
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let report = realm.node::<i32>();
    let total = realm.cell(0i32);
    realm.connect(
        Connection::new(report, |args, emit| {
            if let Some(total) = args.get::<i32>(1) {
                emit.emit(*total);
            }
        })
        .source(a)
        .pull(total),
    );
    realm.connect(
        Connection::new(total, |args, emit| {
            if let Some(v) = args.get::<i32>(0) {
                emit.emit(v * 2);
            }
        })
        .source(a),
    );
    let seen = collect(&realm, report);

    realm.publish(a, 4);
    assert_eq!(*seen.borrow(), vec![8]);
    assert_eq!(realm.get(total), Some(8));
}

#[test]
fn test_distinct_suppression_keeps_state_and_subscribers_quiet() {
    let realm = Realm::new();
    let cell = realm.node_with(Some(3i32), Distinct::by(|a: &i32, b: &i32| a % 10 == b % 10));
    let seen = collect(&realm, cell);

    realm.publish(cell, 13);
    assert!(seen.borrow().is_empty());
    assert_eq!(realm.get(cell), Some(3));

    realm.publish(cell, 4);
    assert_eq!(*seen.borrow(), vec![4]);
}

#[test]
fn test_non_emission_prunes_exclusive_downstream_only() {
    // a -> gate (declines) -> x; a -> y; (x, y) -> z keeps running through y
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let gate = realm.pipe(a, filter(|_: &i32| false));
    let x = realm.node::<i32>();
    let x_runs = Rc::new(RefCell::new(0));
    counting_link(&realm, gate, x, &x_runs);
    let y = realm.pipe(a, map(|v: &i32| v + 100));
    let z = realm.merge(x, y);
    let seen_x = collect(&realm, x);
    let seen_z = collect(&realm, z);

    realm.publish(a, 1);
    assert_eq!(*x_runs.borrow(), 0);
    assert!(seen_x.borrow().is_empty());
    assert_eq!(*seen_z.borrow(), vec![101]);
}

#[test]
fn test_pub_sub_round_trip_exactly_once() {
    let realm = Realm::new();
    let node = realm.node::<Vec<String>>();
    let seen = collect(&realm, node);

    let payload = vec![String::from("a"), String::from("b")];
    realm.publish(node, payload.clone());
    assert_eq!(*seen.borrow(), vec![payload]);
}

#[test]
fn test_notifications_follow_plan_order() {
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let b = realm.pipe(a, map(|v: &i32| v + 1));
    let order = Rc::new(RefCell::new(Vec::new()));

    let order_b = order.clone();
    realm.subscribe(b, move |_: &i32| order_b.borrow_mut().push("b"));
    let order_a = order.clone();
    realm.subscribe(a, move |_: &i32| order_a.borrow_mut().push("a"));
    let order_single = order.clone();
    realm.singleton_subscribe(a, move |_: &i32| order_single.borrow_mut().push("a-singleton"));
    let order_a2 = order.clone();
    realm.subscribe(a, move |_: &i32| order_a2.borrow_mut().push("a2"));

    realm.publish(a, 1);
    assert_eq!(*order.borrow(), vec!["a", "a2", "a-singleton", "b"]);
}

#[test]
fn test_batch_later_entry_wins() {
    let realm = Realm::new();
    let cell = realm.cell(0i32);
    let seen = collect(&realm, cell);

    realm.publish_all(PubBatch::new().with(cell, 1).with(cell, 2));
    assert_eq!(*seen.borrow(), vec![2]);
    assert_eq!(realm.get(cell), Some(2));
}

#[test]
fn test_nested_publish_is_independent_pass() {
    let realm = Realm::new();
    let clicks = realm.node::<i32>();
    let log = realm.cell(Vec::<i32>::new());
    realm.change_with(log, clicks, |log, click| {
        let mut next = log.clone();
        next.push(*click);
        next
    });

    let handle = realm.clone();
    realm.subscribe(clicks, move |v: &i32| {
        if *v < 3 {
            handle.publish(clicks, v + 1);
        }
    });

    realm.publish(clicks, 1);
    assert_eq!(realm.get(log), Some(vec![1, 2, 3]));
}

#[test]
fn test_cycle_does_not_hang() {
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let b = realm.node::<i32>();
    realm.link(a, b);
    realm.link(b, a);
    let seen = collect(&realm, b);

    realm.publish(a, 1);
    assert_eq!(*seen.borrow(), vec![1]);
}

#[test]
fn test_debounce_with_virtual_scheduler() {
    let scheduler = Rc::new(VirtualScheduler::new());
    let realm = Realm::builder().scheduler(scheduler.clone()).build();
    let query = realm.node::<String>();
    let settled = realm.pipe(
        query,
        (
            map(|q: &String| q.trim().to_string()),
            debounce_time(Duration::from_millis(200)),
        ),
    );
    let seen = collect(&realm, settled);

    for q in ["r", "re", "rea ", "realm "] {
        realm.publish(query, q.to_string());
        scheduler.advance(Duration::from_millis(50));
    }
    assert!(seen.borrow().is_empty());

    scheduler.advance(Duration::from_millis(200));
    assert_eq!(*seen.borrow(), vec![String::from("realm")]);
}

#[test]
fn test_plan_reused_across_publishes() {
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let b = realm.node::<i32>();
    let _ = realm.pipe(a, map(|v: &i32| v + 1));
    let _ = realm.pipe(b, map(|v: &i32| v - 1));

    for i in 0..10 {
        realm.publish(a, i);
        realm.publish_all(PubBatch::new().with(b, i).with(a, i));
        realm.publish_all(PubBatch::new().with(a, i).with(b, i));
    }
    // {a} and {a, b}
    assert_eq!(realm.plan_builds(), 2);
}

#[test]
fn test_subscriber_panic_aborts_remaining_notifications() {
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let b = realm.pipe(a, map(|v: &i32| v + 1));
    realm.subscribe(a, |v: &i32| {
        if *v < 0 {
            panic!("subscriber rejected {}", v);
        }
    });
    let later_a = collect(&realm, a);
    let seen_b = collect(&realm, b);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| realm.publish(a, -1)));
    assert!(result.is_err());
    assert!(later_a.borrow().is_empty());
    assert!(seen_b.borrow().is_empty());

    // No borrow is left behind: the realm keeps working
    realm.publish(a, 1);
    assert_eq!(*later_a.borrow(), vec![1]);
    assert_eq!(*seen_b.borrow(), vec![2]);
}

#[test]
fn test_projection_panic_stops_the_walk() {
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let checked = realm.node::<i32>();
    realm.connect(
        Connection::new(checked, |args, emit| {
            let v = args.get::<i32>(0).copied().unwrap_or_default();
            assert!(v >= 0, "negative input");
            emit.emit(v);
        })
        .source(a),
    );
    let total = realm.cell(0i32);
    realm.change_with(total, checked, |t, v| t + v);
    let seen_a = collect(&realm, a);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| realm.publish(a, -5)));
    assert!(result.is_err());
    assert_eq!(realm.get(total), Some(0));
    assert!(seen_a.borrow().is_empty());

    realm.publish(a, 5);
    assert_eq!(realm.get(total), Some(5));
}

#[test]
#[should_panic(expected = "negative input")]
fn test_projection_panic_propagates_out_of_publish() {
    let realm = Realm::new();
    let a = realm.node::<i32>();
    let b = realm.node::<i32>();
    realm.connect(
        Connection::new(b, |args, emit| {
            let v = args.get::<i32>(0).copied().unwrap_or_default();
            assert!(v >= 0, "negative input");
            emit.emit(v);
        })
        .source(a),
    );
    realm.publish(a, -1);
}
