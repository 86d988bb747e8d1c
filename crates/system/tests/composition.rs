//! Integration tests for composing systems into a labeled realm.

use realm_reactive::{debounce_time, map, Node, Realm, VirtualScheduler};
use realm_system::{compose, realm_factory, system, Error, KeyBatch, Labels, System};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// A shared "core" system exposing a document cell and a change event.
fn core_system(constructed: &Rc<RefCell<usize>>) -> System {
    let constructed = constructed.clone();
    system("core", vec![], move |realm, _| {
        *constructed.borrow_mut() += 1;
        let document = realm.cell(String::new());
        let insert = realm.node::<String>();
        realm.change_with(document, insert, |doc, text| format!("{}{}", doc, text));
        Ok(Labels::new()
            .with("document", document)
            .with("insert", insert))
    })
}

#[test]
fn test_diamond_dependency_constructed_once() {
    let constructed = Rc::new(RefCell::new(0));
    let core = core_system(&constructed);

    let word_count = system("word_count", vec![core.clone()], |realm, deps| {
        let document: Node<String> = deps[0].node("document")?;
        let words = realm.pipe(document, map(|d: &String| d.split_whitespace().count()));
        Ok(Labels::new().with("words", words))
    });
    let length = system("length", vec![core.clone()], |realm, deps| {
        let document: Node<String> = deps[0].node("document")?;
        let chars = realm.pipe(document, map(|d: &String| d.chars().count()));
        Ok(Labels::new().with("chars", chars))
    });

    let runtime = realm_factory(&[word_count, length]).unwrap();
    assert_eq!(*constructed.borrow(), 1);
    assert_eq!(runtime.labels().len(), 4);

    let words = Rc::new(RefCell::new(Vec::new()));
    let words_clone = words.clone();
    runtime
        .sub_key("words", move |n: &usize| words_clone.borrow_mut().push(*n))
        .unwrap();

    runtime.pub_key("insert", String::from("hello world")).unwrap();
    assert_eq!(*words.borrow(), vec![2]);
    assert_eq!(
        runtime.get_key_value::<String>("document").unwrap().as_deref(),
        Some("hello world")
    );
}

#[test]
fn test_missing_label_fails_before_state_change() {
    let constructed = Rc::new(RefCell::new(0));
    let runtime = realm_factory(&[core_system(&constructed)]).unwrap();

    let notified = Rc::new(RefCell::new(0));
    let notified_clone = notified.clone();
    runtime
        .sub_key("document", move |_: &String| *notified_clone.borrow_mut() += 1)
        .unwrap();

    let err = runtime.pub_key("nonexistent", 1).unwrap_err();
    assert_eq!(err, Error::missing_label("nonexistent"));

    let batch = KeyBatch::new()
        .with("insert", String::from("lost"))
        .with("nonexistent", 1);
    assert!(runtime.pub_keys(batch).unwrap_err().is_missing_label());

    assert_eq!(*notified.borrow(), 0);
    assert_eq!(
        runtime.get_key_value::<String>("document").unwrap().as_deref(),
        Some("")
    );
}

#[test]
fn test_dependency_pulled_in_transitively() {
    let constructed = Rc::new(RefCell::new(0));
    let core = core_system(&constructed);
    let toolbar = system("toolbar", vec![core], |realm, deps| {
        let insert: Node<String> = deps[0].node("insert")?;
        let bold = realm.node::<()>();
        realm.connect(
            realm_reactive::Connection::new(insert, |_, emit| emit.emit(String::from("**")))
                .source(bold),
        );
        Ok(Labels::new().with("bold", bold))
    });

    let runtime = realm_factory(&[toolbar]).unwrap();
    assert!(runtime.labels().contains("document"));

    runtime.pub_key("bold", ()).unwrap();
    assert_eq!(
        runtime.get_key_value::<String>("document").unwrap().as_deref(),
        Some("**")
    );
}

#[test]
fn test_compose_with_custom_scheduler() {
    let scheduler = Rc::new(VirtualScheduler::new());
    let realm = Realm::builder().scheduler(scheduler.clone()).build();
    let autosave = system("autosave", vec![], |realm, _| {
        let edits = realm.node::<u32>();
        let save = realm.pipe(edits, debounce_time(Duration::from_millis(500)));
        Ok(Labels::new().with("edits", edits).with("save", save))
    });

    let runtime = compose(realm, &[autosave]).unwrap();
    let saves = Rc::new(RefCell::new(Vec::new()));
    let saves_clone = saves.clone();
    runtime
        .sub_key("save", move |v: &u32| saves_clone.borrow_mut().push(*v))
        .unwrap();

    for edit in 1..=3u32 {
        runtime.pub_key("edits", edit).unwrap();
    }
    scheduler.advance(Duration::from_millis(500));
    assert_eq!(*saves.borrow(), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_default_realm_runs_timers() {
    let search = system("search", vec![], |realm, _| {
        let query = realm.node::<u32>();
        let settled = realm.pipe(query, debounce_time(Duration::from_millis(50)));
        Ok(Labels::new().with("query", query).with("settled", settled))
    });

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let runtime = realm_factory(&[search]).unwrap();
            let settled = Rc::new(RefCell::new(Vec::new()));
            let settled_clone = settled.clone();
            runtime
                .sub_key("settled", move |v: &u32| settled_clone.borrow_mut().push(*v))
                .unwrap();

            runtime.pub_key("query", 6u32).unwrap();
            runtime.pub_key("query", 7u32).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(settled.borrow().is_empty());

            tokio::time::sleep(Duration::from_millis(60)).await;
            assert_eq!(*settled.borrow(), vec![7]);
        })
        .await;
}

#[test]
fn test_wrong_value_type_is_rejected() {
    let constructed = Rc::new(RefCell::new(0));
    let runtime = realm_factory(&[core_system(&constructed)]).unwrap();

    let err = runtime.pub_key("insert", 42u64).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
    assert!(runtime.node::<String>("insert").is_ok());
}
