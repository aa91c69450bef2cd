//! Event ordering of the native engine, driven by hand.

use historial_codec::Value;
use historial_core::native::{Connection, ReadyState};
use historial_core::{Direction, Factory, Key, TransactionMode, TransactionPhase};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

fn open_items(factory: &Factory, log: &Log) -> Connection {
    let open = factory.open_database("inventory", 1);
    let upgrade_log = Rc::clone(log);
    open.set_on_upgrade_needed(move |event| {
        push(
            &upgrade_log,
            format!("upgrade {}->{}", event.old_version(), event.new_version()),
        );
        let items = event.connection().create_object_store("items", None)?;
        items.create_index("by_code", "code", true)?;
        Ok(())
    });
    let success_log = Rc::clone(log);
    open.set_on_success(move |_| push(&success_log, "open success"));
    factory.events().run_pending();
    assert_eq!(open.ready_state(), ReadyState::Done);
    open.take_result().unwrap()
}

fn item(code: i64) -> Value {
    Value::map([("code", Value::from(code))])
}

#[test]
fn upgrade_needed_fires_before_open_success() {
    let factory = Factory::in_memory();
    let log = Log::default();
    let connection = open_items(&factory, &log);

    assert_eq!(*log.borrow(), ["upgrade 0->1", "open success"]);
    assert_eq!(connection.version(), 1);
    assert_eq!(connection.object_store_names(), vec!["items".to_string()]);
}

#[test]
fn failed_request_fires_request_error_then_transaction_error_then_abort() {
    let factory = Factory::in_memory();
    let log = Log::default();
    let connection = open_items(&factory, &log);
    log.borrow_mut().clear();

    let txn = connection
        .transaction(&["items"], TransactionMode::ReadWrite)
        .unwrap();
    let (l1, l2, l3, l4) = (log.clone(), log.clone(), log.clone(), log.clone());
    txn.set_on_error(move |_| push(&l1, "transaction error"));
    txn.set_on_abort(move || push(&l2, "abort"));
    txn.set_on_complete(move || push(&l3, "complete"));

    let items = txn.object_store("items").unwrap();
    let first = items.put(item(7), Some(Key::from(1i64))).unwrap();
    let clash = items.put(item(7), Some(Key::from(2i64))).unwrap();
    clash.set_on_error(move |_| push(&l4, "request error"));
    factory.events().run_pending();

    assert_eq!(*log.borrow(), ["request error", "transaction error", "abort"]);
    assert_eq!(first.take_result(), Some(Key::from(1i64)));
    assert!(clash.error().is_some());
    assert_eq!(txn.phase(), TransactionPhase::Aborted);
    assert!(txn.error().is_some());
}

#[test]
fn cursor_request_succeeds_once_per_step() {
    let factory = Factory::in_memory();
    let connection = open_items(&factory, &Log::default());

    let writer = connection
        .transaction(&["items"], TransactionMode::ReadWrite)
        .unwrap();
    let items = writer.object_store("items").unwrap();
    for n in [3, 1, 2] {
        items.put(item(n * 10), Some(Key::from(n))).unwrap();
    }
    writer.commit().unwrap();
    factory.events().run_pending();
    assert_eq!(writer.phase(), TransactionPhase::Committed);

    let reader = connection
        .transaction(&["items"], TransactionMode::ReadOnly)
        .unwrap();
    let request = reader
        .object_store("items")
        .unwrap()
        .open_cursor(None, Direction::Next)
        .unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let successes = Rc::new(RefCell::new(0));
    let (walk, count) = (Rc::clone(&seen), Rc::clone(&successes));
    request.set_on_success(move |request| {
        *count.borrow_mut() += 1;
        if let Some(Some(cursor)) = request.result() {
            walk.borrow_mut().push(cursor.primary_key().clone());
            cursor.continue_().unwrap();
        }
    });
    factory.events().run_pending();

    assert_eq!(*seen.borrow(), vec![Key::from(1i64), Key::from(2i64), Key::from(3i64)]);
    assert_eq!(*successes.borrow(), 4);
}

#[test]
fn uncommitted_writes_stay_invisible_to_other_transactions() {
    let factory = Factory::in_memory();
    let connection = open_items(&factory, &Log::default());

    let writer = connection
        .transaction(&["items"], TransactionMode::ReadWrite)
        .unwrap();
    writer
        .object_store("items")
        .unwrap()
        .put(item(1), Some(Key::from(1i64)))
        .unwrap();
    factory.events().run_pending();

    let reader = connection
        .transaction(&["items"], TransactionMode::ReadOnly)
        .unwrap();
    let count = reader.object_store("items").unwrap().count(None).unwrap();
    factory.events().run_pending();
    assert_eq!(count.take_result(), Some(0));

    writer.commit().unwrap();
    factory.events().run_pending();
    let later = connection
        .transaction(&["items"], TransactionMode::ReadOnly)
        .unwrap();
    let count = later.object_store("items").unwrap().count(None).unwrap();
    factory.events().run_pending();
    assert_eq!(count.take_result(), Some(1));
}

#[test]
fn schema_changes_outside_upgrade_are_rejected() {
    let factory = Factory::in_memory();
    let connection = open_items(&factory, &Log::default());
    assert!(connection.create_object_store("other", None).is_err());

    let txn = connection
        .transaction(&["items"], TransactionMode::ReadWrite)
        .unwrap();
    let items = txn.object_store("items").unwrap();
    assert!(items.create_index("by_name", "name", false).is_err());
    assert!(txn.object_store("missing").is_err());
}
