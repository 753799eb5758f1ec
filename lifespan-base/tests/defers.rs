use lifespan_base::defer;
use std::sync::{Arc, Mutex};

#[test]
fn test_defer_runs_on_scope_exit() {
    let executed = Arc::new(Mutex::new(false));
    {
        let executed = executed.clone();
        let _guard = defer(move || {
            *executed.lock().unwrap() = true;
        });
    }
    assert!(*executed.lock().unwrap());
}

#[test]
fn test_defer_macro_block() {
    let counter = Arc::new(Mutex::new(0));
    {
        let counter = counter.clone();
        defer! {
            *counter.lock().unwrap() += 1;
            *counter.lock().unwrap() += 1;
        };
        assert_eq!(*counter.lock().unwrap(), 0);
    }
    assert_eq!(*counter.lock().unwrap(), 2);
}

#[test]
fn test_defer_macro_single_expression() {
    let counter = Arc::new(Mutex::new(0));
    {
        defer!(*counter.lock().unwrap() += 1);
        assert_eq!(*counter.lock().unwrap(), 0);
    }
    assert_eq!(*counter.lock().unwrap(), 1);
}

#[test]
fn test_defers_run_in_reverse_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    {
        defer!(order.lock().unwrap().push(1));
        defer!(order.lock().unwrap().push(2));
        defer!(order.lock().unwrap().push(3));
        assert!(order.lock().unwrap().is_empty());
    }
    assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
}

#[test]
fn test_defer_runs_on_early_return() {
    fn work(order: &Mutex<Vec<&'static str>>, fail: bool) -> Result<(), ()> {
        defer!(order.lock().unwrap().push("cleanup"));
        if fail {
            return Err(());
        }
        order.lock().unwrap().push("done");
        Ok(())
    }

    let order = Mutex::new(Vec::new());
    assert!(work(&order, true).is_err());
    assert!(work(&order, false).is_ok());
    assert_eq!(*order.lock().unwrap(), vec!["cleanup", "done", "cleanup"]);
}

#[test]
fn test_defer_runs_while_unwinding() {
    let executed = Arc::new(Mutex::new(false));
    let result = std::panic::catch_unwind({
        let executed = executed.clone();
        move || {
            defer!(*executed.lock().unwrap() = true);
            panic!("boom");
        }
    });
    assert!(result.is_err());
    assert!(*executed.lock().unwrap());
}

#[test]
fn test_defer_explicit_drop() {
    let executed = Arc::new(Mutex::new(false));
    let guard = defer({
        let executed = executed.clone();
        move || *executed.lock().unwrap() = true
    });
    assert!(!*executed.lock().unwrap());
    drop(guard);
    assert!(*executed.lock().unwrap());
}
