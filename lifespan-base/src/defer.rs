/// Guard returned by [`defer`]. Runs its closure exactly once when dropped,
/// including while unwinding.
#[must_use = "the closure runs as soon as the guard is dropped"]
pub struct Deferred<F>
where
    F: FnOnce(),
{
    action: Option<F>,
}

impl<F> Drop for Deferred<F>
where
    F: FnOnce(),
{
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

pub fn defer<F>(action: F) -> Deferred<F>
where
    F: FnOnce(),
{
    Deferred {
        action: Some(action),
    }
}

/// Runs the given statements when the enclosing block exits.
///
/// ```rust
/// use lifespan_base::defer;
///
/// let mut log = Vec::new();
/// {
///     defer! {
///         println!("leaving");
///     };
///     log.push("inside");
/// }
/// assert_eq!(log, ["inside"]);
/// ```
#[macro_export]
macro_rules! defer {
    ($e:expr) => {
        let _deferred = $crate::defer(|| $e);
    };
    ($($data: tt)*) => {
        $crate::defer!({ $($data)* });
    };
}
