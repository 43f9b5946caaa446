//! Environment-variable handling for tests.
//!
//! Config loading reads process-wide environment variables, so tests that
//! touch them must not run interleaved. [`EnvGuard`] serializes them and
//! puts every touched variable back on drop.

use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Exclusive access to the process environment for one test body.
pub(crate) struct EnvGuard {
    _lock: MutexGuard<'static, ()>,
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub(crate) fn acquire() -> Self {
        let lock = ENV_MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            _lock: lock,
            saved: Vec::new(),
        }
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) {
        self.remember(key);
        // SAFETY: the guard's mutex keeps env mutation single-threaded.
        unsafe { std::env::set_var(key, value) };
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.remember(key);
        // SAFETY: the guard's mutex keeps env mutation single-threaded.
        unsafe { std::env::remove_var(key) };
    }

    fn remember(&mut self, key: &str) {
        if self.saved.iter().all(|(k, _)| k != key) {
            self.saved.push((key.to_string(), std::env::var(key).ok()));
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..) {
            // SAFETY: still holding the mutex until the struct is gone.
            unsafe {
                match value {
                    Some(v) => std::env::set_var(&key, v),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_touched_variables_on_drop() {
        {
            let mut env = EnvGuard::acquire();
            env.set("CHATBRIDGE_GUARD_TEST_VAR", "inner");
            assert_eq!(
                std::env::var("CHATBRIDGE_GUARD_TEST_VAR").as_deref(),
                Ok("inner")
            );
        }
        assert!(std::env::var("CHATBRIDGE_GUARD_TEST_VAR").is_err());
    }
}
