use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

/// Table of per-key serialization cells.
///
/// Work on one key runs inside [`KeyedLocks::with`]. Distinct keys never share a cell, so
/// work on different entities proceeds in parallel. A cell lives only while some caller
/// holds or waits on it.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    cells: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the cell for `key`.
    pub fn with<T>(&self, key: &K, work: impl FnOnce() -> T) -> T {
        let cell = self.checkout(key);
        let outcome = {
            // A panic inside another caller's `work` leaves nothing behind the cell to repair.
            let _serialized = cell.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        self.release(key, cell);
        outcome
    }

    /// Number of cells currently in the table.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn checkout(&self, key: &K) -> Arc<Mutex<()>> {
        self.table()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, key: &K, cell: Arc<Mutex<()>>) {
        let mut cells = self.table();
        // Clones are only handed out under the table lock: two references mean the table's
        // and ours, so nobody else is holding or waiting on the cell.
        if Arc::strong_count(&cell) == 2 {
            cells.remove(key);
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<K, Arc<Mutex<()>>>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn cells_are_evicted_once_released() {
        let locks = KeyedLocks::new();
        for day in 0..1_000u32 {
            let value = locks.with(&("u1".to_string(), day), || day * 2);
            assert_eq!(value, day * 2);
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let (entered, wait_entered) = mpsc::channel();
        let (finish, wait_finish) = mpsc::channel::<()>();

        let holder = {
            let locks = locks.clone();
            thread::spawn(move || {
                locks.with(&"u1".to_string(), || {
                    entered.send(()).expect("signal entry");
                    wait_finish.recv().expect("release signal");
                });
            })
        };
        wait_entered.recv().expect("holder entered");
        assert_eq!(locks.len(), 1);

        let (done, wait_done) = mpsc::channel();
        let contender = {
            let locks = locks.clone();
            thread::spawn(move || {
                locks.with(&"u1".to_string(), || done.send(()).expect("signal done"));
            })
        };
        assert!(wait_done.recv_timeout(Duration::from_millis(100)).is_err());

        finish.send(()).expect("release holder");
        wait_done
            .recv_timeout(Duration::from_secs(5))
            .expect("contender runs after release");
        holder.join().expect("holder joins");
        contender.join().expect("contender joins");
        assert!(locks.is_empty());
    }

    #[test]
    fn distinct_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let inner = locks.with(&"u1".to_string(), || locks.with(&"u2".to_string(), || 7));
        assert_eq!(inner, 7);
        assert!(locks.is_empty());
    }
}
