use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::Keyed;

/// Snapshot of both sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerCounts {
    pub remaining: usize,
    pub running: usize,
}

struct Sets<T> {
    remain: HashMap<String, Arc<T>>,
    run: HashMap<String, Arc<T>>,
}

/// Tracks unfinished tasks in two disjoint sets, *remaining* and *running*.
///
/// - 各遷移は 1 つのロックの中で完結する（両方の集合に同時に入ることはない）
/// - ロック中に await しない
pub struct MappedTaskManager<T: Keyed> {
    sets: Mutex<Sets<T>>,
}

impl<T: Keyed> Default for MappedTaskManager<T> {
    fn default() -> Self {
        Self {
            sets: Mutex::new(Sets {
                remain: HashMap::new(),
                run: HashMap::new(),
            }),
        }
    }
}

impl<T: Keyed> MappedTaskManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_remain(&self, task: Arc<T>) {
        let mut sets = self.sets.lock();
        let key = task.key().to_string();
        sets.run.remove(&key);
        sets.remain.insert(key, task);
    }

    /// Moves an arbitrary remaining task into running.
    pub fn pop_remain_and_add_run(&self) -> Option<Arc<T>> {
        let mut sets = self.sets.lock();
        let key = sets.remain.keys().next()?.clone();
        let task = sets.remain.remove(&key)?;
        sets.run.insert(key, Arc::clone(&task));
        Some(task)
    }

    pub fn remove_run(&self, task: &T) -> bool {
        self.sets.lock().run.remove(task.key()).is_some()
    }

    /// Moves a running task back into remaining (retry).
    pub fn remove_run_and_push_remain(&self, task: &T) -> bool {
        let mut sets = self.sets.lock();
        match sets.run.remove(task.key()) {
            Some(task) => {
                sets.remain.insert(task.key().to_string(), task);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        let sets = self.sets.lock();
        sets.remain.is_empty() && sets.run.is_empty()
    }

    /// Number of unfinished tasks across both sets.
    pub fn size(&self) -> usize {
        let sets = self.sets.lock();
        sets.remain.len() + sets.run.len()
    }

    pub fn counts(&self) -> ManagerCounts {
        let sets = self.sets.lock();
        ManagerCounts {
            remaining: sets.remain.len(),
            running: sets.run.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[derive(Debug)]
    struct Item(String);

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.0
        }
    }

    fn item(n: usize) -> Arc<Item> {
        Arc::new(Item(format!("1-0-{n}")))
    }

    #[test]
    fn transitions_keep_sets_disjoint() {
        let m = MappedTaskManager::new();
        m.push_remain(item(1));
        m.push_remain(item(2));
        assert_eq!(m.counts(), ManagerCounts { remaining: 2, running: 0 });

        let a = m.pop_remain_and_add_run().unwrap();
        assert_eq!(m.counts(), ManagerCounts { remaining: 1, running: 1 });
        assert_eq!(m.size(), 2);

        assert!(m.remove_run_and_push_remain(&a));
        assert!(!m.remove_run_and_push_remain(&a));
        assert_eq!(m.counts(), ManagerCounts { remaining: 2, running: 0 });

        let a = m.pop_remain_and_add_run().unwrap();
        let b = m.pop_remain_and_add_run().unwrap();
        assert!(m.pop_remain_and_add_run().is_none());
        assert_ne!(a.key(), b.key());

        assert!(m.remove_run(&a));
        assert!(!m.remove_run(&a));
        assert!(m.remove_run(&b));
        assert!(m.is_empty());
    }

    #[test]
    fn pushing_a_running_key_moves_it_back() {
        let m = MappedTaskManager::new();
        m.push_remain(item(1));
        let a = m.pop_remain_and_add_run().unwrap();
        m.push_remain(a);
        assert_eq!(m.counts(), ManagerCounts { remaining: 1, running: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn random_interleavings_drain_to_zero() {
        const TASKS: usize = 200;
        let m = Arc::new(MappedTaskManager::new());
        for n in 0..TASKS {
            m.push_remain(item(n));
        }

        let mut workers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let m = Arc::clone(&m);
            workers.spawn(async move {
                let mut finished = 0usize;
                while !m.is_empty() {
                    let Some(task) = m.pop_remain_and_add_run() else {
                        tokio::task::yield_now().await;
                        continue;
                    };
                    let retry = rand::thread_rng().gen_bool(0.3);
                    tokio::task::yield_now().await;

                    let counts = m.counts();
                    assert!(counts.remaining + counts.running <= TASKS);

                    if retry {
                        assert!(m.remove_run_and_push_remain(&task));
                    } else {
                        assert!(m.remove_run(&task));
                        finished += 1;
                    }
                }
                finished
            });
        }

        let mut finished = 0;
        while let Some(done) = workers.join_next().await {
            finished += done.unwrap();
        }
        assert_eq!(finished, TASKS);
        assert_eq!(m.size(), 0);
    }
}
