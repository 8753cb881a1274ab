use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Асинхронные замки по идентификатору поста.
///
/// Запись удаляется из таблицы, когда её больше никто не держит и не ждёт.
/// Кроме того, таблица помнит, какие `id` освобождались, пока открыт хотя бы
/// один [`Snapshot`]: так загрузка с сервера узнаёт, что её ответ устарел.
#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    table: Mutex<Table>,
}

#[derive(Debug, Default)]
struct Table {
    slots: HashMap<i64, Slot>,
    released: u64,
    snapshots: usize,
    touched: HashMap<i64, u64>,
}

#[derive(Debug, Default)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

/// Держит замок `id` до drop.
#[derive(Debug)]
pub(crate) struct IdGuard {
    // порядок полей важен: замок отпускается раньше, чем снимается учёт
    _guard: OwnedMutexGuard<()>,
    _claim: Claim,
}

/// Учёт ожидающего или держащего замок. Снимается в drop, в том числе когда
/// ожидание отменено.
#[derive(Debug)]
struct Claim {
    locks: Arc<IdLocks>,
    id: i64,
    held: bool,
}

/// Момент начала загрузки с сервера.
#[derive(Debug)]
pub(crate) struct Snapshot {
    locks: Arc<IdLocks>,
    since: u64,
}

impl IdLocks {
    pub(crate) async fn acquire(self: &Arc<Self>, id: i64) -> IdGuard {
        let (lock, mut claim) = self.claim(id);
        let guard = lock.lock_owned().await;
        claim.held = true;
        IdGuard {
            _guard: guard,
            _claim: claim,
        }
    }

    /// Берёт замок, только если он свободен.
    pub(crate) fn try_acquire(self: &Arc<Self>, id: i64) -> Option<IdGuard> {
        let (lock, mut claim) = self.claim(id);
        let guard = lock.try_lock_owned().ok()?;
        claim.held = true;
        Some(IdGuard {
            _guard: guard,
            _claim: claim,
        })
    }

    pub(crate) fn snapshot(self: &Arc<Self>) -> Snapshot {
        let mut table = self.table();
        table.snapshots += 1;
        Snapshot {
            locks: Arc::clone(self),
            since: table.released,
        }
    }

    fn claim(self: &Arc<Self>, id: i64) -> (Arc<AsyncMutex<()>>, Claim) {
        let mut table = self.table();
        let slot = table.slots.entry(id).or_default();
        slot.users += 1;
        let lock = Arc::clone(&slot.lock);

        let claim = Claim {
            locks: Arc::clone(self),
            id,
            held: false,
        };
        (lock, claim)
    }

    fn unclaim(&self, id: i64, held: bool) {
        let mut table = self.table();
        if held {
            table.released += 1;
            if table.snapshots > 0 {
                let seq = table.released;
                table.touched.insert(id, seq);
            }
        }

        let idle = match table.slots.get_mut(&id) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if idle {
            table.slots.remove(&id);
        }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.table().slots.len()
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.locks.unclaim(self.id, self.held);
    }
}

impl Snapshot {
    /// Отпускался ли замок `id` после начала загрузки.
    pub(crate) fn is_stale(&self, id: i64) -> bool {
        self.locks
            .table()
            .touched
            .get(&id)
            .is_some_and(|&seq| seq > self.since)
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        let mut table = self.locks.table();
        table.snapshots = table.snapshots.saturating_sub(1);
        if table.snapshots == 0 {
            table.touched.clear();
        }
    }
}
