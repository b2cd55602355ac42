//! ウォッチポイント管理
//!
//! 固定長のスロット配列の上に、インデックスで連結した空きリストと使用中リストを持つ
//! プールとしてウォッチポイントを管理します。

use crate::errors::{ExprError, WatchpointError};
use hinoki_target::Word;
use tracing::{info, warn};

/// ウォッチポイントID
pub type WatchpointId = u32;

/// プールの容量
pub const NR_WP: usize = 32;

/// ウォッチポイント
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchpoint {
    pub id: WatchpointId,
    pub enabled: bool,
    /// 監視する式
    pub expression: String,
    /// 作成時に評価した式の値
    pub baseline: Word,
}

impl Watchpoint {
    fn clear(&mut self) {
        self.id = 0;
        self.enabled = false;
        self.expression.clear();
        self.baseline = 0;
    }
}

/// スキャン中に評価できなかったウォッチポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub id: WatchpointId,
    pub expression: String,
    pub error: ExprError,
}

/// スキャン結果
///
/// どのウォッチポイントが発火したかは報告しません。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// いずれかのウォッチポイントの値がベースラインから変化したか
    pub tripped: bool,
    /// 評価に失敗したウォッチポイント（スキャンは継続される）
    pub failures: Vec<ScanFailure>,
}

#[derive(Debug, Default)]
struct Slot {
    watchpoint: Watchpoint,
    next: Option<usize>,
}

/// ウォッチポイントプール
///
/// すべてのスロットは常に空きリストか使用中リストのどちらか一方にだけ属します。
/// IDはプールの生存期間を通して単調増加し、解放や全解放の後も再利用されません。
pub struct WatchpointPool {
    slots: [Slot; NR_WP],
    free_head: Option<usize>,
    used_head: Option<usize>,
    used_tail: Option<usize>,
    num_used: usize,
    num_free: usize,
    next_id: WatchpointId,
}

impl WatchpointPool {
    /// 新しいプールを作成する（IDは1から）
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// 最初に割り当てるIDを指定してプールを作成する
    pub fn with_first_id(first_id: WatchpointId) -> Self {
        let mut pool = Self {
            slots: std::array::from_fn(|_| Slot::default()),
            free_head: None,
            used_head: None,
            used_tail: None,
            num_used: 0,
            num_free: 0,
            next_id: first_id,
        };
        pool.reset_slots();
        pool
    }

    /// 全スロットを空きリストに戻す（IDカウンタは変更しない）
    fn reset_slots(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.watchpoint.clear();
            slot.next = (i + 1 < NR_WP).then_some(i + 1);
        }
        self.free_head = Some(0);
        self.used_head = None;
        self.used_tail = None;
        self.num_used = 0;
        self.num_free = NR_WP;
        self.check_counts();
    }

    fn check_counts(&self) {
        debug_assert_eq!(self.num_used + self.num_free, NR_WP);
    }

    /// 空きスロットを1つ取り出して使用中リストの末尾に追加する
    pub fn allocate(&mut self) -> Result<WatchpointId, WatchpointError> {
        let index = self
            .free_head
            .ok_or(WatchpointError::PoolExhausted { capacity: NR_WP })?;
        // 番号が尽きた場合はプールを変更しない
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(WatchpointError::IdsExhausted)?;
        self.free_head = self.slots[index].next;

        let slot = &mut self.slots[index];
        slot.watchpoint.clear();
        slot.watchpoint.id = id;
        slot.watchpoint.enabled = true;
        slot.next = None;

        match self.used_tail {
            Some(tail) => self.slots[tail].next = Some(index),
            None => self.used_head = Some(index),
        }
        self.used_tail = Some(index);

        self.num_free -= 1;
        self.num_used += 1;
        self.check_counts();
        Ok(id)
    }

    /// 割り当て済みのウォッチポイントに式とベースライン値を設定する
    pub fn bind(
        &mut self,
        id: WatchpointId,
        expression: &str,
        baseline: Word,
    ) -> Result<(), WatchpointError> {
        let index = self
            .find_index(id)
            .ok_or(WatchpointError::UnknownWatchpointId { id })?;
        let watchpoint = &mut self.slots[index].watchpoint;
        watchpoint.expression = expression.to_string();
        watchpoint.baseline = baseline;
        Ok(())
    }

    /// 式を評価してからウォッチポイントを作成する
    ///
    /// 評価に失敗した場合やプールが満杯の場合、プールは変更されません。
    pub fn create<F>(&mut self, expression: &str, mut evaluate: F) -> Result<WatchpointId, WatchpointError>
    where
        F: FnMut(&str) -> Result<Word, ExprError>,
    {
        let baseline = evaluate(expression)?;
        let id = self.allocate()?;
        self.bind(id, expression, baseline)?;
        info!("watchpoint {} set on '{}' (baseline 0x{:08x})", id, expression, baseline);
        Ok(id)
    }

    /// ウォッチポイントを解放し、空きリストの先頭に戻す
    pub fn release(&mut self, id: WatchpointId) -> Result<(), WatchpointError> {
        let mut prev: Option<usize> = None;
        let mut cursor = self.used_head;

        while let Some(index) = cursor {
            if self.slots[index].watchpoint.id == id {
                let next = self.slots[index].next;
                match prev {
                    Some(prev) => self.slots[prev].next = next,
                    None => self.used_head = next,
                }
                if self.used_tail == Some(index) {
                    self.used_tail = prev;
                }

                let slot = &mut self.slots[index];
                slot.watchpoint.clear();
                slot.next = self.free_head;
                self.free_head = Some(index);

                self.num_used -= 1;
                self.num_free += 1;
                self.check_counts();
                info!("watchpoint {} deleted", id);
                return Ok(());
            }
            prev = cursor;
            cursor = self.slots[index].next;
        }

        Err(WatchpointError::UnknownWatchpointId { id })
    }

    /// すべてのウォッチポイントを解放する
    ///
    /// IDカウンタはリセットされないため、次の割り当ては続きのIDになります。
    pub fn release_all(&mut self) {
        self.reset_slots();
        info!("all watchpoints deleted");
    }

    fn find_index(&self, id: WatchpointId) -> Option<usize> {
        self.used_indices()
            .find(|&index| self.slots[index].watchpoint.id == id)
    }

    fn used_indices(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.used_head, move |&index| self.slots[index].next)
    }

    /// IDでウォッチポイントを検索する
    pub fn lookup(&self, id: WatchpointId) -> Option<&Watchpoint> {
        self.find_index(id).map(|index| &self.slots[index].watchpoint)
    }

    /// 使用中のウォッチポイントを作成順に走査する
    pub fn iter(&self) -> impl Iterator<Item = &Watchpoint> {
        self.used_indices().map(move |index| &self.slots[index].watchpoint)
    }

    /// 使用中のウォッチポイントを作成順に取得する
    pub fn list(&self) -> Vec<&Watchpoint> {
        self.iter().collect()
    }

    /// 使用中のウォッチポイントの数
    pub fn used_count(&self) -> usize {
        self.num_used
    }

    /// 空きスロットの数
    pub fn free_count(&self) -> usize {
        self.num_free
    }

    /// プールの容量
    pub fn capacity(&self) -> usize {
        NR_WP
    }

    /// 全ウォッチポイントの式を再評価し、ベースラインからの変化を検出する
    ///
    /// 変化を検出した時点でスキャンを打ち切ります。ベースラインは更新しないため、
    /// 値が戻らない限り同じウォッチポイントは次のスキャンでも再び発火します。
    pub fn scan<F>(&self, mut evaluate: F) -> ScanResult
    where
        F: FnMut(&str) -> Result<Word, ExprError>,
    {
        let mut result = ScanResult::default();

        for watchpoint in self.iter() {
            match evaluate(&watchpoint.expression) {
                Ok(value) if value != watchpoint.baseline => {
                    result.tripped = true;
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    warn!("invalid expression: {} ({})", watchpoint.expression, error);
                    result.failures.push(ScanFailure {
                        id: watchpoint.id,
                        expression: watchpoint.expression.clone(),
                        error,
                    });
                }
            }
        }

        result
    }
}

impl Default for WatchpointPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: Word) -> impl FnMut(&str) -> Result<Word, ExprError> {
        move |_| Ok(value)
    }

    fn ids(pool: &WatchpointPool) -> Vec<WatchpointId> {
        pool.iter().map(|wp| wp.id).collect()
    }

    #[test]
    fn test_allocate_assigns_increasing_ids() {
        let mut pool = WatchpointPool::new();
        assert_eq!(pool.allocate(), Ok(1));
        assert_eq!(pool.allocate(), Ok(2));
        assert_eq!(pool.allocate(), Ok(3));
        assert_eq!(ids(&pool), vec![1, 2, 3]);
        assert!(pool.lookup(2).unwrap().enabled);
    }

    #[test]
    fn test_pool_exhausted() {
        let mut pool = WatchpointPool::new();
        for _ in 0..NR_WP {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.free_count(), 0);
        assert_eq!(
            pool.allocate(),
            Err(WatchpointError::PoolExhausted { capacity: NR_WP })
        );
        assert_eq!(pool.used_count(), NR_WP);
    }

    #[test]
    fn test_ids_exhausted_leaves_pool_unchanged() {
        let mut pool = WatchpointPool::with_first_id(WatchpointId::MAX - 1);
        assert_eq!(pool.allocate(), Ok(WatchpointId::MAX - 1));
        assert_eq!(pool.allocate(), Err(WatchpointError::IdsExhausted));
        assert_eq!(pool.used_count(), 1);
        assert_eq!(pool.free_count(), NR_WP - 1);
        assert_eq!(ids(&pool), vec![WatchpointId::MAX - 1]);
    }

    #[test]
    fn test_counts_invariant_under_mixed_operations() {
        let mut pool = WatchpointPool::new();
        let mut live = Vec::new();
        for round in 0..200u32 {
            if round % 3 == 2 && !live.is_empty() {
                let id = live.remove((round as usize * 7) % live.len());
                pool.release(id).unwrap();
            } else if let Ok(id) = pool.allocate() {
                live.push(id);
            }
            assert_eq!(pool.used_count() + pool.free_count(), pool.capacity());
            assert_eq!(pool.used_count(), live.len());
        }
    }

    #[test]
    fn test_release_middle_head_and_tail() {
        let mut pool = WatchpointPool::new();
        for _ in 0..4 {
            pool.allocate().unwrap();
        }
        pool.release(2).unwrap();
        assert_eq!(ids(&pool), vec![1, 3, 4]);
        pool.release(1).unwrap();
        assert_eq!(ids(&pool), vec![3, 4]);
        pool.release(4).unwrap();
        assert_eq!(ids(&pool), vec![3]);

        // 末尾の追跡が正しいことを確認する
        let id = pool.allocate().unwrap();
        assert_eq!(ids(&pool), vec![3, id]);
    }

    #[test]
    fn test_release_unknown_id() {
        let mut pool = WatchpointPool::new();
        pool.allocate().unwrap();
        assert_eq!(
            pool.release(7),
            Err(WatchpointError::UnknownWatchpointId { id: 7 })
        );
        pool.release(1).unwrap();
        assert_eq!(
            pool.release(1),
            Err(WatchpointError::UnknownWatchpointId { id: 1 })
        );
        assert_eq!(pool.free_count(), NR_WP);
    }

    #[test]
    fn test_ids_not_reused_after_release_all() {
        let mut pool = WatchpointPool::new();
        pool.allocate().unwrap();
        let k = pool.allocate().unwrap();
        pool.release_all();
        assert_eq!(pool.used_count(), 0);
        assert_eq!(pool.free_count(), NR_WP);
        let next = pool.allocate().unwrap();
        assert!(next > k);
    }

    #[test]
    fn test_independent_pools() {
        let mut a = WatchpointPool::new();
        let mut b = WatchpointPool::with_first_id(100);
        a.allocate().unwrap();
        assert_eq!(b.allocate(), Ok(100));
        assert_eq!(a.allocate(), Ok(2));
    }

    #[test]
    fn test_bind_and_lookup() {
        let mut pool = WatchpointPool::new();
        let id = pool.allocate().unwrap();
        pool.bind(id, "$a0 + 1", 5).unwrap();
        let wp = pool.lookup(id).unwrap();
        assert_eq!(wp.expression, "$a0 + 1");
        assert_eq!(wp.baseline, 5);
        assert_eq!(
            pool.bind(99, "1", 1),
            Err(WatchpointError::UnknownWatchpointId { id: 99 })
        );
    }

    #[test]
    fn test_create_failure_leaves_pool_unchanged() {
        let mut pool = WatchpointPool::new();
        let result = pool.create("1/0", |_| Err(ExprError::DivisionByZero));
        assert_eq!(result, Err(WatchpointError::Expression(ExprError::DivisionByZero)));
        assert_eq!(pool.used_count(), 0);

        // 失敗した作成はIDを消費しない
        assert_eq!(pool.create("1", constant(1)), Ok(1));
    }

    #[test]
    fn test_scan_without_change() {
        let mut pool = WatchpointPool::new();
        pool.create("1+1", constant(2)).unwrap();
        assert_eq!(pool.scan(constant(2)), ScanResult::default());
    }

    #[test]
    fn test_scan_trip_is_sticky() {
        let mut pool = WatchpointPool::new();
        pool.create("$a0", constant(2)).unwrap();
        assert!(!pool.scan(constant(2)).tripped);
        assert!(pool.scan(constant(3)).tripped);
        // ベースラインは更新されないので再び発火する
        assert!(pool.scan(constant(3)).tripped);
        assert_eq!(pool.lookup(1).unwrap().baseline, 2);
    }

    #[test]
    fn test_scan_stops_at_first_trip() {
        let mut pool = WatchpointPool::new();
        pool.create("a", constant(0)).unwrap();
        pool.create("b", constant(0)).unwrap();
        pool.create("c", constant(0)).unwrap();

        let mut seen = Vec::new();
        let result = pool.scan(|expr| {
            seen.push(expr.to_string());
            Ok(if expr == "b" { 1 } else { 0 })
        });
        assert!(result.tripped);
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_scan_failures_are_not_fatal() {
        let mut pool = WatchpointPool::new();
        pool.create("bad", constant(0)).unwrap();
        pool.create("good", constant(0)).unwrap();

        let result = pool.scan(|expr| match expr {
            "bad" => Err(ExprError::InvalidRegister { name: "bad".to_string() }),
            _ => Ok(1),
        });
        assert!(result.tripped);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].id, 1);
        assert_eq!(result.failures[0].expression, "bad");
    }
}
