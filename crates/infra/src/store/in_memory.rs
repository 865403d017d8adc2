use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use tablekit_core::{fields, is_non_blank, ItemKey, Record, MAX_BATCH_WRITE_ITEMS};

use super::r#trait::{
    BatchWrite, BatchWriteOutput, CancellationReason, DeleteItem, GetItem, KvClient, PutItem,
    QueryInput, QueryPage, StoreError, TransactItem, TransactWrite, UpdateItem, MAX_TRANSACT_ITEMS,
};

type Table = BTreeMap<ItemKey, Record>;

/// Number of calls made to each primitive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub get: usize,
    pub query: usize,
    pub put: usize,
    pub update: usize,
    pub delete: usize,
    pub batch_write: usize,
    pub transact: usize,
}

#[derive(Debug, Default)]
struct Counters {
    get: AtomicUsize,
    query: AtomicUsize,
    put: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
    batch_write: AtomicUsize,
    transact: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// In-memory sorted key-value store.
///
/// Intended for tests/dev. Items are kept per table in `(PK, SK)` order, and query pages
/// are cut at `page_size` evaluated items to exercise cursor handling.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    tables: RwLock<HashMap<String, Table>>,
    page_size: Option<usize>,
    counters: Counters,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut every query page after `page_size` evaluated items.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size.max(1)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            get: self.counters.get.load(Ordering::Relaxed),
            query: self.counters.query.load(Ordering::Relaxed),
            put: self.counters.put.load(Ordering::Relaxed),
            update: self.counters.update.load(Ordering::Relaxed),
            delete: self.counters.delete.load(Ordering::Relaxed),
            batch_write: self.counters.batch_write.load(Ordering::Relaxed),
            transact: self.counters.transact.load(Ordering::Relaxed),
        }
    }

    /// Every item of a table in key order.
    pub fn items(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .map(|tables| {
                tables
                    .get(table)
                    .map(|t| t.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn poisoned<T>(_: T) -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }

    fn item_key(item: &Record) -> Result<ItemKey, StoreError> {
        if !is_non_blank(item.pk()) || !is_non_blank(item.sk()) {
            return Err(StoreError::Validation(
                "item must carry non-empty PK and SK".to_string(),
            ));
        }
        item.key()
            .ok_or_else(|| StoreError::Validation("item key missing".to_string()))
    }

    fn check(
        condition: Option<&super::condition::Condition>,
        current: Option<&Record>,
        key: &ItemKey,
    ) -> Result<(), StoreError> {
        match condition {
            Some(c) if !c.matches(current) => Err(StoreError::ConditionFailed(format!(
                "condition not met for {key}"
            ))),
            _ => Ok(()),
        }
    }

    fn check_set(input: &UpdateItem) -> Result<(), StoreError> {
        if input.set.contains(fields::PK) || input.set.contains(fields::SK) {
            return Err(StoreError::Validation(
                "key attributes cannot be updated".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_update(table: &mut Table, input: &UpdateItem) -> Result<Record, StoreError> {
        Self::check_set(input)?;
        let item = table.entry(input.key.clone()).or_insert_with(|| {
            let mut r = Record::new();
            r.insert(fields::PK, input.key.pk.clone());
            r.insert(fields::SK, input.key.sk.clone());
            r
        });
        for (field, value) in input.set.iter() {
            item.insert(field.clone(), value.clone());
        }
        Ok(item.clone())
    }
}

#[async_trait::async_trait]
impl KvClient for InMemoryKvStore {
    async fn get_item(&self, input: GetItem) -> Result<Option<Record>, StoreError> {
        bump(&self.counters.get);
        let tables = self.tables.read().map_err(Self::poisoned)?;
        Ok(tables
            .get(&input.table)
            .and_then(|t| t.get(&input.key))
            .cloned())
    }

    async fn query(&self, input: QueryInput) -> Result<QueryPage, StoreError> {
        bump(&self.counters.query);
        let tables = self.tables.read().map_err(Self::poisoned)?;
        let Some(table) = tables.get(&input.table) else {
            return Ok(QueryPage::default());
        };

        // Keys sharing a prefix are contiguous in (PK, SK) order.
        let start = ItemKey::new(input.pk.clone(), input.sk_prefix.clone());
        let mut range: Vec<(&ItemKey, &Record)> = table
            .range(start..)
            .take_while(|(k, _)| k.pk == input.pk && k.sk.starts_with(&input.sk_prefix))
            .collect();
        if !input.scan_forward {
            range.reverse();
        }

        let remaining: Vec<(&ItemKey, &Record)> = match &input.exclusive_start_key {
            Some(cursor) => range
                .into_iter()
                .skip_while(|(k, _)| {
                    if input.scan_forward {
                        *k <= cursor
                    } else {
                        *k >= cursor
                    }
                })
                .collect(),
            None => range,
        };

        let page_len = match (input.limit, self.page_size) {
            (Some(l), Some(p)) => l.min(p),
            (Some(l), None) => l,
            (None, Some(p)) => p,
            (None, None) => usize::MAX,
        }
        .max(1);

        let evaluated = &remaining[..remaining.len().min(page_len)];
        let last_evaluated_key = if remaining.len() > evaluated.len() {
            evaluated.last().map(|(k, _)| (*k).clone())
        } else {
            None
        };

        let items = evaluated
            .iter()
            .map(|entry| entry.1)
            .filter(|item| input.filter.as_ref().is_none_or(|f| f.matches(Some(*item))))
            .map(|item| match &input.projection {
                Some(attrs) => item.project(attrs),
                None => item.clone(),
            })
            .collect();

        Ok(QueryPage {
            items,
            last_evaluated_key,
        })
    }

    async fn put_item(&self, input: PutItem) -> Result<(), StoreError> {
        bump(&self.counters.put);
        let key = Self::item_key(&input.item)?;
        let mut tables = self.tables.write().map_err(Self::poisoned)?;
        let table = tables.entry(input.table).or_default();
        Self::check(input.condition.as_ref(), table.get(&key), &key)?;
        table.insert(key, input.item);
        Ok(())
    }

    async fn update_item(&self, input: UpdateItem) -> Result<Record, StoreError> {
        bump(&self.counters.update);
        let mut tables = self.tables.write().map_err(Self::poisoned)?;
        let table = tables.entry(input.table.clone()).or_default();
        Self::check(input.condition.as_ref(), table.get(&input.key), &input.key)?;
        Self::apply_update(table, &input)
    }

    async fn delete_item(&self, input: DeleteItem) -> Result<(), StoreError> {
        bump(&self.counters.delete);
        let mut tables = self.tables.write().map_err(Self::poisoned)?;
        let table = tables.entry(input.table).or_default();
        Self::check(input.condition.as_ref(), table.get(&input.key), &input.key)?;
        table.remove(&input.key);
        Ok(())
    }

    async fn batch_write(&self, input: BatchWrite) -> Result<BatchWriteOutput, StoreError> {
        bump(&self.counters.batch_write);
        if input.deletes.is_empty() || input.deletes.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(StoreError::Validation(format!(
                "batch write must hold 1..={MAX_BATCH_WRITE_ITEMS} requests, got {}",
                input.deletes.len()
            )));
        }
        let unique: BTreeSet<&ItemKey> = input.deletes.iter().collect();
        if unique.len() != input.deletes.len() {
            return Err(StoreError::Validation(
                "batch write contains duplicate keys".to_string(),
            ));
        }

        let mut tables = self.tables.write().map_err(Self::poisoned)?;
        let table = tables.entry(input.table).or_default();
        for key in &input.deletes {
            table.remove(key);
        }
        Ok(BatchWriteOutput::default())
    }

    async fn transact_write(&self, input: TransactWrite) -> Result<(), StoreError> {
        bump(&self.counters.transact);
        if input.items.is_empty() || input.items.len() > MAX_TRANSACT_ITEMS {
            return Err(StoreError::Validation(format!(
                "transaction must hold 1..={MAX_TRANSACT_ITEMS} items, got {}",
                input.items.len()
            )));
        }

        let mut seen = BTreeSet::new();
        for item in &input.items {
            let table = match item {
                TransactItem::Put(p) => &p.table,
                TransactItem::Update(u) => &u.table,
                TransactItem::Delete(d) => &d.table,
                TransactItem::ConditionCheck { table, .. } => table,
            };
            if let TransactItem::Update(u) = item {
                Self::check_set(u)?;
            }
            let key = match item {
                TransactItem::Put(p) => Self::item_key(&p.item)?,
                other => other
                    .key()
                    .ok_or_else(|| StoreError::Validation("item key missing".to_string()))?,
            };
            if !seen.insert((table.clone(), key)) {
                return Err(StoreError::Validation(
                    "transaction touches the same item twice".to_string(),
                ));
            }
        }

        let mut tables = self.tables.write().map_err(Self::poisoned)?;

        // Check every condition before writing anything.
        let reasons: Vec<CancellationReason> = input
            .items
            .iter()
            .map(|item| {
                let (table, key, condition) = match item {
                    TransactItem::Put(p) => (&p.table, p.item.key(), p.condition.as_ref()),
                    TransactItem::Update(u) => (&u.table, Some(u.key.clone()), u.condition.as_ref()),
                    TransactItem::Delete(d) => (&d.table, Some(d.key.clone()), d.condition.as_ref()),
                    TransactItem::ConditionCheck {
                        table,
                        key,
                        condition,
                    } => (table, Some(key.clone()), Some(condition)),
                };
                let current = key
                    .as_ref()
                    .and_then(|k| tables.get(table).and_then(|t| t.get(k)));
                match condition {
                    Some(c) if !c.matches(current) => CancellationReason::ConditionalCheckFailed,
                    _ => CancellationReason::None,
                }
            })
            .collect();

        if reasons.iter().any(|r| *r != CancellationReason::None) {
            return Err(StoreError::TransactionCanceled(reasons));
        }

        for item in input.items {
            match item {
                TransactItem::Put(p) => {
                    let key = Self::item_key(&p.item)?;
                    tables.entry(p.table).or_default().insert(key, p.item);
                }
                TransactItem::Update(u) => {
                    let table = tables.entry(u.table.clone()).or_default();
                    Self::apply_update(table, &u)?;
                }
                TransactItem::Delete(d) => {
                    tables.entry(d.table).or_default().remove(&d.key);
                }
                TransactItem::ConditionCheck { .. } => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Condition;

    const TABLE: &str = "t";

    fn item(pk: &str, sk: &str) -> Record {
        let mut r = Record::new();
        r.insert(fields::PK, pk);
        r.insert(fields::SK, sk);
        r
    }

    fn put(pk: &str, sk: &str) -> PutItem {
        PutItem {
            table: TABLE.into(),
            item: item(pk, sk),
            condition: None,
        }
    }

    fn sks(page: &QueryPage) -> Vec<String> {
        page.items.iter().map(|r| r.sk().unwrap().to_string()).collect()
    }

    #[tokio::test]
    async fn query_respects_prefix_partition_and_direction() {
        let store = InMemoryKvStore::new();
        for (pk, sk) in [("A", "X#1"), ("A", "X#2"), ("A", "Y#1"), ("B", "X#3")] {
            store.put_item(put(pk, sk)).await.unwrap();
        }

        let mut input = QueryInput::new(TABLE, "A", "X#");
        let page = store.query(input.clone()).await.unwrap();
        assert_eq!(sks(&page), vec!["X#1", "X#2"]);
        assert!(page.last_evaluated_key.is_none());

        input.scan_forward = false;
        let page = store.query(input).await.unwrap();
        assert_eq!(sks(&page), vec!["X#2", "X#1"]);
    }

    #[tokio::test]
    async fn pages_follow_cursors_in_both_directions() {
        let store = InMemoryKvStore::with_page_size(2);
        for sk in ["1", "2", "3", "4", "5"] {
            store.put_item(put("A", sk)).await.unwrap();
        }

        for forward in [true, false] {
            let mut input = QueryInput::new(TABLE, "A", "");
            input.scan_forward = forward;
            let mut seen = Vec::new();
            loop {
                let page = store.query(input.clone()).await.unwrap();
                seen.extend(sks(&page));
                match page.last_evaluated_key {
                    Some(cursor) => input.exclusive_start_key = Some(cursor),
                    None => break,
                }
            }
            let mut expected = vec!["1", "2", "3", "4", "5"];
            if !forward {
                expected.reverse();
            }
            assert_eq!(seen, expected);
        }
    }

    #[tokio::test]
    async fn filter_can_produce_empty_page_with_cursor() {
        let store = InMemoryKvStore::with_page_size(2);
        for (sk, kind) in [("1", "skip"), ("2", "skip"), ("3", "keep")] {
            let mut r = item("A", sk);
            r.insert("KIND", kind);
            store
                .put_item(PutItem {
                    table: TABLE.into(),
                    item: r,
                    condition: None,
                })
                .await
                .unwrap();
        }

        let mut input = QueryInput::new(TABLE, "A", "");
        input.filter = Some(Condition::equals("KIND", "keep"));
        let page = store.query(input).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.last_evaluated_key.is_some());
    }

    #[tokio::test]
    async fn conditional_put_rejects_existing_key() {
        let store = InMemoryKvStore::new();
        let mut first = put("A", "1");
        first.condition = Some(Condition::NotExists);
        store.put_item(first.clone()).await.unwrap();
        assert!(matches!(
            store.put_item(first).await,
            Err(StoreError::ConditionFailed(_))
        ));
    }

    #[tokio::test]
    async fn put_requires_key() {
        let store = InMemoryKvStore::new();
        assert!(matches!(
            store.put_item(put("A", " ")).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn batch_write_is_bounded() {
        let store = InMemoryKvStore::new();
        let keys: Vec<ItemKey> = (0..26).map(|i| ItemKey::new("A", i.to_string())).collect();
        let err = store
            .batch_write(BatchWrite {
                table: TABLE.into(),
                deletes: keys,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn transaction_is_all_or_nothing() {
        let store = InMemoryKvStore::new();
        store.put_item(put("A", "1")).await.unwrap();

        let mut set = Record::new();
        set.insert(fields::ENTITY, "PAGE_V");
        let tx = TransactWrite {
            items: vec![
                TransactItem::Update(UpdateItem {
                    table: TABLE.into(),
                    key: ItemKey::new("A", "1"),
                    set,
                    condition: Some(Condition::Exists),
                }),
                TransactItem::Put(PutItem {
                    table: TABLE.into(),
                    item: item("A", "1x"),
                    condition: Some(Condition::NotExists),
                }),
                TransactItem::Put(PutItem {
                    table: TABLE.into(),
                    item: item("A", "2"),
                    condition: Some(Condition::Exists),
                }),
            ],
        };

        let err = store.transact_write(tx).await.unwrap_err();
        assert!(err.is_condition_failure());
        match err {
            StoreError::TransactionCanceled(reasons) => assert_eq!(
                reasons,
                vec![
                    CancellationReason::None,
                    CancellationReason::None,
                    CancellationReason::ConditionalCheckFailed
                ]
            ),
            other => panic!("unexpected error: {other:?}"),
        }

        let items = store.items(TABLE);
        assert_eq!(items.len(), 1);
        assert!(items[0].entity().is_none());
    }

    #[tokio::test]
    async fn invalid_update_rejects_the_whole_transaction() {
        let store = InMemoryKvStore::new();
        store.put_item(put("A", "1")).await.unwrap();

        let mut set = Record::new();
        set.insert(fields::SK, "moved");
        let tx = TransactWrite {
            items: vec![
                TransactItem::Put(PutItem {
                    table: TABLE.into(),
                    item: item("A", "2"),
                    condition: Some(Condition::NotExists),
                }),
                TransactItem::Update(UpdateItem {
                    table: TABLE.into(),
                    key: ItemKey::new("A", "1"),
                    set,
                    condition: Some(Condition::Exists),
                }),
            ],
        };

        let err = store.transact_write(tx).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let items = store.items(TABLE);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sk(), Some("1"));
    }
}
