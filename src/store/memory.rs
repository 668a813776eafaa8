use super::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tree {
    categories: HashMap<CategoryId, Category>,
    dishes: HashMap<DishId, Dish>,
    users: HashMap<UserId, UserProfile>,
    /// Monotonic ULID keys keep rounds in creation order
    rounds: BTreeMap<RoundId, Round>,
    history: BTreeMap<HistoryId, HistoricalRound>,
}

/// In-process document tree with change notifications
pub struct MemoryStore {
    tree: RwLock<Tree>,
    events: broadcast::Sender<StoreEvent>,
    unavailable: AtomicBool,
    history_ids: IdGenerator,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tree: RwLock::new(Tree::default()),
            events: tx,
            unavailable: AtomicBool::new(false),
            history_ids: IdGenerator::new(),
        }
    }

    /// Fire a notification to subscribers without touching the tree
    pub fn notify(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Make every subsequent write fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("write rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_category(&self, category: Category) -> StoreResult<()> {
        self.check_available()?;
        self.tree
            .write()
            .await
            .categories
            .insert(category.id.clone(), category);
        self.notify(StoreEvent::CatalogChanged);
        Ok(())
    }

    async fn get_category(&self, id: &str) -> StoreResult<Option<Category>> {
        Ok(self.tree.read().await.categories.get(id).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.tree.read().await.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn delete_category(&self, id: &str) -> StoreResult<()> {
        self.check_available()?;
        self.tree.write().await.categories.remove(id);
        self.notify(StoreEvent::CatalogChanged);
        Ok(())
    }

    async fn put_dish(&self, dish: Dish) -> StoreResult<()> {
        self.check_available()?;
        self.tree.write().await.dishes.insert(dish.id.clone(), dish);
        self.notify(StoreEvent::CatalogChanged);
        Ok(())
    }

    async fn get_dish(&self, id: &str) -> StoreResult<Option<Dish>> {
        Ok(self.tree.read().await.dishes.get(id).cloned())
    }

    async fn list_dishes(&self) -> StoreResult<Vec<Dish>> {
        let mut dishes: Vec<Dish> = self.tree.read().await.dishes.values().cloned().collect();
        dishes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(dishes)
    }

    async fn delete_dish(&self, id: &str) -> StoreResult<()> {
        self.check_available()?;
        self.tree.write().await.dishes.remove(id);
        self.notify(StoreEvent::CatalogChanged);
        Ok(())
    }

    async fn put_user(&self, user: UserProfile) -> StoreResult<()> {
        self.check_available()?;
        let id = user.id.clone();
        self.tree.write().await.users.insert(id.clone(), user);
        self.notify(StoreEvent::UserChanged(id));
        Ok(())
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.tree.read().await.users.get(id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        let mut users: Vec<UserProfile> = self.tree.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn insert_round(&self, round: Round) -> StoreResult<()> {
        self.check_available()?;
        let id = round.id.clone();
        {
            let mut tree = self.tree.write().await;
            if tree.rounds.contains_key(&id) {
                return Err(StoreError::AlreadyExists(format!("Round {}", id)));
            }
            tree.rounds.insert(id.clone(), round);
        }
        self.notify(StoreEvent::RoundChanged(id));
        Ok(())
    }

    async fn get_round(&self, id: &str) -> StoreResult<Option<Round>> {
        Ok(self.tree.read().await.rounds.get(id).cloned())
    }

    async fn list_rounds(&self) -> StoreResult<Vec<Round>> {
        Ok(self.tree.read().await.rounds.values().cloned().collect())
    }

    async fn update_round(
        &self,
        id: &str,
        guard: &[Precondition],
        patch: RoundPatch,
    ) -> StoreResult<Round> {
        self.check_available()?;
        let updated = {
            let mut tree = self.tree.write().await;
            let round = tree
                .rounds
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("Round {}", id)))?;
            check_preconditions(round, guard)?;
            patch.apply_to(round)?;
            round.clone()
        };
        self.notify(StoreEvent::RoundChanged(id.to_string()));
        Ok(updated)
    }

    async fn delete_round(&self, id: &str) -> StoreResult<()> {
        self.check_available()?;
        self.tree.write().await.rounds.remove(id);
        self.notify(StoreEvent::RoundDeleted(id.to_string()));
        Ok(())
    }

    async fn append_history(&self, entry: HistoricalRound) -> StoreResult<HistoryId> {
        self.check_available()?;
        let id = self.history_ids.next_id();
        self.tree.write().await.history.insert(id.clone(), entry);
        self.notify(StoreEvent::HistoryAppended(id.clone()));
        Ok(id)
    }

    async fn list_history(&self) -> StoreResult<Vec<HistoryRecord>> {
        Ok(self
            .tree
            .read()
            .await
            .history
            .iter()
            .map(|(id, round)| HistoryRecord {
                id: id.clone(),
                round: round.clone(),
            })
            .collect())
    }

    async fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let tree = self.tree.read().await;
        Ok(StoreSnapshot {
            categories: tree.categories.clone(),
            dishes: tree.dishes.clone(),
            users: tree.users.clone(),
            rounds: tree
                .rounds
                .iter()
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
            history: tree
                .history
                .iter()
                .map(|(id, round)| HistoryRecord {
                    id: id.clone(),
                    round: round.clone(),
                })
                .collect(),
        })
    }

    async fn restore(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        self.check_available()?;
        *self.tree.write().await = Tree {
            categories: snapshot.categories,
            dishes: snapshot.dishes,
            users: snapshot.users,
            rounds: snapshot.rounds.into_iter().collect(),
            history: snapshot
                .history
                .into_iter()
                .map(|record| (record.id, record.round))
                .collect(),
        };
        self.notify(StoreEvent::Restored);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
