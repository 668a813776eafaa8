use super::{AppState, GameError, GameResult};
use crate::format::slugify;
use crate::types::*;
use rand::Rng;

/// Safe character set for join codes (excludes 0/O, 1/I/L to avoid confusion)
const TOKEN_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const TOKEN_LENGTH: usize = 8;

fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

impl AppState {
    /// Record a user profile (called at registration)
    pub async fn register_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        is_admin: bool,
    ) -> GameResult<UserProfile> {
        if id.trim().is_empty() {
            return Err(GameError::Validation("User id is required".to_string()));
        }
        if name.trim().is_empty() {
            return Err(GameError::Validation("User name is required".to_string()));
        }

        let users = self.store.list_users().await?;
        // Re-registering keeps the join code already handed out
        let token = match users.iter().find(|u| u.id == id && !u.token.is_empty()) {
            Some(existing) => existing.token.clone(),
            None => loop {
                let code = generate_token();
                if !users.iter().any(|u| u.token == code) {
                    break code;
                }
            },
        };

        let user = UserProfile {
            id: id.to_string(),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            is_admin,
            token,
        };
        self.store.put_user(user.clone()).await?;
        tracing::info!("Registered user {} ({})", user.id, user.name);
        Ok(user)
    }

    pub async fn list_users(&self) -> GameResult<Vec<UserProfile>> {
        Ok(self.store.list_users().await?)
    }

    /// Look up the user a join code belongs to
    pub async fn user_by_token(&self, token: &str) -> GameResult<Option<UserProfile>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .list_users()
            .await?
            .into_iter()
            .find(|u| u.token == token))
    }

    /// Create a category; the id is derived from the name
    pub async fn add_category(&self, name: &str) -> GameResult<Category> {
        let id = slugify(name);
        if id.is_empty() {
            return Err(GameError::Validation("Category name is required".to_string()));
        }

        let category = Category {
            id,
            name: name.trim().to_string(),
            active: true,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.put_category(category.clone()).await?;
        tracing::info!("Added category {}", category.id);
        Ok(category)
    }

    pub async fn list_categories(&self) -> GameResult<Vec<Category>> {
        Ok(self.store.list_categories().await?)
    }

    pub async fn delete_category(&self, id: &str) -> GameResult<()> {
        self.store.delete_category(id).await?;
        tracing::info!("Deleted category {}", id);
        Ok(())
    }

    /// Create a dish; adding the same name twice replaces the first entry
    pub async fn add_dish(
        &self,
        name: &str,
        category_id: &str,
        description: Option<String>,
        difficulty: Difficulty,
        active: bool,
    ) -> GameResult<Dish> {
        let id = slugify(name);
        if id.is_empty() {
            return Err(GameError::Validation("Dish name is required".to_string()));
        }
        if self.store.get_category(category_id).await?.is_none() {
            return Err(GameError::Validation(format!(
                "Unknown category {}",
                category_id
            )));
        }

        let dish = Dish {
            id,
            name: name.trim().to_string(),
            category_id: category_id.to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            difficulty,
            active,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.put_dish(dish.clone()).await?;
        tracing::info!("Added dish {} to {}", dish.id, dish.category_id);
        Ok(dish)
    }

    pub async fn list_dishes(&self) -> GameResult<Vec<Dish>> {
        Ok(self.store.list_dishes().await?)
    }

    pub async fn delete_dish(&self, id: &str) -> GameResult<()> {
        self.store.delete_dish(id).await?;
        tracing::info!("Deleted dish {}", id);
        Ok(())
    }
}
