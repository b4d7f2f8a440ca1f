//! Per-user nutrient requirements: initialization, restore-to-default, and
//! bounded bulk adjustment.
//!
//! [`RequirementStore`] owns the requirement *logic*; row persistence lives
//! behind the [`RequirementRepository`] trait so the same store drives a
//! relational backend in production and [`MemoryRepository`] in tests. The
//! repository contract is deliberately narrow — four operations — and
//! `update_quantities` is atomic: every update in a batch commits or none
//! do, which is what lets a failed ingestion run leave requirements
//! untouched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::catalog::{NutrientCatalog, NutrientId, Sex, NUTRIENT_COUNT};
use crate::error::{RepositoryError, StoreError};
use crate::output::NutrientChange;

/// One persisted requirement row: a user's daily target for one nutrient.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub user_id: u32,
    pub nutrient_id: NutrientId,
    pub quantity: f32,
}

/// The slice of the user row the store needs: sex and birth date.
#[derive(Debug, Clone, Copy)]
pub struct UserProfile {
    pub sex: Sex,
    pub birth_date: NaiveDate,
}

/// Persistence seam for requirement rows and user profiles.
#[async_trait]
pub trait RequirementRepository: Send + Sync {
    /// Bulk-insert requirement rows.
    async fn insert_requirements(&self, rows: Vec<Requirement>) -> Result<(), RepositoryError>;

    /// All requirement rows for a user, in nutrient-id order.
    async fn requirements_for_user(&self, user_id: u32) -> Result<Vec<Requirement>, RepositoryError>;

    /// Apply a batch of quantity updates atomically: either every update
    /// commits or none do.
    async fn update_quantities(
        &self,
        user_id: u32,
        updates: Vec<(NutrientId, f32)>,
    ) -> Result<(), RepositoryError>;

    /// The user's profile, or `None` for an unknown user.
    async fn user_profile(&self, user_id: u32) -> Result<Option<UserProfile>, RepositoryError>;
}

/// Age in whole years at `today`: calendar-year difference, minus one if the
/// birthday has not yet occurred this year.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

/// Requirement operations over a repository and the nutrient catalog.
pub struct RequirementStore {
    repository: Arc<dyn RequirementRepository>,
    catalog: Arc<NutrientCatalog>,
}

impl RequirementStore {
    pub fn new(repository: Arc<dyn RequirementRepository>, catalog: Arc<NutrientCatalog>) -> Self {
        Self {
            repository,
            catalog,
        }
    }

    /// Create all 34 requirement rows for a newly registered user from the
    /// EFSA default formulas.
    ///
    /// Performs an unconditional bulk insert; callers must not invoke it
    /// twice for the same user.
    pub async fn initialize_for_user(
        &self,
        user_id: u32,
        sex: Sex,
        age: u32,
    ) -> Result<(), StoreError> {
        let rows: Vec<Requirement> = self
            .catalog
            .ids()
            .map(|nutrient_id| Requirement {
                user_id,
                nutrient_id,
                quantity: self.catalog.recommended_quantity(nutrient_id, sex, age),
            })
            .collect();
        debug_assert_eq!(rows.len(), NUTRIENT_COUNT);

        self.repository.insert_requirements(rows).await?;
        info!("Initialized {NUTRIENT_COUNT} nutrient requirements for user {user_id}");
        Ok(())
    }

    /// All requirement rows for a user.
    pub async fn requirements_for_user(&self, user_id: u32) -> Result<Vec<Requirement>, StoreError> {
        Ok(self.repository.requirements_for_user(user_id).await?)
    }

    /// Recompute every existing requirement row from the default formula,
    /// using the user's stored sex and current age.
    ///
    /// Fails with [`StoreError::NoRequirements`] when the user has no rows
    /// to restore.
    pub async fn restore_to_default(&self, user_id: u32) -> Result<(), StoreError> {
        let existing = self.repository.requirements_for_user(user_id).await?;
        if existing.is_empty() {
            return Err(StoreError::NoRequirements { user_id });
        }

        // One profile fetch per call; the profile applies to every row.
        let profile = self
            .repository
            .user_profile(user_id)
            .await?
            .ok_or(StoreError::UnknownUser { user_id })?;
        let age = age_on(profile.birth_date, Utc::now().date_naive());

        let updates: Vec<(NutrientId, f32)> = existing
            .iter()
            .map(|row| {
                (
                    row.nutrient_id,
                    self.catalog
                        .recommended_quantity(row.nutrient_id, profile.sex, age),
                )
            })
            .collect();

        self.repository.update_quantities(user_id, updates).await?;
        info!(
            "Restored {} nutrient requirements to defaults for user {user_id}",
            existing.len()
        );
        Ok(())
    }

    /// Apply a batch of dosage-change directives as bounded percentage
    /// nudges.
    ///
    /// Directives without a resolved catalog id, or whose user has no row
    /// for that nutrient, are silently skipped. Returns immediately when
    /// nothing resolvable remains. Repeated directives against the same
    /// nutrient compound within the batch. Each new quantity is clamped to
    /// the nutrient's safety bounds, and the whole batch commits atomically.
    pub async fn apply_bounded_adjustments(
        &self,
        user_id: u32,
        changes: &[NutrientChange],
    ) -> Result<(), StoreError> {
        let resolved: Vec<(NutrientId, &NutrientChange)> = changes
            .iter()
            .filter_map(|c| c.nutrient_id.map(|id| (id, c)))
            .collect();
        if resolved.is_empty() {
            return Ok(());
        }

        let existing = self.repository.requirements_for_user(user_id).await?;
        let mut quantities: HashMap<NutrientId, f32> = existing
            .iter()
            .map(|row| (row.nutrient_id, row.quantity))
            .collect();

        let mut touched: Vec<NutrientId> = Vec::new();
        for (nutrient_id, change) in resolved {
            let Some(current) = quantities.get(&nutrient_id).copied() else {
                debug!(
                    "User {user_id} has no requirement row for nutrient {nutrient_id}; skipping"
                );
                continue;
            };

            let pct = self.catalog.adjustment_percentage(nutrient_id);
            let adjusted = if change.should_increase() {
                current * (1.0 + pct)
            } else {
                current * (1.0 - pct)
            };

            let (min, max) = self.catalog.safety_bounds(nutrient_id);
            let clamped = adjusted.clamp(min, max);

            quantities.insert(nutrient_id, clamped);
            if !touched.contains(&nutrient_id) {
                touched.push(nutrient_id);
            }
            debug!(
                "Nutrient {nutrient_id}: {current} -> {clamped} ({}{:.0}%, bounds [{min}, {max}])",
                if change.should_increase() { "+" } else { "-" },
                pct * 100.0
            );
        }

        if touched.is_empty() {
            return Ok(());
        }

        let updates: Vec<(NutrientId, f32)> = touched
            .into_iter()
            .map(|id| (id, quantities[&id]))
            .collect();
        let count = updates.len();
        self.repository.update_quantities(user_id, updates).await?;
        info!("Applied {count} bounded nutrient adjustments for user {user_id}");
        Ok(())
    }
}

// ── In-memory repository ─────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    rows: HashMap<(u32, NutrientId), f32>,
    profiles: HashMap<u32, UserProfile>,
}

/// In-memory [`RequirementRepository`] for tests and demos.
///
/// Atomicity of `update_quantities` holds trivially: the whole batch is
/// validated against the map before any entry is written.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user profile (the relational store's user row).
    pub async fn put_profile(&self, user_id: u32, profile: UserProfile) {
        self.state.lock().await.profiles.insert(user_id, profile);
    }
}

#[async_trait]
impl RequirementRepository for MemoryRepository {
    async fn insert_requirements(&self, rows: Vec<Requirement>) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        for row in rows {
            state
                .rows
                .insert((row.user_id, row.nutrient_id), row.quantity);
        }
        Ok(())
    }

    async fn requirements_for_user(&self, user_id: u32) -> Result<Vec<Requirement>, RepositoryError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Requirement> = state
            .rows
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((uid, nid), qty)| Requirement {
                user_id: *uid,
                nutrient_id: *nid,
                quantity: *qty,
            })
            .collect();
        rows.sort_by_key(|r| r.nutrient_id);
        Ok(rows)
    }

    async fn update_quantities(
        &self,
        user_id: u32,
        updates: Vec<(NutrientId, f32)>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        // Validate the full batch before writing anything.
        for (nutrient_id, _) in &updates {
            if !state.rows.contains_key(&(user_id, *nutrient_id)) {
                return Err(RepositoryError::RowNotFound {
                    user_id,
                    nutrient_id: *nutrient_id,
                });
            }
        }
        for (nutrient_id, quantity) in updates {
            state.rows.insert((user_id, nutrient_id), quantity);
        }
        Ok(())
    }

    async fn user_profile(&self, user_id: u32) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self.state.lock().await.profiles.get(&user_id).copied())
    }
}
