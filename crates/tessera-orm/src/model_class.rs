//! Model classes: the dataset, hooks, plugins and associations of one model.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tessera_core::{col, Expr, InsertValues, Ordering};
use tessera_db::{Database, Dataset, Row, Transaction, TransactionOptions};
use tracing::{debug, info};

use crate::association::Association;
use crate::error::{OrmError, Result};
use crate::hooks::{HookAction, Hooks, LifecycleEvent};
use crate::model::Model;
use crate::plugin::PluginRegistry;

/// Collects the definition of a [`ModelClass`].
pub struct ModelClassBuilder<M> {
    db: Database,
    hooks: Hooks<M>,
    associations: Vec<Association>,
    restriction: Option<Expr>,
    order: Vec<Ordering>,
    plugins: Vec<String>,
}

impl<M: Model> ModelClassBuilder<M> {
    /// Starts a definition bound to `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            hooks: Hooks::new(),
            associations: Vec::new(),
            restriction: None,
            order: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// Appends a lifecycle hook.
    pub fn hook<F>(&mut self, event: LifecycleEvent, hook: F) -> &mut Self
    where
        F: Fn(&mut M) -> HookAction + Send + Sync + 'static,
    {
        self.hooks.register(event, hook);
        self
    }

    /// Adds an association. A later one with the same name replaces it.
    pub fn associate(&mut self, association: Association) -> &mut Self {
        self.associations.retain(|a| a.name() != association.name());
        self.associations.push(association);
        self
    }

    /// Restricts the class dataset; restrictions are AND-ed.
    pub fn restrict(&mut self, expr: impl Into<Expr>) -> &mut Self {
        let expr = expr.into();
        self.restriction = Some(match self.restriction.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Replaces the default order of the class dataset.
    pub fn order<O: Into<Ordering>>(&mut self, orderings: impl IntoIterator<Item = O>) -> &mut Self {
        self.order = orderings.into_iter().map(Into::into).collect();
        self
    }

    /// Applies plugin `name` from `registry` with `config`. Applying a
    /// plugin a second time does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownPlugin`] or the plugin's own error.
    pub fn plugin(
        &mut self,
        registry: &PluginRegistry<M>,
        name: &str,
        config: Value,
    ) -> Result<&mut Self> {
        if self.plugins.iter().any(|p| p == name) {
            debug!(model = M::TABLE, plugin = name, "plugin already applied");
            return Ok(self);
        }
        let setup = registry
            .get(name)
            .ok_or_else(|| OrmError::UnknownPlugin(String::from(name)))?;
        setup(self, &config)?;
        self.plugins.push(String::from(name));
        debug!(model = M::TABLE, plugin = name, "plugin applied");
        Ok(self)
    }

    /// Finishes the definition.
    #[must_use]
    pub fn build(&self) -> ModelClass<M> {
        ModelClass {
            db: self.db.clone(),
            hooks: self.hooks.clone(),
            associations: self.associations.clone(),
            restriction: self.restriction.clone(),
            order: self.order.clone(),
            plugins: self.plugins.clone(),
            cache: Mutex::new(HashMap::new()),
            _model: PhantomData,
        }
    }
}

impl<M> fmt::Debug for ModelClassBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClassBuilder")
            .field("hooks", &self.hooks)
            .field("associations", &self.associations)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

type CacheKey = (String, i64);

/// Persistence operations for model `M`.
///
/// Saves and destroys run in a transaction (a savepoint when one is already
/// open) together with their hooks, so a stopped hook or a failed statement
/// leaves the table untouched.
pub struct ModelClass<M> {
    db: Database,
    hooks: Hooks<M>,
    associations: Vec<Association>,
    restriction: Option<Expr>,
    order: Vec<Ordering>,
    plugins: Vec<String>,
    cache: Mutex<HashMap<CacheKey, Arc<[Row]>>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> ModelClass<M> {
    /// Starts a definition.
    #[must_use]
    pub fn builder(db: Database) -> ModelClassBuilder<M> {
        ModelClassBuilder::new(db)
    }

    /// The bound database.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Registered hooks.
    #[must_use]
    pub const fn hooks(&self) -> &Hooks<M> {
        &self.hooks
    }

    /// Names of the applied plugins, in application order.
    #[must_use]
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Association by name.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name() == name)
    }

    /// The class dataset with restrictions and default order applied.
    #[must_use]
    pub fn dataset(&self) -> Dataset {
        let mut ds = self.db.from(M::TABLE);
        if let Some(restriction) = &self.restriction {
            ds = ds.filter(restriction.clone());
        }
        if !self.order.is_empty() {
            ds = ds.order(self.order.clone());
        }
        ds
    }

    /// Every instance in the class dataset.
    ///
    /// # Errors
    ///
    /// Returns database and decode errors.
    pub async fn all(&self) -> Result<Vec<M>> {
        let rows = self.dataset().all().await?;
        Ok(rows.iter().map(M::from_row).collect::<tessera_db::Result<_>>()?)
    }

    /// The instance with primary key `pk`, if any.
    ///
    /// # Errors
    ///
    /// Returns database and decode errors.
    pub async fn find(&self, pk: i64) -> Result<Option<M>> {
        let row = self
            .dataset()
            .unordered()
            .filter(col(M::PRIMARY_KEY).eq(pk))
            .first()
            .await?;
        Ok(row.as_ref().map(M::from_row).transpose()?)
    }

    /// Like [`ModelClass::find`], failing when the row is missing.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NotFound`] when no row matches.
    pub async fn get(&self, pk: i64) -> Result<M> {
        self.find(pk).await?.ok_or(OrmError::NotFound {
            table: M::TABLE,
            pk,
        })
    }

    /// Number of rows in the class dataset.
    ///
    /// # Errors
    ///
    /// Returns database errors.
    pub async fn count(&self) -> Result<i64> {
        Ok(self.dataset().count().await?)
    }

    /// Inserts an unsaved instance or updates a saved one, running the save
    /// hooks around the statement. A key assigned by the insert is stored on
    /// `model`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::HookStopped`] when a hook aborts,
    /// [`OrmError::NotFound`] when updating a row that no longer exists, and
    /// database errors. The transaction is rolled back in every case.
    pub async fn save(&self, model: &mut M) -> Result<()> {
        let creating = !model.is_saved();
        let target = &mut *model;
        self.in_transaction(move |tx| self.save_steps(tx, target, creating))
            .await?;
        if let Some(pk) = model.pk() {
            self.clear_cache(pk);
        }
        info!(
            model = M::TABLE,
            pk = ?model.pk(),
            created = creating,
            "saved"
        );
        Ok(())
    }

    async fn save_steps(&self, tx: Transaction, model: &mut M, creating: bool) -> Result<()> {
        let (before, after) = if creating {
            (LifecycleEvent::BeforeCreate, LifecycleEvent::AfterCreate)
        } else {
            (LifecycleEvent::BeforeUpdate, LifecycleEvent::AfterUpdate)
        };
        self.hooks.run(LifecycleEvent::BeforeSave, model)?;
        self.hooks.run(before, model)?;

        let values = model.to_values();
        match model.pk() {
            Some(pk) if !creating => {
                let target = tx.from(M::TABLE).filter(col(M::PRIMARY_KEY).eq(pk));
                let exists = if values.is_empty() {
                    !target.is_empty().await?
                } else {
                    let assignments = values.into_iter().map(|(c, v)| (c, Expr::Literal(v)));
                    target.update(assignments).await? > 0
                };
                if !exists {
                    return Err(OrmError::NotFound {
                        table: M::TABLE,
                        pk,
                    });
                }
            }
            _ => {
                let row = if values.is_empty() {
                    InsertValues::Default
                } else {
                    InsertValues::Named(
                        values
                            .into_iter()
                            .map(|(c, v)| (String::from(c), Expr::Literal(v)))
                            .collect(),
                    )
                };
                if let Some(id) = tx.from(M::TABLE).insert(row).await? {
                    model.set_pk(id);
                }
            }
        }

        self.hooks.run(after, model)?;
        self.hooks.run(LifecycleEvent::AfterSave, model)
    }

    /// Deletes a saved instance, running the destroy hooks around the
    /// statement.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::MissingPrimaryKey`] for an unsaved instance,
    /// [`OrmError::HookStopped`], [`OrmError::NotFound`] when nothing was
    /// deleted, and database errors.
    pub async fn destroy(&self, model: &mut M) -> Result<()> {
        let pk = model.pk().ok_or(OrmError::MissingPrimaryKey(M::TABLE))?;
        self.in_transaction(|tx| async move {
            self.hooks.run(LifecycleEvent::BeforeDestroy, model)?;
            let deleted = tx
                .from(M::TABLE)
                .filter(col(M::PRIMARY_KEY).eq(pk))
                .delete()
                .await?;
            if deleted == 0 {
                return Err(OrmError::NotFound {
                    table: M::TABLE,
                    pk,
                });
            }
            self.hooks.run(LifecycleEvent::AfterDestroy, model)
        })
        .await?;
        self.clear_cache(pk);
        info!(model = M::TABLE, pk, "destroyed");
        Ok(())
    }

    /// Reloads `model` from its row.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::MissingPrimaryKey`] for an unsaved instance and
    /// [`OrmError::NotFound`] when the row is gone.
    pub async fn refresh(&self, model: &mut M) -> Result<()> {
        let pk = model.pk().ok_or(OrmError::MissingPrimaryKey(M::TABLE))?;
        *model = self.get(pk).await?;
        self.clear_cache(pk);
        Ok(())
    }

    /// Runs `steps` in a transaction, turning ORM failures into a rollback
    /// and reporting them afterwards.
    async fn in_transaction<F, Fut>(&self, steps: F) -> Result<()>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut failure = None;
        let slot = &mut failure;
        let outcome = self
            .db
            .transaction_with(TransactionOptions { savepoint: true }, |tx| async move {
                let handle = tx.clone();
                match steps(tx).await {
                    Ok(()) => Ok(()),
                    Err(OrmError::Database(e)) => Err(e),
                    Err(other) => {
                        *slot = Some(other);
                        handle.rollback()
                    }
                }
            })
            .await;
        if let Some(err) = failure {
            return Err(err);
        }
        outcome?;
        Ok(())
    }

    /// Dataset of the rows `owner` reaches through association `name`.
    /// `None` means no row can match.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownAssociation`] and the errors of
    /// [`Association::dataset`].
    pub fn association_dataset(&self, name: &str, owner: &M) -> Result<Option<Dataset>> {
        self.association(name)
            .ok_or_else(|| OrmError::UnknownAssociation(String::from(name)))?
            .dataset(&self.db, owner)
    }

    /// Rows associated with `owner`, loaded on first use and cached by
    /// association name and owner key until the owner is saved, destroyed,
    /// refreshed or [`ModelClass::clear_cache`] is called.
    ///
    /// # Errors
    ///
    /// See [`ModelClass::association_dataset`].
    pub async fn load(&self, name: &str, owner: &M) -> Result<Arc<[Row]>> {
        let key = owner.pk().map(|pk| (String::from(name), pk));
        if let Some(key) = &key {
            if let Some(rows) = self.cache.lock().get(key) {
                return Ok(Arc::clone(rows));
            }
        }
        let rows: Arc<[Row]> = match self.association_dataset(name, owner)? {
            Some(ds) => Arc::from(ds.all().await?),
            None => Arc::from(Vec::new()),
        };
        if let Some(key) = key {
            debug!(model = M::TABLE, association = name, owner = key.1, "association loaded");
            self.cache.lock().insert(key, Arc::clone(&rows));
        }
        Ok(rows)
    }

    /// [`ModelClass::load`] decoded as model `T`.
    ///
    /// # Errors
    ///
    /// See [`ModelClass::load`]; also returns decode errors.
    pub async fn load_as<T: Model>(&self, name: &str, owner: &M) -> Result<Vec<T>> {
        let rows = self.load(name, owner).await?;
        Ok(rows.iter().map(T::from_row).collect::<tessera_db::Result<_>>()?)
    }

    /// Drops cached associations of the owner with key `pk`.
    pub fn clear_cache(&self, pk: i64) {
        self.cache.lock().retain(|(_, owner), _| *owner != pk);
    }
}

impl<M> fmt::Debug for ModelClass<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("hooks", &self.hooks)
            .field("associations", &self.associations)
            .field("plugins", &self.plugins)
            .field("cached", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}
