//! # tessera-orm
//!
//! Models on top of tessera datasets.
//!
//! This crate provides:
//! - [`Model`] for row types mapped to one table
//! - [`ModelClass`] for persistence, built once through [`ModelClassBuilder`]
//! - [`Hooks`] run around saves and destroys, able to stop them
//! - [`PluginRegistry`] for named, configurable extensions applied at build time
//! - [`Association`]s loaded on demand and cached per owner
//!
//! Every class is bound to an explicit [`tessera_db::Database`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use serde_json::json;
//! use tessera_orm::{Association, HookAction, LifecycleEvent, ModelClass, PluginRegistry};
//!
//! let registry = PluginRegistry::with_builtins();
//! let mut builder = ModelClass::<Artist>::builder(db.clone());
//! builder
//!     .hook(LifecycleEvent::BeforeSave, |artist| {
//!         artist.name = artist.name.trim().to_string();
//!         HookAction::Continue
//!     })
//!     .associate(Association::one_to_many("albums", "albums", "artist_id"));
//! builder.plugin(&registry, "default_order", json!({"columns": ["name"]}))?;
//! let artists = builder.build();
//!
//! let mut nina = Artist { id: None, name: String::from("Nina") };
//! artists.save(&mut nina).await?;
//! let albums = artists.load("albums", &nina).await?;
//! ```

pub mod association;
pub mod error;
pub mod hooks;
pub mod model;
pub mod model_class;
pub mod plugin;

pub use association::{Association, AssociationKind};
pub use error::{OrmError, Result};
pub use hooks::{Hook, HookAction, Hooks, LifecycleEvent};
pub use model::Model;
pub use model_class::{ModelClass, ModelClassBuilder};
pub use plugin::{PluginRegistry, PluginSetup};
