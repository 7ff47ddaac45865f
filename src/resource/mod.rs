//! Generic resource access: descriptors, hooks and the operation factory.

use crate::query::Filter;
use crate::store::Document;

mod factory;
mod hooks;
pub mod validation;

pub use factory::{Listing, ResourceService};
pub use hooks::{NoHooks, ResourceHooks};
pub use validation::{FieldError, FieldRule, Rule};

/// Which write a [`ResourceKind::prepare`] call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Update,
}

/// Read scope threaded through `list` / `get_one`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Applies the kind's visibility filter (hidden tours, inactive users).
    #[default]
    Visible,
    /// Administrative reads that must see everything.
    All,
}

/// A reference field replaced by a selection of the referenced document.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub field: &'static str,
    pub collection: &'static str,
    pub select: &'static [&'static str],
}

/// A computed array of child documents whose `foreign_field` points back here.
#[derive(Debug, Clone, Copy)]
pub struct VirtualField {
    pub field: &'static str,
    pub collection: &'static str,
    pub foreign_field: &'static str,
    pub references: &'static [Reference],
}

#[derive(Debug, Clone, Copy)]
pub enum Populate {
    Reference(Reference),
    Virtual(VirtualField),
}

/// Describes one resource type to the generic operations.
pub struct ResourceKind {
    pub collection: &'static str,
    /// Used in not-found messages.
    pub singular: &'static str,
    pub rules: &'static [FieldRule],
    pub unique_fields: &'static [&'static str],
    /// Never returned to clients, whatever the projection says.
    pub hidden_fields: &'static [&'static str],
    /// Stripped from update payloads; only dedicated flows may change them.
    pub read_only: &'static [&'static str],
    pub default_sort: &'static str,
    /// Field flipped to `false` instead of removing the document.
    pub soft_delete: Option<&'static str>,
    /// Expanded on every read.
    pub auto_populate: &'static [Populate],
    pub visibility: fn() -> Filter,
    /// Defaults and derived fields, applied before validation.
    pub prepare: fn(&mut Document, Stage),
    /// Virtual fields added to every returned document.
    pub decorate: fn(&mut Document),
}

impl ResourceKind {
    pub fn scope_filter(&self, scope: Scope) -> Filter {
        match scope {
            Scope::Visible => (self.visibility)(),
            Scope::All => Filter::new(),
        }
    }
}

pub fn no_visibility() -> Filter {
    Filter::new()
}

pub fn no_decorate(_: &mut Document) {}
