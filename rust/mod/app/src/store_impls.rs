//! Document implementations for the application graph models.

use lowcode_core::{new_id, now_rfc3339};

use crate::model::*;
use crate::store::Document;

impl Document for Application {
    const KIND: EntityKind = EntityKind::Application;
    fn kv_prefix() -> &'static str { "app:application:" }
    fn key_value(&self) -> String { self.id.clone() }
    fn is_deleted(&self) -> bool { self.deleted }
    fn mark_deleted(&mut self) { self.deleted = true; }
    fn before_create(&mut self) {
        if self.id.is_empty() {
            self.id = new_id();
        }
        let now = now_rfc3339();
        if self.created_at.is_empty() { self.created_at = now.clone(); }
        self.updated_at = now;
    }
    fn before_update(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

impl Document for Page {
    const KIND: EntityKind = EntityKind::Page;
    fn kv_prefix() -> &'static str { "app:page:" }
    fn key_value(&self) -> String { self.id.clone() }
    fn is_deleted(&self) -> bool { self.deleted }
    fn mark_deleted(&mut self) { self.deleted = true; }
    fn before_create(&mut self) {
        if self.id.is_empty() {
            self.id = new_id();
        }
        let now = now_rfc3339();
        if self.created_at.is_empty() { self.created_at = now.clone(); }
        self.updated_at = now;
    }
    fn before_update(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

impl Document for Action {
    const KIND: EntityKind = EntityKind::Action;
    fn kv_prefix() -> &'static str { "app:action:" }
    fn key_value(&self) -> String { self.id.clone() }
    fn is_deleted(&self) -> bool { self.deleted }
    fn mark_deleted(&mut self) { self.deleted = true; }
    fn before_create(&mut self) {
        if self.id.is_empty() {
            self.id = new_id();
        }
        let now = now_rfc3339();
        if self.created_at.is_empty() { self.created_at = now.clone(); }
        self.updated_at = now;
    }
    fn before_update(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

impl Document for ActionCollection {
    const KIND: EntityKind = EntityKind::ActionCollection;
    fn kv_prefix() -> &'static str { "app:collection:" }
    fn key_value(&self) -> String { self.id.clone() }
    fn is_deleted(&self) -> bool { self.deleted }
    fn mark_deleted(&mut self) { self.deleted = true; }
    fn before_create(&mut self) {
        if self.id.is_empty() {
            self.id = new_id();
        }
        let now = now_rfc3339();
        if self.created_at.is_empty() { self.created_at = now.clone(); }
        self.updated_at = now;
    }
    fn before_update(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

impl Document for Datasource {
    const KIND: EntityKind = EntityKind::Datasource;
    fn kv_prefix() -> &'static str { "app:datasource:" }
    fn key_value(&self) -> String { self.id.clone() }
    fn is_deleted(&self) -> bool { self.deleted }
    fn mark_deleted(&mut self) { self.deleted = true; }
    fn before_create(&mut self) {
        let now = now_rfc3339();
        if self.created_at.is_empty() { self.created_at = now.clone(); }
        self.updated_at = now;
    }
    fn before_update(&mut self) {
        self.updated_at = now_rfc3339();
    }
}
