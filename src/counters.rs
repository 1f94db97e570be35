//! # Counters, named strings and running elements
//!
//! Per-document state read by page margin boxes: CSS counters
//! (`counter-reset/increment/set`), named strings (`string-set`), running
//! elements (`position: running(name)`), and the anchor index that backs
//! `target-counter()`/`target-text()`.
//!
//! All of it lives in context objects created for one pagination call and
//! threaded through the layout as parameters, never process-wide state,
//! so independent documents lay out concurrently without contention.

use std::collections::HashMap;

use crate::layout::BoxNode;
use crate::style::{CounterStyleKind, Style};

/// Scoped counter state: each name maps to a stack of values, one frame
/// per open scope, mutated in document order.
#[derive(Debug, Default, Clone)]
pub struct CounterContext {
    scopes: HashMap<String, Vec<i32>>,
}

impl CounterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a style's counter properties, in the canonical order:
    /// reset opens a new scope, then set, then increment.
    pub fn apply(&mut self, style: &Style) {
        for (name, value) in &style.counter_reset {
            self.scopes.entry(name.clone()).or_default().push(*value);
        }
        for (name, value) in &style.counter_set {
            match self.scopes.get_mut(name).and_then(|s| s.last_mut()) {
                Some(top) => *top = *value,
                None => self.scopes.entry(name.clone()).or_default().push(*value),
            }
        }
        for (name, value) in &style.counter_increment {
            match self.scopes.get_mut(name).and_then(|s| s.last_mut()) {
                Some(top) => *top += *value,
                None => self.scopes.entry(name.clone()).or_default().push(*value),
            }
        }
    }

    /// Directly set (creating if needed) the innermost value of a counter.
    pub fn set(&mut self, name: &str, value: i32) {
        match self.scopes.get_mut(name).and_then(|s| s.last_mut()) {
            Some(top) => *top = value,
            None => self
                .scopes
                .entry(name.to_string())
                .or_default()
                .push(value),
        }
    }

    pub fn increment(&mut self, name: &str, by: i32) {
        match self.scopes.get_mut(name).and_then(|s| s.last_mut()) {
            Some(top) => *top += by,
            None => self.scopes.entry(name.to_string()).or_default().push(by),
        }
    }

    /// `counter(name)`: the innermost value, 0 when no scope exists.
    pub fn value(&self, name: &str) -> i32 {
        self.scopes
            .get(name)
            .and_then(|s| s.last())
            .copied()
            .unwrap_or(0)
    }

    /// `counters(name, sep)`: every open scope, outermost first.
    pub fn values(&self, name: &str) -> Vec<i32> {
        self.scopes.get(name).cloned().unwrap_or_default()
    }

    pub fn format(&self, name: &str, style: CounterStyleKind) -> String {
        style.format(self.value(name))
    }

    pub fn format_all(&self, name: &str, separator: &str, style: CounterStyleKind) -> String {
        let values = self.values(name);
        if values.is_empty() {
            return style.format(0);
        }
        values
            .iter()
            .map(|v| style.format(*v))
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Snapshot of every counter's scope stack, stored with anchors so
    /// `target-counter()` can read the value at the target's position.
    pub fn snapshot(&self) -> HashMap<String, Vec<i32>> {
        self.scopes.clone()
    }
}

/// Per-page tracking of one named value (a string or a running element):
/// what it was when the page began, the first assignment on the page, and
/// the value now.
#[derive(Debug, Clone)]
struct PageTracked<T: Clone> {
    at_page_start: Option<T>,
    first_on_page: Option<T>,
    current: Option<T>,
}

impl<T: Clone> Default for PageTracked<T> {
    fn default() -> Self {
        Self {
            at_page_start: None,
            first_on_page: None,
            current: None,
        }
    }
}

impl<T: Clone> PageTracked<T> {
    fn assign(&mut self, value: T) {
        if self.first_on_page.is_none() {
            self.first_on_page = Some(value.clone());
        }
        self.current = Some(value);
    }

    fn open_page(&mut self) {
        self.at_page_start = self.current.clone();
        self.first_on_page = None;
    }

    fn select(&self, select: crate::style::PageValueSelect) -> Option<T> {
        use crate::style::PageValueSelect::*;
        match select {
            First => self
                .first_on_page
                .clone()
                .or_else(|| self.at_page_start.clone()),
            Last => self.current.clone(),
            Start => self.at_page_start.clone(),
            FirstExcept => {
                if self.first_on_page.is_some() {
                    None
                } else {
                    self.at_page_start.clone()
                }
            }
        }
    }
}

/// Named strings assigned by `string-set`, scoped per page for
/// `string(name, first|last|first-except|start)`.
#[derive(Debug, Clone, Default)]
pub struct StringSets {
    entries: HashMap<String, PageTracked<String>>,
}

impl StringSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: &str, value: String) {
        self.entries.entry(name.to_string()).or_default().assign(value);
    }

    /// Called by the sequencer when a new page begins.
    pub fn open_page(&mut self) {
        for tracked in self.entries.values_mut() {
            tracked.open_page();
        }
    }

    pub fn select(&self, name: &str, select: crate::style::PageValueSelect) -> String {
        self.entries
            .get(name)
            .and_then(|t| t.select(select))
            .unwrap_or_default()
    }
}

/// Running elements: the most recent box declared `position: running(name)`
/// in flow order. Entries replace, never merge.
#[derive(Debug, Clone, Default)]
pub struct RunningRegistry {
    entries: HashMap<String, PageTracked<BoxNode>>,
}

impl RunningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: &str, node: BoxNode) {
        self.entries.entry(name.to_string()).or_default().assign(node);
    }

    pub fn open_page(&mut self) {
        for tracked in self.entries.values_mut() {
            tracked.open_page();
        }
    }

    pub fn select(
        &self,
        name: &str,
        select: crate::style::PageValueSelect,
    ) -> Option<BoxNode> {
        self.entries.get(name).and_then(|t| t.select(select))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Where an identified element landed: page index, absolute position, and
/// the counter state at that point. Built in document order during layout;
/// lookups are O(1) afterwards.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub counters: HashMap<String, Vec<i32>>,
    /// Concatenated text content of the target, for `target-text()`.
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct AnchorIndex {
    entries: HashMap<String, Anchor>,
}

impl AnchorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// First placement wins: a fragment resumed on a later page must not
    /// move its anchor.
    pub fn record(&mut self, id: &str, anchor: Anchor) {
        self.entries.entry(id.to_string()).or_insert(anchor);
    }

    pub fn get(&self, id: &str) -> Option<&Anchor> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Anchor)> {
        self.entries.iter()
    }
}
