//! Display surfaces that rendered panel items land on

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A list-shaped display surface.
///
/// A detached view (the panel does not exist on this surface) is skipped by
/// the poller without error.
pub trait PanelView: Send + Sync + std::fmt::Debug {
    fn is_attached(&self) -> bool {
        true
    }

    /// Remove every rendered item
    fn clear(&self);

    /// Add one rendered item at the end
    fn append(&self, fragment: &str);
}

/// Something that happened to a [`MemoryView`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Cleared,
    Appended(String),
}

/// In-memory view keeping the current items and a log of every change
#[derive(Debug)]
pub struct MemoryView {
    attached: AtomicBool,
    items: Mutex<Vec<String>>,
    events: Mutex<Vec<ViewEvent>>,
}

impl Default for MemoryView {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryView {
    pub fn new() -> Self {
        Self {
            attached: AtomicBool::new(true),
            items: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn detached() -> Self {
        let view = Self::new();
        view.set_attached(false);
        view
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }

    pub fn items(&self) -> Vec<String> {
        lock(&self.items).clone()
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        lock(&self.events).clone()
    }

    /// Number of times the view was cleared
    pub fn renders(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| **e == ViewEvent::Cleared)
            .count()
    }
}

impl PanelView for MemoryView {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        lock(&self.items).clear();
        lock(&self.events).push(ViewEvent::Cleared);
    }

    fn append(&self, fragment: &str) {
        lock(&self.items).push(fragment.to_string());
        lock(&self.events)
            .push(ViewEvent::Appended(fragment.to_string()));
    }
}

/// View that writes each render to stdout, used by the `watch` command
#[derive(Debug)]
pub struct ConsoleView {
    panel: String,
}

impl ConsoleView {
    pub fn new(panel: &str) -> Self {
        Self {
            panel: panel.to_string(),
        }
    }
}

impl PanelView for ConsoleView {
    fn clear(&self) {
        println!("--- {} ---", self.panel);
    }

    fn append(&self, fragment: &str) {
        println!("{}", fragment);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
