use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::debug;

use crate::error::EngineError;
use crate::surface::{ScrollDirection, TabSurface};

pub type TabId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TabKind {
    Watch,
    Lurk,
    Refresh,
    Scrape,
}

/// One open embeddable content region.
#[derive(Debug, Clone, Serialize)]
pub struct Tab {
    pub id: TabId,
    pub url: String,
    pub kind: TabKind,
    pub muted: bool,
}

/// Which tabs a mute/unmute applies to. Indices are 1-based positions in the
/// current tab list, not tab IDs.
#[derive(Debug, Clone)]
pub enum TabSelection {
    All,
    Indices(Vec<usize>),
}

/// Owns the ordered tab table and the per-tab reload timers. IDs are
/// `max(existing)+1` so they stay monotonic and are never reused while any
/// tab is open.
pub struct TabManager {
    tabs: Mutex<Vec<Tab>>,
    refreshers: Mutex<HashMap<TabId, JoinHandle<()>>>,
    surface: Arc<dyn TabSurface>,
}

impl TabManager {
    pub fn new(surface: Arc<dyn TabSurface>) -> Self {
        Self {
            tabs: Mutex::new(Vec::new()),
            refreshers: Mutex::new(HashMap::new()),
            surface,
        }
    }

    /// Appends `count` tabs and returns their IDs. Never clears existing tabs.
    pub fn open(&self, url: &str, count: u32, kind: TabKind, muted: bool) -> Vec<TabId> {
        let new_tabs: Vec<Tab> = {
            let mut tabs = self.tabs.lock().expect("tab table lock poisoned");
            let mut next = tabs.iter().map(|t| t.id + 1).max().unwrap_or(0);
            let mut created = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let tab = Tab {
                    id: next,
                    url: url.to_string(),
                    kind,
                    muted,
                };
                tabs.push(tab.clone());
                created.push(tab);
                next += 1;
            }
            created
        };

        for tab in &new_tabs {
            self.surface.open_region(tab);
        }
        new_tabs.into_iter().map(|t| t.id).collect()
    }

    /// Removes one tab by ID; no-op if absent. The tab's reload timer dies
    /// with it.
    pub fn close(&self, id: TabId) {
        let removed = {
            let mut tabs = self.tabs.lock().expect("tab table lock poisoned");
            match tabs.iter().position(|t| t.id == id) {
                Some(ix) => {
                    tabs.remove(ix);
                    true
                }
                None => false,
            }
        };
        if !removed {
            debug!("[Tabs] close #{id}: no such tab, ignoring");
            return;
        }
        self.stop_refresh(id);
        self.surface.close_region(id);
    }

    pub fn close_all(&self) {
        let drained: Vec<TabId> = {
            let mut tabs = self.tabs.lock().expect("tab table lock poisoned");
            tabs.drain(..).map(|t| t.id).collect()
        };
        let handles: Vec<JoinHandle<()>> = {
            let mut refreshers = self.refreshers.lock().expect("refresher map lock poisoned");
            refreshers.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            handle.abort();
        }
        for id in drained {
            self.surface.close_region(id);
        }
    }

    pub fn contains(&self, id: TabId) -> bool {
        self.tabs
            .lock()
            .expect("tab table lock poisoned")
            .iter()
            .any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tabs.lock().expect("tab table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Tab> {
        self.tabs.lock().expect("tab table lock poisoned").clone()
    }

    /// Sets the mute flag on a selection. A bad index mutates nothing.
    pub fn set_muted(&self, selection: &TabSelection, muted: bool) -> Result<usize, EngineError> {
        let touched: Vec<TabId> = {
            let mut tabs = self.tabs.lock().expect("tab table lock poisoned");
            match selection {
                TabSelection::All => {
                    for tab in tabs.iter_mut() {
                        tab.muted = muted;
                    }
                    tabs.iter().map(|t| t.id).collect()
                }
                TabSelection::Indices(indices) => {
                    for &ix in indices {
                        if ix == 0 || ix > tabs.len() {
                            return Err(EngineError::NotFound(format!(
                                "tab index {ix} (have {} tabs)",
                                tabs.len()
                            )));
                        }
                    }
                    let mut ids = Vec::with_capacity(indices.len());
                    for &ix in indices {
                        let tab = &mut tabs[ix - 1];
                        tab.muted = muted;
                        ids.push(tab.id);
                    }
                    ids
                }
            }
        };

        for id in &touched {
            self.surface.set_muted(*id, muted);
        }
        Ok(touched.len())
    }

    pub fn scroll(&self, index: usize, direction: ScrollDirection) -> Result<TabId, EngineError> {
        let id = self.resolve_index(index)?;
        self.surface.scroll(id, direction);
        Ok(id)
    }

    pub fn fullscreen(&self, index: usize) -> Result<TabId, EngineError> {
        let id = self.resolve_index(index)?;
        self.surface.request_fullscreen(id)?;
        Ok(id)
    }

    /// Spawns the reload loop for a refresh tab. The timer's lifetime is
    /// bound to the tab: closing the tab aborts it, and the loop re-checks
    /// existence before every reload since close can land mid-sleep.
    pub fn start_refresh(self: &Arc<Self>, id: TabId, interval: Duration) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !manager.contains(id) {
                    return;
                }
                manager.surface.reload_region(id);
            }
        });
        self.refreshers
            .lock()
            .expect("refresher map lock poisoned")
            .insert(id, handle);
    }

    fn stop_refresh(&self, id: TabId) {
        if let Some(handle) = self
            .refreshers
            .lock()
            .expect("refresher map lock poisoned")
            .remove(&id)
        {
            handle.abort();
        }
    }

    fn resolve_index(&self, index: usize) -> Result<TabId, EngineError> {
        let tabs = self.tabs.lock().expect("tab table lock poisoned");
        if index == 0 || index > tabs.len() {
            return Err(EngineError::NotFound(format!(
                "tab index {index} (have {} tabs)",
                tabs.len()
            )));
        }
        Ok(tabs[index - 1].id)
    }
}
