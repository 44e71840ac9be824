use serde::Serialize;
use tracing::info;

use crate::error::EngineError;
use crate::tabs::{Tab, TabId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            _ => None,
        }
    }
}

/// Rendering seam: whatever actually hosts the embeddable content regions.
/// The engine only tracks which tabs exist with which state; everything
/// visible goes through here.
pub trait TabSurface: Send + Sync {
    fn open_region(&self, tab: &Tab);
    fn close_region(&self, id: TabId);
    fn reload_region(&self, id: TabId);
    fn set_muted(&self, id: TabId, muted: bool);
    fn scroll(&self, id: TabId, direction: ScrollDirection);
    fn request_fullscreen(&self, id: TabId) -> Result<(), EngineError>;
}

/// Headless surface: logs every operation. Fullscreen needs a real display
/// host, so it reports the capability as unavailable.
pub struct LoggingSurface;

impl TabSurface for LoggingSurface {
    fn open_region(&self, tab: &Tab) {
        info!(
            "🖼️ [Surface] open tab #{} ({:?}{}) -> {}",
            tab.id,
            tab.kind,
            if tab.muted { ", muted" } else { "" },
            tab.url
        );
    }

    fn close_region(&self, id: TabId) {
        info!("[Surface] close tab #{id}");
    }

    fn reload_region(&self, id: TabId) {
        info!("🔄 [Surface] reload tab #{id}");
    }

    fn set_muted(&self, id: TabId, muted: bool) {
        info!(
            "[Surface] tab #{id} {}",
            if muted { "muted" } else { "unmuted" }
        );
    }

    fn scroll(&self, id: TabId, direction: ScrollDirection) {
        info!("[Surface] scroll tab #{id} {direction:?}");
    }

    fn request_fullscreen(&self, id: TabId) -> Result<(), EngineError> {
        Err(EngineError::Unsupported(format!(
            "fullscreen for tab #{id} (headless surface)"
        )))
    }
}

/// Test double that records every call, shared by the module tests.
#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingSurface {
        pub opened: Mutex<Vec<TabId>>,
        pub closed: Mutex<Vec<TabId>>,
        pub reloads: Mutex<Vec<TabId>>,
        pub mutes: Mutex<Vec<(TabId, bool)>>,
        pub scrolls: Mutex<Vec<(TabId, ScrollDirection)>>,
        pub fullscreens: Mutex<Vec<TabId>>,
    }

    impl TabSurface for RecordingSurface {
        fn open_region(&self, tab: &Tab) {
            self.opened.lock().unwrap().push(tab.id);
        }

        fn close_region(&self, id: TabId) {
            self.closed.lock().unwrap().push(id);
        }

        fn reload_region(&self, id: TabId) {
            self.reloads.lock().unwrap().push(id);
        }

        fn set_muted(&self, id: TabId, muted: bool) {
            self.mutes.lock().unwrap().push((id, muted));
        }

        fn scroll(&self, id: TabId, direction: ScrollDirection) {
            self.scrolls.lock().unwrap().push((id, direction));
        }

        fn request_fullscreen(&self, id: TabId) -> Result<(), EngineError> {
            self.fullscreens.lock().unwrap().push(id);
            Ok(())
        }
    }
}
