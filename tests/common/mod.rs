#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use noteslice::editor_manager::EditorHandle;
use noteslice::workspace::WorkspaceHost;
use serde_json::{Value, json};

/// Route library logs to the test output. `RUST_LOG` controls the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// Host that records every callback as `"<kind>:<arg>"`.
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl WorkspaceHost for RecordingHost {
    fn on_invalid_path(&self, _ws_name: Option<&str>, invalid_path: &str) {
        self.calls.lock().unwrap().push(format!("invalid:{invalid_path}"));
    }

    fn on_auth_error(&self, ws_name: &str) {
        self.calls.lock().unwrap().push(format!("auth:{ws_name}"));
    }

    fn on_workspace_not_found(&self, ws_name: &str) {
        self.calls.lock().unwrap().push(format!("not-found:{ws_name}"));
    }
}

/// Editor surface double showing one note.
pub struct FakeEditor {
    ws_path: String,
    pub focused: AtomicBool,
    focus_calls: AtomicUsize,
    pub scroll: Mutex<Option<f64>>,
}

impl FakeEditor {
    pub fn new(ws_path: &str) -> Arc<Self> {
        Arc::new(Self {
            ws_path: ws_path.to_owned(),
            focused: AtomicBool::new(false),
            focus_calls: AtomicUsize::new(0),
            scroll: Mutex::new(None),
        })
    }

    pub fn focus_calls(&self) -> usize {
        self.focus_calls.load(Ordering::SeqCst)
    }
}

impl EditorHandle for FakeEditor {
    fn focus_view(&self) {
        self.focus_calls.fetch_add(1, Ordering::SeqCst);
        self.focused.store(true, Ordering::SeqCst);
    }

    fn has_focus(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    fn ws_path(&self) -> Option<String> {
        Some(self.ws_path.clone())
    }

    fn selection_json(&self) -> Value {
        json!({ "type": "text", "anchor": 3, "head": 3 })
    }

    fn scroll_position(&self) -> Option<f64> {
        *self.scroll.lock().unwrap()
    }
}
