//! Keybinding dispatcher: multi-key sequences with an inactivity timeout,
//! a layered Escape cascade, and text-input passthrough rules.

use chrono::{DateTime, Duration, Utc};

use crate::config::SyncConfig;

/// One key press as reported by the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keystroke {
    /// Lowercased key name ("g", "escape", "enter").
    pub key: String,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl Keystroke {
    pub fn plain(key: impl Into<String>) -> Keystroke {
        Keystroke {
            key: key.into().to_lowercase(),
            alt: false,
            ctrl: false,
            meta: false,
            shift: false,
        }
    }

    pub fn with_alt(mut self) -> Keystroke {
        self.alt = true;
        self
    }

    pub fn with_ctrl(mut self) -> Keystroke {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Keystroke {
        self.meta = true;
        self
    }

    fn has_chord_modifier(&self) -> bool {
        self.alt || self.ctrl || self.meta
    }

    /// Canonical binding form, e.g. "alt+q" or "g".
    fn canonical(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if self.ctrl {
            parts.push("ctrl");
        }
        if self.alt {
            parts.push("alt");
        }
        if self.meta {
            parts.push("meta");
        }
        parts.push(self.key.as_str());
        parts.join("+")
    }
}

/// A bound action: `keys` is either a single key ("c"), a space-joined
/// sequence ("g b"), or a modifier chord ("alt+q").
#[derive(Debug, Clone, PartialEq)]
pub struct Shortcut<A> {
    pub keys: String,
    pub description: String,
    pub action: A,
}

impl<A> Shortcut<A> {
    pub fn new(keys: impl Into<String>, description: impl Into<String>, action: A) -> Shortcut<A> {
        Shortcut {
            keys: keys.into(),
            description: description.into(),
            action,
        }
    }
}

/// Sequence matcher for one scope's shortcut table. Keys accumulate in a
/// buffer that resets after the configured inactivity window; a press
/// matches on the full joined buffer or, failing that, on the lone key.
#[derive(Debug, Clone)]
pub struct SequenceDispatcher<A> {
    shortcuts: Vec<Shortcut<A>>,
    buffer: Vec<String>,
    last_key_at: Option<DateTime<Utc>>,
    timeout: Duration,
}

impl<A: Clone> SequenceDispatcher<A> {
    pub fn new(shortcuts: Vec<Shortcut<A>>, cfg: &SyncConfig) -> SequenceDispatcher<A> {
        SequenceDispatcher {
            shortcuts,
            buffer: Vec::new(),
            last_key_at: None,
            timeout: Duration::milliseconds(cfg.key_sequence_timeout_ms as i64),
        }
    }

    fn lookup(&self, keys: &str) -> Option<&Shortcut<A>> {
        self.shortcuts.iter().find(|s| s.keys == keys)
    }

    /// Feeds one keystroke. Returns the matched action, if any, and
    /// clears the buffer on a match.
    pub fn on_key(&mut self, key: &Keystroke, now: DateTime<Utc>) -> Option<A> {
        // Modifier chords fire immediately without touching the buffer.
        if key.has_chord_modifier() {
            return self.lookup(&key.canonical()).map(|s| s.action.clone());
        }

        if let Some(last) = self.last_key_at
            && now.signed_duration_since(last) > self.timeout
        {
            self.buffer.clear();
        }
        self.last_key_at = Some(now);
        self.buffer.push(key.key.clone());

        let joined = self.buffer.join(" ");
        if let Some(shortcut) = self.lookup(&joined) {
            let action = shortcut.action.clone();
            self.buffer.clear();
            return Some(action);
        }
        if let Some(shortcut) = self.lookup(&key.key) {
            let action = shortcut.action.clone();
            self.buffer.clear();
            return Some(action);
        }
        // A buffer no binding starts with can never complete; restart the
        // sequence at the current key.
        if !self.shortcuts.iter().any(|s| s.keys.starts_with(&joined)) {
            self.buffer.clear();
            self.buffer.push(key.key.clone());
        }
        None
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_key_at = None;
    }
}

/// Stacked UI layers in Escape-close priority order: the top-most open
/// layer closes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    AiPopup,
    DatePicker,
    StatusDropdown,
    PriorityDropdown,
    LabelDropdown,
    MoreMenu,
    DueDateMenu,
}

#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    open: Vec<Layer>,
}

impl LayerStack {
    pub fn open(&mut self, layer: Layer) {
        if !self.open.contains(&layer) {
            self.open.push(layer);
        }
    }

    pub fn close(&mut self, layer: Layer) {
        self.open.retain(|l| *l != layer);
    }

    pub fn is_open(&self, layer: Layer) -> bool {
        self.open.contains(&layer)
    }

    /// Highest-priority open layer, the one Escape closes next.
    pub fn top(&self) -> Option<Layer> {
        self.open.iter().min().copied()
    }

    pub fn close_top(&mut self) -> Option<Layer> {
        let top = self.top()?;
        self.close(top);
        Some(top)
    }

    pub fn any_open(&self) -> bool {
        !self.open.is_empty()
    }
}

/// What the host UI should do with a keystroke.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome<A> {
    /// A bound action fired.
    Fired(A),
    /// The key joined a pending sequence.
    Buffered,
    /// Nothing to do; let the event bubble.
    Ignored,
    /// Escape inside a text input: remove focus, keep the view.
    Blur,
    /// Cmd/Ctrl+Enter inside a text input: submit the enclosing form.
    Submit,
    /// Escape closed the top-most open layer.
    ClosedLayer(Layer),
    /// Escape with no layer open: close the active view.
    CloseView,
}

/// Full routing policy: global shortcuts, an optional active scope
/// (e.g. an open modal) that preempts them, the layer stack, and the
/// text-input rules.
#[derive(Debug)]
pub struct KeyRouter<A> {
    global: SequenceDispatcher<A>,
    scope: Option<SequenceDispatcher<A>>,
    layers: LayerStack,
}

impl<A: Clone> KeyRouter<A> {
    pub fn new(global: SequenceDispatcher<A>) -> KeyRouter<A> {
        KeyRouter {
            global,
            scope: None,
            layers: LayerStack::default(),
        }
    }

    /// Installs a scope dispatcher that preempts global shortcuts while
    /// active (an open modal or detail pane).
    pub fn enter_scope(&mut self, scope: SequenceDispatcher<A>) {
        self.scope = Some(scope);
    }

    pub fn leave_scope(&mut self) {
        self.scope = None;
    }

    pub fn layers(&mut self) -> &mut LayerStack {
        &mut self.layers
    }

    /// Routes one keystroke. `in_text_input` is true when focus is in an
    /// input, textarea, or contenteditable element, where sequences must
    /// not fire.
    pub fn on_key(
        &mut self,
        key: &Keystroke,
        in_text_input: bool,
        now: DateTime<Utc>,
    ) -> KeyOutcome<A> {
        if in_text_input {
            if key.key == "escape" {
                return KeyOutcome::Blur;
            }
            if key.key == "enter" && (key.meta || key.ctrl) {
                return KeyOutcome::Submit;
            }
            return KeyOutcome::Ignored;
        }

        if key.key == "escape" {
            return match self.layers.close_top() {
                Some(layer) => KeyOutcome::ClosedLayer(layer),
                None => KeyOutcome::CloseView,
            };
        }

        if let Some(scope) = self.scope.as_mut() {
            if let Some(action) = scope.on_key(key, now) {
                return KeyOutcome::Fired(action);
            }
            return KeyOutcome::Buffered;
        }

        match self.global.on_key(key, now) {
            Some(action) => KeyOutcome::Fired(action),
            None => KeyOutcome::Buffered,
        }
    }
}
