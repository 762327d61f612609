//! Recording [`Platform`] used by the unit tests.
//!
//! Mouse input is scripted through an [`mpsc`] channel so a test (or a
//! second thread) can feed clicks into a session blocked in
//! [`pump`](Platform::pump).  System cursors are plain strings, windows are
//! a point → pid map, and every call that matters for ordering is logged.
//!
//! Termination signals are simulated by calling
//! [`cancel_active`](crate::cancel::cancel_active) from inside a platform
//! call, the way the signal handler would from its own thread.

use crate::cancel::{self, Waker};
use crate::cursor::CursorId;
use crate::traits::Platform;
use crate::types::{HookAction, LoopExit, MouseEvent, MouseEventKind, Point};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime};

/// Input delivered to a pumping mock.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MockInput {
    Mouse(MouseEvent),
    /// A termination signal delivered while pumping.
    Signal,
    Quit,
}

static ACTIVE_SLOT: Mutex<()> = parking_lot::const_mutex(());

/// Serialises tests that run sessions.
///
/// Every running session occupies the process-wide active-grab slot, so a
/// test that delivers a signal must not see another test's session there.
pub(crate) fn exclusive_active() -> MutexGuard<'static, ()> {
    ACTIVE_SLOT.lock()
}

#[derive(Debug, thiserror::Error)]
#[error("mock error: {0}")]
pub(crate) struct MockError(String);

#[derive(Debug, Default)]
struct MockState {
    /// What a scheme reload installs.
    scheme: HashMap<CursorId, String>,
    /// What is installed right now.
    cursors: HashMap<CursorId, String>,
    loads: usize,
    fail_load_after: Option<usize>,
    fail_set_cursor: bool,
    fail_install: bool,
    reloads: usize,
    set_cursor_calls: usize,
    next_hook: u32,
    installed_hooks: HashSet<u32>,
    pumping: bool,
    position: Point,
    windows: HashMap<Point, u32>,
    running: HashSet<u32>,
    started: HashMap<u32, SystemTime>,
    signal_during: Option<&'static str>,
    signals: Vec<bool>,
    discarded: usize,
    actions: Vec<(MouseEventKind, HookAction)>,
    calls: Vec<&'static str>,
}

pub(crate) struct MockPlatform {
    state: Mutex<MockState>,
    tx: mpsc::Sender<MockInput>,
    rx: Mutex<mpsc::Receiver<MockInput>>,
}

impl MockPlatform {
    pub(crate) fn new() -> Self {
        let scheme: HashMap<CursorId, String> = CursorId::ALL
            .iter()
            .map(|id| (*id, format!("scheme:{}", id.raw())))
            .collect();
        let state = MockState {
            cursors: scheme.clone(),
            scheme,
            ..MockState::default()
        };
        let (tx, rx) = mpsc::channel();
        Self {
            state: Mutex::new(state),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Installed cursors differ from the stored scheme, as after a tool
    /// changed them at runtime.  Only a snapshot restore gets them back.
    pub(crate) fn with_customised_cursors(self) -> Self {
        {
            let mut state = self.state.lock();
            for id in CursorId::ALL {
                state.cursors.insert(id, format!("user:{}", id.raw()));
            }
        }
        self
    }

    /// A window owned by `pid` covers `point`.
    pub(crate) fn with_window(self, point: Point, pid: u32) -> Self {
        self.state.lock().windows.insert(point, pid);
        self
    }

    pub(crate) fn with_running_process(self, pid: u32) -> Self {
        self.state.lock().running.insert(pid);
        self
    }

    pub(crate) fn with_process_started_at(self, pid: u32, started: SystemTime) -> Self {
        {
            let mut state = self.state.lock();
            state.running.insert(pid);
            state.started.insert(pid, started);
        }
        self
    }

    /// Deliver a termination signal at the start of the next `call`
    /// (`"set_cursor"` or `"install_hook"`).
    pub(crate) fn signal_during(&self, call: &'static str) {
        self.state.lock().signal_during = Some(call);
    }

    /// The first `n` cursor loads succeed, every later one fails.
    pub(crate) fn fail_load_after(&self, n: usize) {
        self.state.lock().fail_load_after = Some(n);
    }

    pub(crate) fn fail_set_cursor(&self, fail: bool) {
        self.state.lock().fail_set_cursor = fail;
    }

    pub(crate) fn fail_install(&self, fail: bool) {
        self.state.lock().fail_install = fail;
    }

    //  Input

    pub(crate) fn input(&self) -> mpsc::Sender<MockInput> {
        self.tx.clone()
    }

    pub(crate) fn send(&self, kind: MouseEventKind, point: Point) {
        let _ = self.tx.send(MockInput::Mouse(MouseEvent::new(kind, point)));
    }

    /// A full left click at `point`.
    pub(crate) fn click(&self, point: Point) {
        self.send(MouseEventKind::LeftDown, point);
        self.send(MouseEventKind::LeftUp, point);
    }

    //  Inspection

    pub(crate) fn cursor(&self, id: CursorId) -> String {
        self.state.lock().cursors.get(&id).cloned().unwrap_or_default()
    }

    pub(crate) fn cursors(&self) -> BTreeMap<u32, String> {
        self.state
            .lock()
            .cursors
            .iter()
            .map(|(id, c)| (id.raw(), c.clone()))
            .collect()
    }

    pub(crate) fn any_cursor_patched(&self) -> bool {
        self.state
            .lock()
            .cursors
            .values()
            .any(|c| c.starts_with("loaded:"))
    }

    pub(crate) fn reload_count(&self) -> usize {
        self.state.lock().reloads
    }

    pub(crate) fn set_cursor_count(&self) -> usize {
        self.state.lock().set_cursor_calls
    }

    pub(crate) fn hooks_installed(&self) -> usize {
        self.state.lock().installed_hooks.len()
    }

    pub(crate) fn is_pumping(&self) -> bool {
        self.state.lock().pumping
    }

    pub(crate) fn actions(&self) -> Vec<(MouseEventKind, HookAction)> {
        self.state.lock().actions.clone()
    }

    /// What `cancel_active` answered for each delivered signal.
    pub(crate) fn signals(&self) -> Vec<bool> {
        self.state.lock().signals.clone()
    }

    /// Quit requests dropped by `discard_wakeups`.
    pub(crate) fn discarded(&self) -> usize {
        self.state.lock().discarded
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    fn maybe_signal(&self, call: &'static str) {
        let due = {
            let mut state = self.state.lock();
            if state.signal_during == Some(call) {
                state.signal_during = None;
                true
            } else {
                false
            }
        };
        if due {
            self.deliver_signal();
        }
    }

    fn deliver_signal(&self) {
        let delivered = cancel::cancel_active();
        self.state.lock().signals.push(delivered);
    }

    /// Poll until the platform is blocked in `pump`.
    pub(crate) fn wait_until_pumping(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.is_pumping() {
            assert!(Instant::now() < deadline, "session never started pumping");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Platform for MockPlatform {
    type Error = MockError;
    type Cursor = String;
    type Hook = u32;

    fn load_cursor(&self, path: &Path) -> Result<String, MockError> {
        let mut state = self.state.lock();
        if state.fail_load_after.is_some_and(|n| state.loads >= n) {
            return Err(MockError(format!("cannot load {}", path.display())));
        }
        state.loads += 1;
        Ok(format!("loaded:{}#{}", path.display(), state.loads))
    }

    fn snapshot_cursor(&self, id: CursorId) -> Result<String, MockError> {
        self.state
            .lock()
            .cursors
            .get(&id)
            .cloned()
            .ok_or_else(|| MockError(format!("no cursor {}", id)))
    }

    fn set_system_cursor(&self, cursor: String, id: CursorId) -> Result<(), MockError> {
        self.maybe_signal("set_cursor");
        let mut state = self.state.lock();
        state.set_cursor_calls += 1;
        if state.fail_set_cursor {
            return Err(MockError("set cursor refused".into()));
        }
        if state.calls.last() != Some(&"set_cursor") {
            state.calls.push("set_cursor");
        }
        state.cursors.insert(id, cursor);
        Ok(())
    }

    fn reload_system_cursors(&self) -> Result<(), MockError> {
        let mut state = self.state.lock();
        state.reloads += 1;
        state.cursors = state.scheme.clone();
        state.calls.push("reload_cursors");
        Ok(())
    }

    fn install_hook(&self) -> Result<u32, MockError> {
        self.maybe_signal("install_hook");
        let mut state = self.state.lock();
        if state.fail_install {
            return Err(MockError("hook refused".into()));
        }
        state.next_hook += 1;
        let hook = state.next_hook;
        state.installed_hooks.insert(hook);
        state.calls.push("install_hook");
        Ok(hook)
    }

    fn uninstall_hook(&self, hook: u32) -> Result<(), MockError> {
        let mut state = self.state.lock();
        state.calls.push("uninstall_hook");
        if state.installed_hooks.remove(&hook) {
            Ok(())
        } else {
            Err(MockError(format!("hook {} not installed", hook)))
        }
    }

    fn waker(&self) -> Result<Waker, MockError> {
        let tx = self.tx.clone();
        Ok(Box::new(move || {
            let _ = tx.send(MockInput::Quit);
        }))
    }

    fn pump(
        &self,
        handler: &mut dyn FnMut(&MouseEvent) -> HookAction,
    ) -> Result<LoopExit, MockError> {
        {
            let mut state = self.state.lock();
            state.pumping = true;
            state.calls.push("pump");
        }
        let rx = self.rx.lock();
        let exit = loop {
            match rx.recv() {
                Ok(MockInput::Mouse(event)) => {
                    self.state.lock().position = event.point;
                    // The state lock must not be held here: the handler
                    // calls back into `cursor_position` / `process_at`.
                    let action = handler(&event);
                    self.state.lock().actions.push((event.kind, action));
                    if action == HookAction::Finish {
                        break LoopExit::Completed;
                    }
                }
                Ok(MockInput::Signal) => self.deliver_signal(),
                Ok(MockInput::Quit) | Err(_) => break LoopExit::Quit,
            }
        };
        self.state.lock().pumping = false;
        Ok(exit)
    }

    fn cursor_position(&self) -> Result<Point, MockError> {
        Ok(self.state.lock().position)
    }

    fn process_at(&self, point: Point) -> Result<Option<u32>, MockError> {
        Ok(self.state.lock().windows.get(&point).copied())
    }

    fn is_process_running(&self, pid: u32) -> bool {
        pid == std::process::id() || self.state.lock().running.contains(&pid)
    }

    fn process_started_at(&self, pid: u32) -> Option<SystemTime> {
        self.state.lock().started.get(&pid).copied()
    }

    fn discard_wakeups(&self) {
        let rx = self.rx.lock();
        let pending: Vec<MockInput> = rx.try_iter().collect();
        let mut discarded = 0;
        for input in pending {
            match input {
                MockInput::Quit => discarded += 1,
                other => {
                    let _ = self.tx.send(other);
                }
            }
        }
        self.state.lock().discarded += discarded;
    }
}
