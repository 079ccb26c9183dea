//! Per-sender inbound flood control.
//!
//! Each sender is in one of two states:
//!
//!   NORMAL:      at most `max_messages` per `window`; exceeding the limit
//!                moves the sender to COOLED_DOWN.
//!   COOLED_DOWN: everything is rejected until `cooldown` has elapsed since
//!                the transition, regardless of window expiry.
//!
//! State lives in memory for the process lifetime only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodConfig {
    pub window_ms: u64,
    pub max_messages: u32,
    pub cooldown_ms: u64,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            window_ms: 1_000,
            max_messages: 20,
            cooldown_ms: 5_000,
        }
    }
}

impl FloodConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
    cooldown_start: Option<Instant>,
    last_seen: Instant,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            cooldown_start: None,
            last_seen: now,
        }
    }

    fn cooling_down(&self, now: Instant, cooldown: Duration) -> bool {
        self.cooldown_start
            .is_some_and(|start| now.saturating_duration_since(start) < cooldown)
    }
}

#[derive(Debug, Default)]
pub struct FloodGuard {
    config: FloodConfig,
    windows: RwLock<HashMap<String, Arc<Mutex<RateWindow>>>>,
}

impl FloodGuard {
    pub fn new(config: FloodConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &FloodConfig {
        &self.config
    }

    pub fn allow(&self, sender: &str) -> bool {
        self.allow_at(sender, Instant::now())
    }

    pub fn allow_at(&self, sender: &str, now: Instant) -> bool {
        let entry = self.window_for(sender, now);
        let mut w = entry.lock();
        w.last_seen = now;

        if let Some(start) = w.cooldown_start {
            if now.saturating_duration_since(start) < self.config.cooldown() {
                debug!(sender, "rejected: sender in cooldown");
                return false;
            }
            w.cooldown_start = None;
            w.window_start = now;
            w.count = 0;
        }

        if now.saturating_duration_since(w.window_start) >= self.config.window() {
            w.window_start = now;
            w.count = 0;
        }

        w.count += 1;
        if w.count > self.config.max_messages {
            w.cooldown_start = Some(now);
            warn!(
                sender,
                limit = self.config.max_messages,
                cooldown_ms = self.config.cooldown_ms,
                "flood limit exceeded, cooling down sender"
            );
            return false;
        }
        true
    }

    fn window_for(&self, sender: &str, now: Instant) -> Arc<Mutex<RateWindow>> {
        if let Some(w) = self.windows.read().get(sender) {
            return Arc::clone(w);
        }
        let mut table = self.windows.write();
        Arc::clone(
            table
                .entry(sender.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RateWindow::new(now)))),
        )
    }

    pub fn is_cooling_down(&self, sender: &str) -> bool {
        self.is_cooling_down_at(sender, Instant::now())
    }

    pub fn is_cooling_down_at(&self, sender: &str, now: Instant) -> bool {
        let entry = match self.windows.read().get(sender) {
            Some(w) => Arc::clone(w),
            None => return false,
        };
        let w = entry.lock();
        w.cooling_down(now, self.config.cooldown())
    }

    /// Administrative override: forget one sender's state.
    pub fn reset(&self, sender: &str) {
        self.windows.write().remove(sender);
    }

    pub fn clear(&self) {
        self.windows.write().clear();
    }

    /// Drop senders idle for longer than window + cooldown.  Returns how many.
    pub fn prune_idle(&self, now: Instant) -> usize {
        let idle = self.config.window() + self.config.cooldown();
        let cooldown = self.config.cooldown();
        let mut table = self.windows.write();
        let before = table.len();
        table.retain(|_, entry| {
            let w = entry.lock();
            w.cooling_down(now, cooldown) || now.saturating_duration_since(w.last_seen) <= idle
        });
        before - table.len()
    }

    pub fn tracked_senders(&self) -> usize {
        self.windows.read().len()
    }
}
