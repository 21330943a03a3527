//! Process-wide timer and alarm registry
//!
//! Every scheduled alarm owns a sleeping task. Displayed indices are 1-based
//! and always compact: cancelling alarm 2 of 3 makes the old third alarm
//! number 2.

pub mod parse;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::task::AbortHandle;

pub use parse::{delay_until_clock, describe_delay, parse_clock, parse_duration, parse_index};

use crate::{Error, Result};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    Timer,
    Alarm,
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timer => write!(f, "timer"),
            Self::Alarm => write!(f, "alarm"),
        }
    }
}

struct Alarm {
    id: u64,
    /// Session that set it and hears it fire
    owner: String,
    kind: AlarmKind,
    fire_at: DateTime<Local>,
    handle: AbortHandle,
}

/// Snapshot of one pending alarm as shown to users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmView {
    /// 1-based display index
    pub index: usize,
    pub kind: AlarmKind,
    pub fire_at: DateTime<Local>,
}

impl AlarmView {
    /// Wall-clock time like `3:45 PM`
    #[must_use]
    pub fn time_label(&self) -> String {
        self.fire_at.format("%-I:%M %p").to_string()
    }
}

/// Result of a cancel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(AlarmView),
    /// Several pending and no index given; nothing cancelled
    Ambiguous(Vec<AlarmView>),
    /// Index out of range; nothing cancelled
    NotFound(usize),
    NonePending,
}

impl CancelOutcome {
    /// Sentence to speak back
    #[must_use]
    pub fn announcement(&self) -> String {
        match self {
            Self::Cancelled(view) => {
                format!("Cancelled the {} set for {}.", view.kind, view.time_label())
            }
            Self::Ambiguous(views) => format!(
                "{} Which one should I cancel?",
                describe_pending(views)
            ),
            Self::NotFound(index) => format!("Sorry, {}.", Error::AlarmNotFound(*index)),
            Self::NonePending => "There are no timers or alarms to cancel.".to_string(),
        }
    }
}

/// Spoken listing of pending alarms
#[must_use]
pub fn describe_pending(views: &[AlarmView]) -> String {
    if views.is_empty() {
        return "No timers or alarms are pending.".to_string();
    }

    let noun = if views.len() == 1 { "alarm" } else { "alarms" };
    let mut out = format!("You have {} {noun} pending.", views.len());
    for view in views {
        out.push_str(&format!(" Number {}: {} at {}.", view.index, view.kind, view.time_label()));
    }
    out
}

/// Confirmation sentence for a newly scheduled alarm
#[must_use]
pub fn describe_scheduled(view: &AlarmView, delay: Duration) -> String {
    match view.kind {
        AlarmKind::Timer => format!(
            "Timer {} set for {}, going off at {}.",
            view.index,
            describe_delay(delay),
            view.time_label()
        ),
        AlarmKind::Alarm => format!("Alarm {} set for {}.", view.index, view.time_label()),
    }
}

/// Work out how long to wait for a schedule request
///
/// Durations are tried first; alarms also accept a clock time.
///
/// # Errors
///
/// Returns `Error::CommandParse` when nothing usable is found
pub fn resolve_delay(query: &str, kind: AlarmKind, now: &DateTime<Local>) -> Result<Duration> {
    if let Some(delay) = parse_duration(query) {
        return Ok(delay);
    }
    if kind == AlarmKind::Alarm
        && let Some(delay) = delay_until_clock(query, now)
    {
        return Ok(delay);
    }
    Err(Error::CommandParse(format!(
        "no duration found in \"{query}\""
    )))
}

/// Shared alarm table, cloneable across sessions and timer tasks
#[derive(Clone, Default)]
pub struct AlarmRegistry {
    alarms: Arc<Mutex<Vec<Alarm>>>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for AlarmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

impl AlarmRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Alarm>> {
        self.alarms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register an alarm for session `owner` that calls `on_fire` after `delay`
    ///
    /// Must be called inside a tokio runtime.
    pub fn schedule<F>(
        &self,
        owner: &str,
        kind: AlarmKind,
        delay: Duration,
        on_fire: F,
    ) -> AlarmView
    where
        F: FnOnce(AlarmKind) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Local::now();
        let fire_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);

        let registry = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A concurrent cancel may already have removed it
            if registry.remove(id) {
                tracing::info!(kind = %kind, "alarm fired");
                on_fire(kind);
            }
        });

        let mut alarms = self.lock();
        alarms.push(Alarm {
            id,
            owner: owner.to_string(),
            kind,
            fire_at,
            handle: task.abort_handle(),
        });
        let index = alarms.len();
        drop(alarms);

        tracing::info!(owner, kind = %kind, index, delay_secs = delay.as_secs(), "alarm scheduled");

        AlarmView {
            index,
            kind,
            fire_at,
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut alarms = self.lock();
        let before = alarms.len();
        alarms.retain(|a| a.id != id);
        alarms.len() != before
    }

    /// Cancel by 1-based index, or the only pending alarm when no index is given
    pub fn cancel(&self, index: Option<usize>) -> CancelOutcome {
        let mut alarms = self.lock();

        let position = match (index, alarms.len()) {
            (_, 0) => return CancelOutcome::NonePending,
            (None, 1) => 0,
            (None, _) => {
                drop(alarms);
                return CancelOutcome::Ambiguous(self.list());
            }
            (Some(i), len) if (1..=len).contains(&i) => i - 1,
            (Some(i), _) => {
                tracing::debug!(index = i, "cancel index out of range");
                return CancelOutcome::NotFound(i);
            }
        };

        let alarm = alarms.remove(position);
        alarm.handle.abort();
        tracing::info!(kind = %alarm.kind, index = position + 1, "alarm cancelled");

        CancelOutcome::Cancelled(AlarmView {
            index: position + 1,
            kind: alarm.kind,
            fire_at: alarm.fire_at,
        })
    }

    /// All pending alarms in display order
    #[must_use]
    pub fn list(&self) -> Vec<AlarmView> {
        self.lock()
            .iter()
            .enumerate()
            .map(|(i, a)| AlarmView {
                index: i + 1,
                kind: a.kind,
                fire_at: a.fire_at,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every alarm set by `owner`; returns how many were pending
    pub fn cancel_owned_by(&self, owner: &str) -> usize {
        let mut alarms = self.lock();
        let before = alarms.len();
        alarms.retain(|alarm| {
            if alarm.owner == owner {
                alarm.handle.abort();
                false
            } else {
                true
            }
        });
        before - alarms.len()
    }
}
