//! Advisories
//!
//! Short-lived, dismissible messages for the user, such as why a cable was
//! refused. Times are host seconds.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    pub expires_at: f64,
}

/// Queue of visible advisories, oldest first
#[derive(Debug)]
pub struct Advisories {
    queue: VecDeque<Advisory>,
    next_id: u64,
    ttl: f64,
    capacity: usize,
}

impl Advisories {
    pub fn new(ttl: f64, capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            next_id: 0,
            ttl: ttl.max(0.0),
            capacity: capacity.max(1),
        }
    }

    /// Show a message; the oldest is dropped once over capacity
    pub fn raise(&mut self, message: impl Into<String>, severity: Severity, now: f64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push_back(Advisory {
            id,
            message: message.into(),
            severity,
            expires_at: now + self.ttl,
        });
        while self.queue.len() > self.capacity {
            self.queue.pop_front();
        }
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.queue.len();
        self.queue.retain(|a| a.id != id);
        self.queue.len() != before
    }

    /// Drop every advisory that expired by `now`
    pub fn expire(&mut self, now: f64) {
        self.queue.retain(|a| a.expires_at > now);
    }

    pub fn active(&self) -> impl Iterator<Item = &Advisory> {
        self.queue.iter()
    }

    pub fn latest(&self) -> Option<&Advisory> {
        self.queue.back()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
