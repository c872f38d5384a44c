use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::dispatcher::{DeliveryError, Subscriber};
use super::events::Notification;
use crate::marketplace::domain::{Role, UserId};

/// Bounded in-memory subscriber. Oldest notifications are evicted first.
#[derive(Debug)]
pub struct Inbox {
    capacity: usize,
    received: Mutex<VecDeque<Notification>>,
}

impl Inbox {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            received: Mutex::new(VecDeque::new()),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Newest-first view addressed to the given member.
    pub fn visible_to(&self, user: &UserId, role: Role) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .filter(|notification| notification.audience.admits(Some(user), Some(role)))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl Subscriber for Inbox {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let mut received = self
            .received
            .lock()
            .map_err(|_| DeliveryError::Closed)?;
        if received.len() == self.capacity {
            received.pop_front();
        }
        received.push_back(notification.clone());
        Ok(())
    }
}
