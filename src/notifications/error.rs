//! Notification System Error Types

use std::fmt;

/// Result type for notification operations
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notification system
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationError {
    /// Subscriber already exists
    SubscriberAlreadyExists(String),

    /// Subscriber not found
    SubscriberNotFound(String),

    /// Subscriber limit reached
    SubscriberLimit(usize),

    /// System shutdown in progress
    SystemShutdown,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationError::SubscriberAlreadyExists(id) => {
                write!(f, "Observer '{}' already exists", id)
            }
            NotificationError::SubscriberNotFound(id) => {
                write!(f, "Observer '{}' not found", id)
            }
            NotificationError::SubscriberLimit(max) => {
                write!(f, "Maximum number of observers ({}) reached", max)
            }
            NotificationError::SystemShutdown => {
                write!(f, "Notification hub is shutting down")
            }
        }
    }
}

impl std::error::Error for NotificationError {}

impl NotificationError {
    /// Create a subscriber already exists error
    pub fn subscriber_already_exists<S: Into<String>>(id: S) -> Self {
        Self::SubscriberAlreadyExists(id.into())
    }

    /// Create a subscriber not found error
    pub fn subscriber_not_found<S: Into<String>>(id: S) -> Self {
        Self::SubscriberNotFound(id.into())
    }
}
