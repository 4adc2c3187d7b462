//! Two-phase shutdown state of a client connection.
//!
//! A socket is released only after both its directions have finished: the
//! reader reached end of stream or failed, and the sender drained or failed.
//! Either direction may report first, and either may report more than once.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Both directions live
    Active,
    /// Sender finished, waiting for the reader
    SenderDone,
    /// Reader finished, waiting for the sender
    ReceiverDone,
    /// Both finished; the socket is being or has been released
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Active => "active",
            LifecycleState::SenderDone => "sender done",
            LifecycleState::ReceiverDone => "receiver done",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of a completion report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The other direction is still running
    Wait,
    /// Both directions are done; the caller must close the connection now
    Close,
    /// This direction had already reported; nothing changed
    Duplicate,
}

/// Returned when a connection is closed a second time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyClosed;

#[derive(Debug, Default)]
pub struct Lifecycle {
    sender_finished: bool,
    receiver_finished: bool,
    released: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        match (self.sender_finished, self.receiver_finished) {
            (false, false) => LifecycleState::Active,
            (true, false) => LifecycleState::SenderDone,
            (false, true) => LifecycleState::ReceiverDone,
            (true, true) => LifecycleState::Closed,
        }
    }

    pub fn sender_finished(&mut self) -> Transition {
        if self.sender_finished {
            return Transition::Duplicate;
        }
        self.sender_finished = true;
        self.completion()
    }

    pub fn receiver_finished(&mut self) -> Transition {
        if self.receiver_finished {
            return Transition::Duplicate;
        }
        self.receiver_finished = true;
        self.completion()
    }

    /// Record that the socket was released. Succeeds once per lifetime.
    pub fn mark_released(&mut self) -> Result<(), AlreadyClosed> {
        if self.released {
            return Err(AlreadyClosed);
        }
        self.released = true;
        Ok(())
    }

    pub fn is_sender_finished(&self) -> bool {
        self.sender_finished
    }

    pub fn is_receiver_finished(&self) -> bool {
        self.receiver_finished
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn completion(&self) -> Transition {
        if self.sender_finished && self.receiver_finished {
            Transition::Close
        } else {
            Transition::Wait
        }
    }
}
