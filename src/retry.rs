//! Retry policies for the apply interaction, kept free of browser side effects.

/// Next move after one step of a bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done,
    Retry,
    GiveUp,
}

/// Bounded scroll-and-look search for a page control.
#[derive(Debug, Clone)]
pub struct ScrollSearch {
    max_attempts: u32,
    attempts: u32,
}

impl ScrollSearch {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: 0,
        }
    }

    /// Record the result of one probe and decide what to do next.
    pub fn record(&mut self, found: bool) -> Step {
        if found {
            return Step::Done;
        }
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            Step::GiveUp
        } else {
            Step::Retry
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Result of one click on the apply control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAttempt {
    Clicked,
    /// Another element (an overlay) received the click.
    Intercepted,
    Failed,
}

/// Next move after a click attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStep {
    Done,
    /// Clear overlays, then click again.
    RecoverAndRetry,
    GiveUp,
}

/// Allows a fixed number of overlay recoveries after an intercepted click.
#[derive(Debug, Clone)]
pub struct ClickRecovery {
    recoveries_left: u32,
}

impl ClickRecovery {
    pub fn new(max_recoveries: u32) -> Self {
        Self {
            recoveries_left: max_recoveries,
        }
    }

    pub fn next(&mut self, attempt: ClickAttempt) -> ClickStep {
        match attempt {
            ClickAttempt::Clicked => ClickStep::Done,
            ClickAttempt::Intercepted if self.recoveries_left > 0 => {
                self.recoveries_left -= 1;
                ClickStep::RecoverAndRetry
            }
            ClickAttempt::Intercepted | ClickAttempt::Failed => ClickStep::GiveUp,
        }
    }
}
