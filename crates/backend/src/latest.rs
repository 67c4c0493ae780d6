//! Latest-wins coordination for async operations.
//!
//! Each `begin` supersedes everything started before it: earlier tickets are
//! cancelled and can no longer pass `is_current`, so a slow early response
//! never overwrites a newer one.

use std::future::Future;
use std::sync::Mutex;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation {generation} was superseded")]
pub struct Superseded {
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct Ticket {
    generation: u64,
    token: CancellationToken,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Current {
    generation: u64,
    token: CancellationToken,
}

pub struct LatestWins {
    current: Mutex<Current>,
    teardown: CancellationToken,
}

impl Default for LatestWins {
    fn default() -> Self {
        let teardown = CancellationToken::new();
        LatestWins {
            current: Mutex::new(Current { generation: 0, token: teardown.child_token() }),
            teardown,
        }
    }
}

impl LatestWins {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new operation, cancelling the previous one.
    pub fn begin(&self) -> Ticket {
        let mut current = self.lock();
        current.token.cancel();
        current.generation += 1;
        current.token = self.teardown.child_token();
        Ticket {
            generation: current.generation,
            token: current.token.clone(),
        }
    }

    pub fn latest(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        !ticket.token.is_cancelled() && self.lock().generation == ticket.generation
    }

    /// Drive `fut` unless the ticket is superseded first. A result that
    /// arrives after supersession is dropped.
    pub async fn run<F>(&self, ticket: &Ticket, fut: F) -> Result<F::Output, Superseded>
    where
        F: Future,
    {
        let superseded = Superseded { generation: ticket.generation };
        let output = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Err(superseded),
            output = fut => output,
        };
        if self.is_current(ticket) {
            Ok(output)
        } else {
            Err(superseded)
        }
    }

    /// Abandon the in-flight operation and every later one.
    pub fn shutdown(&self) {
        self.teardown.cancel();
    }
}
