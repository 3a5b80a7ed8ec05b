//! Per-connection interceptor stack with strict LIFO discipline.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chain::Snapshot;
use crate::error::{Error, Result};
use crate::interceptor::Interceptor;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one push on one stack.
///
/// Ids are unique for the life of the process, so a token issued by one stack
/// never matches an entry on another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StackToken {
    id: u64,
    depth: usize,
}

impl StackToken {
    /// Position of the entry, 0 being the outermost.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl fmt::Display for StackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.id, self.depth)
    }
}

struct Entry {
    token: StackToken,
    interceptor: Arc<dyn Interceptor>,
    // Owner asked to leave while not on top.
    released: bool,
}

/// Ordered interceptors, installation order first to last.
#[derive(Default)]
pub struct InterceptorStack {
    entries: Vec<Entry>,
    snapshot: Option<Snapshot>,
}

impl InterceptorStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `interceptor` as the new innermost entry.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) -> StackToken {
        let token = StackToken {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            depth: self.entries.len(),
        };
        self.entries.push(Entry {
            token,
            interceptor,
            released: false,
        });
        self.snapshot = None;
        token
    }

    /// Removes the top entry if `token` identifies it.
    ///
    /// Any other token is a discipline violation; the stack is left untouched.
    pub fn pop(&mut self, token: StackToken) -> Result<Arc<dyn Interceptor>> {
        if self.top() != Some(token) {
            return Err(self.violation(token));
        }
        match self.entries.pop() {
            Some(entry) => {
                self.sweep_released();
                self.snapshot = None;
                Ok(entry.interceptor)
            }
            None => Err(self.violation(token)),
        }
    }

    /// Pops `token` like [`pop`](Self::pop), but an entry buried under later
    /// pushes is marked released instead of left behind.
    ///
    /// A buried release still reports the violation. The entry stays installed
    /// until everything above it is popped, then goes with it.
    pub fn release(&mut self, token: StackToken) -> Result<()> {
        if self.top() == Some(token) {
            return self.pop(token).map(drop);
        }
        let err = self.violation(token);
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.token == token) {
            entry.released = true;
        }
        Err(err)
    }

    /// Token of the innermost entry.
    pub fn top(&self) -> Option<StackToken> {
        self.entries.last().map(|entry| entry.token)
    }

    /// Returns `true` if `token` is still installed somewhere in the stack.
    pub fn contains(&self, token: StackToken) -> bool {
        self.entries.iter().any(|entry| entry.token == token)
    }

    /// Number of installed interceptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable copy of the current entries, outermost first.
    ///
    /// Cached until the next push or pop.
    pub fn snapshot(&mut self) -> Snapshot {
        if let Some(snapshot) = &self.snapshot {
            return snapshot.clone();
        }
        let snapshot: Snapshot = self
            .entries
            .iter()
            .map(|entry| entry.interceptor.clone())
            .collect();
        self.snapshot = Some(snapshot.clone());
        snapshot
    }

    fn sweep_released(&mut self) {
        while self.entries.last().is_some_and(|entry| entry.released) {
            self.entries.pop();
        }
    }

    fn violation(&self, found: StackToken) -> Error {
        Error::StackDisciplineViolation {
            expected: self
                .top()
                .map_or_else(|| "none".to_owned(), |token| token.to_string()),
            found: found.to_string(),
        }
    }
}

impl fmt::Debug for InterceptorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.token.to_string(), entry.interceptor.name())),
            )
            .finish()
    }
}
