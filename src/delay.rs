use crate::protocol::Error;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Something that can wait. The handshake waits twice: briefly after claiming the candidate, and
/// for seconds while the device re-enumerates.
pub trait Delay {
    /// Block for `duration`, or return [Error::Cancelled] if the wait was cut short.
    fn wait(&self, duration: Duration) -> Result<(), Error>;
}

/// Never waits. For tests and for backends where re-enumeration is instant.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn wait(&self, _duration: Duration) -> Result<(), Error> {
        Ok(())
    }
}

/// Sleeps on the calling thread. Another thread can end the sleep early through the
/// [CancelToken].
#[derive(Clone, Debug, Default)]
pub struct ThreadDelay {
    cancel: CancelToken,
}

impl ThreadDelay {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl Delay for ThreadDelay {
    fn wait(&self, duration: Duration) -> Result<(), Error> {
        if self.cancel.wait_timeout(duration) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Shared flag that aborts any [ThreadDelay] holding a clone of it. Once cancelled, it stays
/// cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<(Mutex<bool>, Condvar)>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, condvar) = &*self.0;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.0;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if cancelled before `duration` elapsed.
    fn wait_timeout(&self, duration: Duration) -> bool {
        let (flag, condvar) = &*self.0;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
