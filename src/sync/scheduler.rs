// Scheduled background work
// Every timer or remote call the engine starts runs as a task behind a
// ScheduledTask handle. Dropping the handle aborts the task, so timers tied to
// a conversation end when the handle is replaced or cleared.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        ScheduledTask {
            name,
            handle: tokio::spawn(future),
        }
    }

    /// Post `make()` to `tx` every `period`, starting one period from now.
    /// Stops on its own once the receiving side is gone.
    pub fn every<E, M>(name: &'static str, period: Duration, tx: mpsc::Sender<E>, make: M) -> Self
    where
        E: Send + 'static,
        M: Fn() -> E + Send + 'static,
    {
        Self::spawn(name, async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(make()).await.is_err() {
                    debug!("Receiver gone, stopping {} timer", name);
                    break;
                }
            }
        })
    }

    /// Post the output of `future` to `tx` once, after `delay`.
    pub fn after<E, F>(name: &'static str, delay: Duration, tx: mpsc::Sender<E>, future: F) -> Self
    where
        E: Send + 'static,
        F: Future<Output = E> + Send + 'static,
    {
        Self::spawn(name, async move {
            tokio::time::sleep(delay).await;
            let event = future.await;
            if tx.send(event).await.is_err() {
                debug!("Receiver gone, dropping result of {}", name);
            }
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("Cancelling scheduled task {}", self.name);
            self.handle.abort();
        }
    }
}
