//! Bounded per-host channel pool.
//!
//! Channels are created lazily and parked in an idle list between uses. A
//! semaphore caps how many are checked out at once, which is also the cap on
//! concurrent operations against the host. [`PooledChannel`] returns its
//! channel on drop unless it was marked broken, in which case the channel
//! is closed and the next acquire opens a fresh one.

use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use streamctl_common::{Error, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::transport::{Channel, HostSpec, Transport};

struct IdleChannel {
    channel: Box<dyn Channel>,
    since: Instant,
}

/// Channel pool for one host.
pub struct HostPool {
    host: HostSpec,
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleChannel>>,
    max_idle: Duration,
    connect_timeout: Duration,
}

impl HostPool {
    pub fn new(
        host: HostSpec,
        transport: Arc<dyn Transport>,
        max_channels: usize,
        max_idle: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            host,
            transport,
            permits: Arc::new(Semaphore::new(max_channels.max(1))),
            idle: Mutex::new(Vec::new()),
            max_idle,
            connect_timeout,
        }
    }

    pub fn host(&self) -> &HostSpec {
        &self.host
    }

    /// Number of parked channels.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of channels that may still be checked out.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Check out a channel, waiting for a free slot and connecting if no
    /// parked channel is usable.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledChannel> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("channel pool closed".into()))?;

        loop {
            let parked = self.idle.lock().pop();
            match parked {
                Some(idle) if idle.since.elapsed() <= self.max_idle => {
                    return Ok(self.wrap(idle.channel, permit));
                }
                Some(stale) => {
                    tracing::debug!(server = %self.host.name, "Discarding stale idle channel");
                    stale.channel.close().await;
                }
                None => break,
            }
        }

        let channel = tokio::time::timeout(self.connect_timeout, self.transport.connect(&self.host))
            .await
            .map_err(|_| {
                Error::transient(
                    &self.host.name,
                    format!("connect timed out after {:?}", self.connect_timeout),
                )
            })??;
        Ok(self.wrap(channel, permit))
    }

    fn wrap(self: &Arc<Self>, channel: Box<dyn Channel>, permit: OwnedSemaphorePermit) -> PooledChannel {
        PooledChannel {
            channel: Some(channel),
            pool: Arc::clone(self),
            broken: false,
            _permit: permit,
        }
    }

    /// Close every parked channel.
    pub async fn drain(&self) {
        let idle: Vec<IdleChannel> = std::mem::take(&mut *self.idle.lock());
        for c in idle {
            c.channel.close().await;
        }
    }
}

/// A checked-out channel. Returned to its pool on drop.
pub struct PooledChannel {
    channel: Option<Box<dyn Channel>>,
    pool: Arc<HostPool>,
    broken: bool,
    // Released after `channel` is parked, because fields drop after `Drop::drop`.
    _permit: OwnedSemaphorePermit,
}

impl PooledChannel {
    /// Discard this channel instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn host(&self) -> &HostSpec {
        &self.pool.host
    }
}

impl Deref for PooledChannel {
    type Target = dyn Channel;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the channel out.
        match &self.channel {
            Some(c) => c.as_ref(),
            None => unreachable!("pooled channel used after release"),
        }
    }
}

impl Drop for PooledChannel {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        if !self.broken {
            self.pool.idle.lock().push(IdleChannel {
                channel,
                since: Instant::now(),
            });
            return;
        }

        tracing::debug!(server = %self.pool.host.name, "Discarding broken channel");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { channel.close().await });
        }
    }
}
