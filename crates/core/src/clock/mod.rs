use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Monotonic time source used for beat cooldowns.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Wall clock measured from the moment it was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually driven clock. Clones share the same position, so a host can keep
/// one handle and give another to an analyser.
#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    micros: Arc<AtomicU64>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(position: Duration) -> Self {
        let clock = Self::new();
        clock.set(position);
        clock
    }

    pub fn reset(&self) {
        self.micros.store(0, Ordering::Relaxed);
    }

    pub fn set(&self, position: Duration) {
        self.micros
            .store(duration_to_micros(position), Ordering::Relaxed);
    }

    pub fn advance(&self, delta: Duration) {
        self.micros
            .fetch_add(duration_to_micros(delta), Ordering::Relaxed);
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    pub fn time_seconds(&self) -> f32 {
        self.now().as_secs_f32()
    }
}

impl Clock for PlaybackClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Relaxed))
    }
}

fn duration_to_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
