//! Frame timing.

use instant::Instant;

/// Time information handed to every per-frame update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the clock started.
    pub elapsed: f32,
    /// Seconds since the previous frame.
    pub delta: f32,
}

/// Monotonic clock that derives the per-frame delta from the elapsed time.
#[derive(Debug)]
pub struct Clock {
    start: Instant,
    previous: f32,
}

impl Clock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            previous: 0.0,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        let elapsed = self.start.elapsed().as_secs_f32();
        self.advance_to(elapsed)
    }

    /// Records `elapsed` as the current time. A value earlier than the previous
    /// one yields a zero delta.
    pub fn advance_to(&mut self, elapsed: f32) -> FrameTime {
        let delta = (elapsed - self.previous).max(0.0);
        self.previous = self.previous.max(elapsed);
        FrameTime { elapsed, delta }
    }

    pub fn elapsed(&self) -> f32 {
        self.previous
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::start()
    }
}
