/// Per-attempt statistics: step counter and stopwatch.
///
/// Owned by the game loop and passed by reference to the pipeline.
/// The stopwatch runs on the frame clock (`tick`), so it pauses with the
/// loop and is fully deterministic in tests.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    steps: u32,
    elapsed_ms: u64,
    running: bool,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    /// A fresh attempt; the stopwatch starts immediately.
    pub fn new() -> Self {
        Session { steps: 0, elapsed_ms: 0, running: true }
    }

    /// Back to zero and running again (level start or restart).
    pub fn reset(&mut self) {
        *self = Session::new();
    }

    pub fn tick(&mut self, dt_ms: u64) {
        if self.running {
            self.elapsed_ms += dt_ms;
        }
    }

    pub fn record_step(&mut self) -> u32 {
        self.steps += 1;
        self.steps
    }

    /// Freeze the stopwatch. Further calls keep the first value.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
