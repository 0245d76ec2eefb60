// FILE: src\audio_engine\recording.rs
// ====================================

/// Accumulates the master output while a session recording is active.
#[derive(Debug, Default)]
pub struct RecordingSession {
    active: bool,
    samples: Vec<f32>,
    cycles: usize,
}

impl RecordingSession {
    /// Starts a new session, discarding anything recorded before.
    pub fn start(&mut self) {
        self.active = true;
        self.samples.clear();
        self.cycles = 0;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn append(&mut self, chunk: &[f32]) {
        if self.active {
            self.samples.extend_from_slice(chunk);
            self.cycles += 1;
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of mix cycles appended since the session started.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_only_while_active() {
        let mut session = RecordingSession::default();
        session.append(&[0.1; 4]);
        assert!(session.is_empty());

        session.start();
        session.append(&[0.1; 4]);
        session.append(&[0.2; 4]);
        session.stop();
        session.append(&[0.3; 4]);

        assert_eq!(session.samples().len(), 8);
        assert_eq!(session.cycles(), 2);
    }

    #[test]
    fn restarting_discards_previous_take() {
        let mut session = RecordingSession::default();
        session.start();
        session.append(&[0.1; 4]);
        session.start();
        assert!(session.is_empty());
        assert!(session.is_active());
    }
}
