use crate::backend::Microphone;
use crate::client::LiveConnection;
use crate::playback::{OutputContext, PlaybackScheduler};

/// Everything a running session holds open. Each slot is filled as it is
/// acquired, so a half-finished start releases exactly what it got.
#[derive(Default)]
pub struct SessionResources {
    pub(crate) connection: Option<Box<dyn LiveConnection>>,
    pub(crate) microphone: Option<Box<dyn Microphone>>,
    pub(crate) output: Option<Box<dyn OutputContext>>,
}

impl SessionResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.connection.is_none() && self.microphone.is_none() && self.output.is_none()
    }

    pub fn output_mut(&mut self) -> Option<&mut (dyn OutputContext + 'static)> {
        self.output.as_deref_mut()
    }

    /// Releases in teardown order: remote connection, scheduled sources,
    /// playback context, microphone. Safe to call any number of times.
    pub fn release(&mut self, scheduler: &mut PlaybackScheduler) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                tracing::debug!("ignoring close error: {}", e);
            }
        }
        match self.output.take() {
            Some(mut output) => {
                scheduler.stop_all(output.as_mut());
                scheduler.reset();
                output.close();
            }
            None => scheduler.reset(),
        }
        if let Some(mut microphone) = self.microphone.take() {
            microphone.close();
        }
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        if !self.is_empty() {
            tracing::debug!("releasing session resources on drop");
            self.release(&mut PlaybackScheduler::new());
        }
    }
}
