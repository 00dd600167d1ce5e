use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};
use tungstenite::Message as WsMessage;

use crate::socket::FrameSink;

/// Background thread sending a websocket ping every `interval`.
///
/// The thread stops on the first failed write, or when this handle is
/// dropped. Dropping joins the thread, so no ping is written after the
/// owning session has returned.
pub struct Keepalive {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Keepalive {
    pub fn spawn<S>(sink: S, interval: Duration) -> std::io::Result<Self>
    where
        S: FrameSink + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("keepalive".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(err) = sink.send_frame(WsMessage::Ping(Default::default())) {
                            warn!(error = %err, "keepalive ping failed; stopping");
                            return;
                        }
                        debug!("keepalive ping sent");
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
