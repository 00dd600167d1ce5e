use std::thread;
use std::time::Duration;

use easel_engine::duration_ms;
use tracing::{error, info};

use crate::error::SessionError;
use crate::session::Session;

/// Something that can run one connection attempt to completion.
pub trait Connector {
    fn connect_and_serve(&mut self) -> Result<(), SessionError>;
}

impl Connector for Session {
    fn connect_and_serve(&mut self) -> Result<(), SessionError> {
        self.run()
    }
}

/// Reconnects forever with a fixed delay between attempts. There is no
/// backoff and no attempt cap.
pub struct Supervisor {
    retry_delay: Duration,
}

impl Supervisor {
    pub fn new(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }

    pub fn run_forever(&self, connector: &mut impl Connector) -> ! {
        let mut attempt: u64 = 0;
        loop {
            attempt = attempt.wrapping_add(1);
            self.attempt(connector, attempt);
        }
    }

    fn attempt(&self, connector: &mut impl Connector, attempt: u64) {
        match connector.connect_and_serve() {
            Ok(()) => info!(attempt, "session ended"),
            Err(err) => error!(attempt, kind = err.kind(), error = %err, "session failed"),
        }
        info!(
            delay_ms = duration_ms(self.retry_delay),
            "reconnecting after delay"
        );
        thread::sleep(self.retry_delay);
    }
}
