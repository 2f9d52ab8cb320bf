/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Periodic session timers.

use crate::registry::SessionHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Runs [`SessionEngine::on_timer`](fixline_session::SessionEngine::on_timer)
/// on a fixed tick for one connection.
///
/// The session lock is held only for the duration of a check. The task ends
/// by itself once the session leaves the connection it was started for.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HeartbeatScheduler {
    /// Spawns the timer task.
    ///
    /// # Arguments
    /// * `session` - Session to drive
    /// * `connection_id` - Connection generation the task belongs to
    /// * `tick` - Timer period; should be well below the heartbeat interval
    #[must_use]
    pub fn spawn(session: SessionHandle, connection_id: u64, tick: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = interval.tick() => {}
                }
                let mut engine = session.lock().await;
                if engine.connection_id() != connection_id || !engine.state().is_connected() {
                    break;
                }
                if let Err(err) = engine.on_timer(Instant::now()).await {
                    warn!(session = %engine.session_id(), error = %err, "timer ended the session");
                    break;
                }
            }
            debug!("heartbeat scheduler stopped");
        });
        Self {
            stop: Some(stop),
            task,
        }
    }

    /// Returns true once the task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the task and waits for it.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(err) = self.task.await {
            warn!(error = %err, "heartbeat scheduler task failed");
        }
    }
}
