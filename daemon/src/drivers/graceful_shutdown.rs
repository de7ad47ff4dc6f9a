use log::{debug, error, info};
use tokio::task::JoinSet;

use super::driver::Driver;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct GracefulShutdown {
    drivers: Vec<Arc<dyn Driver>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self { drivers: vec![] }
    }
}

impl GracefulShutdown {
    pub fn add_driver(&mut self, driver: impl Driver + 'static) {
        self.drivers.push(Arc::new(driver));
    }

    /// Runs every driver until ctrl+c or a driver-requested stop, then waits for them to return.
    pub async fn watch(mut self, stop_notify: Arc<Notify>) {
        let stopped = stop_notify.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        let mut join_set = JoinSet::new();
        for driver in self.drivers.drain(..) {
            join_set.spawn(async move {
                debug!("driver {:?} running", driver.get_driver_type());
                driver.run().await;
            });
        }

        debug!("graceful shutdown start watching");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("ctrl+c received, shutting down");
                    stop_notify.notify_waiters();
                }
                Err(err) => {
                    error!("graceful shutdown can't install ctrl+c signal handler: {}", err);
                    stopped.as_mut().await;
                }
            },
            _ = &mut stopped => {}
        }
        join_set.join_all().await;
    }
}
